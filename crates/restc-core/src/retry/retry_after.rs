//! `Retry-After` header parsing.
//!
//! Accepts delta-seconds and HTTP-dates (IMF-fixdate, plus the obsolete
//! RFC 850 and asctime forms). Values are clamped to `[0, MAX_RETRY_AFTER]`;
//! a negative or unparseable value clamps to zero.

use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};

use super::policy::MAX_RETRY_AFTER;
use crate::models::Headers;

const OBSOLETE_DATE_FORMATS: [&str; 2] = ["%A, %d-%b-%y %H:%M:%S GMT", "%a %b %e %H:%M:%S %Y"];

/// Parse one `Retry-After` value relative to `now`.
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Duration {
    let value = value.trim();
    if let Ok(secs) = value.parse::<f64>() {
        return clamp_secs(secs);
    }
    match parse_http_date(value) {
        Some(at) => {
            let millis = (at - now).num_milliseconds();
            clamp_secs(millis as f64 / 1000.0)
        }
        None => {
            tracing::debug!("malformed Retry-After {:?}, using zero", value);
            Duration::ZERO
        }
    }
}

/// Server hint for a response, if the status allows one (429 or 503) and
/// the header is present.
pub fn retry_after_from_headers(status: u16, headers: &Headers) -> Option<Duration> {
    if status != 429 && status != 503 {
        return None;
    }
    headers
        .get("retry-after")
        .map(|v| parse_retry_after(v, Utc::now()))
}

fn clamp_secs(secs: f64) -> Duration {
    if secs.is_nan() || secs <= 0.0 {
        return Duration::ZERO;
    }
    if secs >= MAX_RETRY_AFTER.as_secs_f64() {
        return MAX_RETRY_AFTER;
    }
    Duration::from_secs_f64(secs)
}

fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
        return Some(dt.with_timezone(&Utc));
    }
    OBSOLETE_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| naive.and_utc())
}
