//! Redaction of secrets before anything reaches the logs.

use crate::models::Headers;

pub const REDACTED: &str = "[REDACTED]";

/// Substrings marking a header name as sensitive (matched lower-case).
const SENSITIVE_KEYS: [&str; 9] = [
    "authorization",
    "api-key",
    "api_key",
    "apikey",
    "token",
    "password",
    "secret",
    "credentials",
    "cookie",
];

pub fn is_sensitive_header(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    SENSITIVE_KEYS.iter().any(|k| lower.contains(k))
}

/// Header pairs with sensitive values replaced.
pub fn redact_headers(headers: &Headers) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(k, v)| {
            let v = if is_sensitive_header(k) { REDACTED } else { v };
            (k.to_string(), v.to_string())
        })
        .collect()
}

/// URL with any user info replaced. Unparseable input is returned as-is.
pub fn redact_url(raw: &str) -> String {
    let Ok(mut parsed) = url::Url::parse(raw) else {
        return raw.to_string();
    };
    if parsed.username().is_empty() && parsed.password().is_none() {
        return raw.to_string();
    }
    if parsed.set_password(None).is_err() || parsed.set_username(REDACTED).is_err() {
        return raw.to_string();
    }
    parsed.to_string()
}
