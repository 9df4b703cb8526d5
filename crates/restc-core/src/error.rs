//! Error taxonomy for API calls.
//!
//! Every failure a caller can see is one of these variants; the retry loop
//! returns them unchanged so callers can match on the kind.

use std::time::Duration;

use serde_json::Value;

use crate::models::{request_id_from, ApiResponse};
use crate::rate_limit::RateLimitExceeded;
use crate::retry::{retry_after_from_headers, PolicyError};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Transport-level failure reaching the server.
    #[error("connection error: {message}")]
    Connection { message: String },

    /// Request exceeded its deadline.
    #[error("request timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    /// 4xx other than 429. Never retried.
    #[error("HTTP {status}: {message}")]
    Client {
        status: u16,
        message: String,
        body: Option<String>,
        request_id: Option<String>,
    },

    /// 5xx.
    #[error("HTTP {status}: {message}")]
    Server {
        status: u16,
        message: String,
        body: Option<String>,
        request_id: Option<String>,
        retry_after: Option<Duration>,
    },

    /// 429 Too Many Requests.
    #[error("rate limited by server (retry after {retry_after:?})")]
    RateLimited {
        retry_after: Option<Duration>,
        body: Option<String>,
        request_id: Option<String>,
    },

    /// The local rate limiter would have had to wait too long.
    #[error(transparent)]
    RateLimitExceeded(#[from] RateLimitExceeded),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to encode or decode JSON: {0}")]
    Decode(#[from] serde_json::Error),

    /// Transport failure that is neither a timeout nor a connection problem
    /// (TLS setup, bad option, ...).
    #[error("transport error: {message}")]
    Transport { message: String },
}

impl From<PolicyError> for ApiError {
    fn from(e: PolicyError) -> Self {
        ApiError::InvalidConfig(e.to_string())
    }
}

impl ApiError {
    /// HTTP status that produced this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Client { status, .. } | ApiError::Server { status, .. } => Some(*status),
            ApiError::RateLimited { .. } => Some(429),
            _ => None,
        }
    }

    pub fn request_id(&self) -> Option<&str> {
        match self {
            ApiError::Client { request_id, .. }
            | ApiError::Server { request_id, .. }
            | ApiError::RateLimited { request_id, .. } => request_id.as_deref(),
            _ => None,
        }
    }

    /// Map a 4xx or 5xx response to its variant; any other status becomes `Transport`.
    pub fn from_response(resp: &ApiResponse) -> Self {
        let body = if resp.body.is_empty() {
            None
        } else {
            Some(resp.text().into_owned())
        };
        let request_id = resp
            .request_id
            .clone()
            .or_else(|| request_id_from(&resp.headers));
        let retry_after = retry_after_from_headers(resp.status, &resp.headers);
        match resp.status {
            429 => ApiError::RateLimited {
                retry_after,
                body,
                request_id,
            },
            500..=599 => ApiError::Server {
                status: resp.status,
                message: error_message(resp.status, body.as_deref()),
                body,
                request_id,
                retry_after,
            },
            400..=499 => ApiError::Client {
                status: resp.status,
                message: error_message(resp.status, body.as_deref()),
                body,
                request_id,
            },
            status => ApiError::Transport {
                message: format!("unexpected HTTP status {status}"),
            },
        }
    }
}

/// Best-effort human message from common JSON error bodies, falling back to
/// `HTTP <status>`.
pub fn error_message(status: u16, body: Option<&str>) -> String {
    body.and_then(|b| serde_json::from_str::<Value>(b).ok())
        .and_then(|v| message_from_json(&v))
        .unwrap_or_else(|| format!("HTTP {status}"))
}

fn message_from_json(v: &Value) -> Option<String> {
    let obj = v.as_object()?;
    let as_text = |v: &Value| v.as_str().map(str::to_string);

    if let Some(s) = obj.get("error_description").and_then(as_text) {
        return Some(s);
    }
    match obj.get("error") {
        Some(Value::Object(e)) => {
            if let Some(s) = ["message", "code", "description"]
                .iter()
                .find_map(|k| e.get(*k).and_then(as_text))
            {
                return Some(s);
            }
        }
        Some(Value::String(s)) => return Some(s.clone()),
        _ => {}
    }
    if let Some(s) = obj.get("message").and_then(as_text) {
        return Some(s);
    }
    match obj.get("detail") {
        Some(Value::String(s)) => return Some(s.clone()),
        Some(Value::Array(items)) => {
            if let Some(s) = items.first().and_then(|i| i.get("msg")).and_then(as_text) {
                return Some(s);
            }
        }
        _ => {}
    }
    match obj.get("errors").and_then(Value::as_array).and_then(|a| a.first()) {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Object(e)) => ["message", "msg", "detail", "description"]
            .iter()
            .find_map(|k| e.get(*k).and_then(as_text)),
        _ => None,
    }
}
