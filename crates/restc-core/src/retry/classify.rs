//! Classify HTTP status, curl errors and client errors into retry policy error kinds.

use crate::error::ApiError;
use crate::retry::policy::{ErrorKind, Failure};

/// Anything the retry executor can make a decision about.
///
/// Implement this for your own error type to drive
/// [`RetryExecutor`](super::RetryExecutor) with it.
pub trait Classify {
    fn failure(&self) -> Failure;
}

/// Classify an HTTP status code for retry decisions.
pub fn classify_status(code: u16) -> ErrorKind {
    match code {
        429 => ErrorKind::RateLimited,
        500..=599 => ErrorKind::Server,
        400..=499 => ErrorKind::Client,
        _ => ErrorKind::Other,
    }
}

/// Classify a curl error for retry decisions.
pub fn classify_curl_error(e: &curl::Error) -> ErrorKind {
    if e.is_operation_timedout() {
        return ErrorKind::Timeout;
    }
    if e.is_couldnt_connect()
        || e.is_couldnt_resolve_host()
        || e.is_couldnt_resolve_proxy()
        || e.is_read_error()
        || e.is_recv_error()
        || e.is_send_error()
        || e.is_got_nothing()
        || e.is_partial_file()
    {
        return ErrorKind::Connection;
    }
    ErrorKind::Other
}

impl Classify for ApiError {
    fn failure(&self) -> Failure {
        match self {
            ApiError::Connection { .. } => Failure::new(ErrorKind::Connection),
            ApiError::Timeout { .. } => Failure::new(ErrorKind::Timeout),
            ApiError::Client { status, .. } => Failure {
                kind: ErrorKind::Client,
                status: Some(*status),
                retry_after: None,
            },
            ApiError::Server {
                status,
                retry_after,
                ..
            } => Failure {
                kind: ErrorKind::Server,
                status: Some(*status),
                retry_after: *retry_after,
            },
            ApiError::RateLimited { retry_after, .. } => Failure {
                kind: ErrorKind::RateLimited,
                status: Some(429),
                retry_after: *retry_after,
            },
            ApiError::RateLimitExceeded { .. }
            | ApiError::InvalidRequest(_)
            | ApiError::InvalidConfig(_)
            | ApiError::Decode(_)
            | ApiError::Transport { .. } => Failure::new(ErrorKind::Other),
        }
    }
}
