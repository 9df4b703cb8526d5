//! Validation errors for retry policies.

use std::time::Duration;

use super::policy::ErrorKind;

/// Returned when a [`RetryPolicy`](super::RetryPolicy) would be inconsistent.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PolicyError {
    #[error("max_attempts must be at least 1")]
    ZeroAttempts,
    #[error("base_delay must be positive")]
    NonPositiveBaseDelay,
    #[error("growth_factor must be finite and >= 1.0, got {0}")]
    InvalidGrowthFactor(f64),
    #[error("max_delay ({max:?}) must be >= base_delay ({base:?})")]
    MaxBelowBase { base: Duration, max: Duration },
    #[error("jitter_fraction must be within [0, 1], got {0}")]
    InvalidJitterFraction(f64),
    #[error("{0} errors are never retried")]
    NotRetryableKind(ErrorKind),
    #[error("status {0} is not retryable (expected 429 or 5xx)")]
    NonRetryableStatus(u16),
    #[error("invalid {field}: {value} is not a valid number of seconds")]
    InvalidSeconds { field: &'static str, value: f64 },
}
