//! Retry and backoff policy.
//!
//! This module encapsulates error classification (timeouts, throttling,
//! connection failures), exponential backoff with jitter, `Retry-After`
//! handling and the blocking retry loop, so the client and any other caller
//! share a consistent policy.

mod classify;
mod error;
mod policy;
mod retry_after;
mod run;

pub use classify::{classify_curl_error, classify_status, Classify};
pub use error::PolicyError;
pub use policy::{
    ErrorKind, Failure, RetryDecision, RetryPolicy, RetryPolicyBuilder, DEFAULT_RETRY_STATUSES,
    MAX_RETRY_AFTER,
};
pub use retry_after::{parse_retry_after, retry_after_from_headers};
pub(crate) use run::millis;
pub use run::{
    run_with_retry, AttemptOutcome, RequestAttempt, RetryExecutor, RetryReport, TerminalState,
};
