use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::classify::classify_status;
use super::error::PolicyError;

/// Hard ceiling for server-directed delays (`Retry-After`).
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(300);

/// Status codes retried when the caller does not configure a set.
pub const DEFAULT_RETRY_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// High-level classification of an error for retry purposes.
///
/// Callers map transport failures, HTTP statuses or their own error types
/// into these kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Transport-level failure reaching the server (DNS, refused, reset).
    Connection,
    /// Request exceeded its deadline.
    Timeout,
    /// 5xx response.
    Server,
    /// 429 response.
    RateLimited,
    /// 4xx response other than 429. Never retried.
    Client,
    /// Anything else (serialization, invalid input). Never retried.
    Other,
}

impl ErrorKind {
    /// Whether this kind may appear in a policy's retryable set at all.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            ErrorKind::Connection | ErrorKind::Timeout | ErrorKind::Server | ErrorKind::RateLimited
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Connection => "connection",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Server => "server",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::Client => "client",
            ErrorKind::Other => "other",
        };
        f.write_str(s)
    }
}

/// What the classifier knows about one failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Failure {
    pub kind: ErrorKind,
    /// HTTP status, when the failure came from a response.
    pub status: Option<u16>,
    /// Server-supplied delay hint (`Retry-After`).
    pub retry_after: Option<Duration>,
}

impl Failure {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            status: None,
            retry_after: None,
        }
    }

    /// Failure for a bare HTTP status code.
    pub fn from_status(status: u16) -> Self {
        Self {
            kind: classify_status(status),
            status: Some(status),
            retry_after: None,
        }
    }

    pub fn with_retry_after(mut self, retry_after: Option<Duration>) -> Self {
        self.retry_after = retry_after;
        self
    }
}

/// Decision returned by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Do not retry this error.
    NoRetry,
    /// Retry after the given delay.
    RetryAfter(Duration),
}

/// Exponential backoff policy with caps and optional jitter.
///
/// Immutable once built; share it freely across threads. Attempt indices are
/// 0-based: attempt 0 is the first try and `calculate_delay(0)` is the wait
/// before the first retry.
///
/// Jitter is additive: a uniform amount in `[0, delay * jitter_fraction]` is
/// added to the capped delay and the sum is clamped to `max_delay` again.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    growth_factor: f64,
    max_delay: Duration,
    jitter: bool,
    jitter_fraction: f64,
    retry_on_status: BTreeSet<u16>,
    retry_on_kinds: BTreeSet<ErrorKind>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_secs(1),
            growth_factor: 2.0,
            max_delay: Duration::from_secs(60),
            jitter: true,
            jitter_fraction: 0.1,
            retry_on_status: DEFAULT_RETRY_STATUSES.into_iter().collect(),
            retry_on_kinds: [
                ErrorKind::Connection,
                ErrorKind::Timeout,
                ErrorKind::Server,
                ErrorKind::RateLimited,
            ]
            .into_iter()
            .collect(),
        }
    }
}

impl RetryPolicy {
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder {
            policy: RetryPolicy::default(),
        }
    }

    /// A policy that makes exactly one attempt.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Maximum number of attempts (including the first).
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    pub fn growth_factor(&self) -> f64 {
        self.growth_factor
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    pub fn jitter(&self) -> bool {
        self.jitter
    }

    pub fn jitter_fraction(&self) -> f64 {
        self.jitter_fraction
    }

    pub fn retry_on_status(&self) -> &BTreeSet<u16> {
        &self.retry_on_status
    }

    pub fn retry_on_kinds(&self) -> &BTreeSet<ErrorKind> {
        &self.retry_on_kinds
    }

    /// Backoff before the retry that follows `attempt`.
    ///
    /// `min(base_delay * growth_factor^attempt, max_delay)`, plus jitter when
    /// enabled. Always within `[0, max_delay]`.
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let capped = self.capped_backoff(attempt);
        if !self.jitter || self.jitter_fraction <= 0.0 {
            return capped;
        }
        let spread = capped.as_secs_f64() * self.jitter_fraction;
        if spread <= 0.0 {
            return capped;
        }
        let extra = rand::thread_rng().gen_range(0.0..=spread);
        Duration::try_from_secs_f64(capped.as_secs_f64() + extra)
            .map(|d| d.min(self.max_delay))
            .unwrap_or(self.max_delay)
    }

    fn capped_backoff(&self, attempt: u32) -> Duration {
        let exp = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.base_delay.as_secs_f64() * self.growth_factor.powi(exp);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::try_from_secs_f64(secs).unwrap_or(self.max_delay)
    }

    /// Delay to wait after `attempt`, honouring a server hint when present.
    ///
    /// The hint may exceed `max_delay` but is capped at [`MAX_RETRY_AFTER`].
    pub fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        match retry_after {
            Some(hint) => hint.min(MAX_RETRY_AFTER),
            None => self.calculate_delay(attempt),
        }
    }

    /// Whether the failure is retryable at all, ignoring the attempt budget.
    pub fn is_retryable(&self, failure: &Failure) -> bool {
        match failure.kind {
            ErrorKind::Connection | ErrorKind::Timeout => {
                self.retry_on_kinds.contains(&failure.kind)
            }
            ErrorKind::Server | ErrorKind::RateLimited => {
                self.retry_on_kinds.contains(&failure.kind)
                    && failure
                        .status
                        .map_or(true, |s| self.retry_on_status.contains(&s))
            }
            ErrorKind::Client | ErrorKind::Other => false,
        }
    }

    /// Whether another attempt should follow the failed `attempt` (0-based).
    pub fn should_retry(&self, failure: &Failure, attempt: u32) -> bool {
        if attempt.saturating_add(1) >= self.max_attempts {
            return false;
        }
        self.is_retryable(failure)
    }

    pub fn should_retry_status(&self, status: u16, attempt: u32) -> bool {
        self.should_retry(&Failure::from_status(status), attempt)
    }

    /// Combine [`should_retry`](Self::should_retry) and
    /// [`delay_for`](Self::delay_for).
    pub fn decide(&self, attempt: u32, failure: &Failure) -> RetryDecision {
        if !self.should_retry(failure, attempt) {
            return RetryDecision::NoRetry;
        }
        RetryDecision::RetryAfter(self.delay_for(attempt, failure.retry_after))
    }
}

/// Builder validating every field before a [`RetryPolicy`] exists.
#[derive(Debug, Clone)]
pub struct RetryPolicyBuilder {
    policy: RetryPolicy,
}

impl RetryPolicyBuilder {
    pub fn max_attempts(mut self, n: u32) -> Self {
        self.policy.max_attempts = n;
        self
    }

    pub fn base_delay(mut self, d: Duration) -> Self {
        self.policy.base_delay = d;
        self
    }

    pub fn growth_factor(mut self, f: f64) -> Self {
        self.policy.growth_factor = f;
        self
    }

    pub fn max_delay(mut self, d: Duration) -> Self {
        self.policy.max_delay = d;
        self
    }

    pub fn jitter(mut self, on: bool) -> Self {
        self.policy.jitter = on;
        self
    }

    pub fn jitter_fraction(mut self, f: f64) -> Self {
        self.policy.jitter_fraction = f;
        self
    }

    pub fn retry_on_status<I: IntoIterator<Item = u16>>(mut self, codes: I) -> Self {
        self.policy.retry_on_status = codes.into_iter().collect();
        self
    }

    pub fn retry_on_kinds<I: IntoIterator<Item = ErrorKind>>(mut self, kinds: I) -> Self {
        self.policy.retry_on_kinds = kinds.into_iter().collect();
        self
    }

    pub fn build(self) -> Result<RetryPolicy, PolicyError> {
        let p = self.policy;
        if p.max_attempts == 0 {
            return Err(PolicyError::ZeroAttempts);
        }
        if p.base_delay.is_zero() {
            return Err(PolicyError::NonPositiveBaseDelay);
        }
        if !p.growth_factor.is_finite() || p.growth_factor < 1.0 {
            return Err(PolicyError::InvalidGrowthFactor(p.growth_factor));
        }
        if p.max_delay < p.base_delay {
            return Err(PolicyError::MaxBelowBase {
                base: p.base_delay,
                max: p.max_delay,
            });
        }
        if !(0.0..=1.0).contains(&p.jitter_fraction) {
            return Err(PolicyError::InvalidJitterFraction(p.jitter_fraction));
        }
        if let Some(kind) = p.retry_on_kinds.iter().find(|k| !k.is_transient()) {
            return Err(PolicyError::NotRetryableKind(*kind));
        }
        if let Some(code) = p
            .retry_on_status
            .iter()
            .find(|c| !matches!(classify_status(**c), ErrorKind::Server | ErrorKind::RateLimited))
        {
            return Err(PolicyError::NonRetryableStatus(*code));
        }
        Ok(p)
    }
}
