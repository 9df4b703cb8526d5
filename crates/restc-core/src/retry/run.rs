//! Retry loop: run a closure until success or policy says stop.

use std::fmt;
use std::time::Duration;

use super::classify::Classify;
use super::policy::{RetryDecision, RetryPolicy};

/// How a single attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    RetryableFailure,
    FatalFailure,
}

/// How the whole logical call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalState {
    Success,
    /// A non-retryable error stopped the loop.
    FatalFailure,
    /// Attempts ran out while the error was still retryable.
    Exhausted,
}

/// Record of one try. `delay` is the wait before the next try, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestAttempt {
    pub index: u32,
    pub outcome: AttemptOutcome,
    pub delay: Option<Duration>,
}

/// Result of [`RetryExecutor::run_traced`].
#[derive(Debug)]
pub struct RetryReport<T, E> {
    pub result: Result<T, E>,
    pub attempts: Vec<RequestAttempt>,
    pub terminal: TerminalState,
}

/// Runs operations under a [`RetryPolicy`], sleeping on the caller's thread
/// between attempts.
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `op` until it succeeds, fails fatally, or attempts run out.
    ///
    /// The error returned is always the last one `op` produced, unchanged.
    pub fn run<T, E, F>(&self, op: F) -> Result<T, E>
    where
        E: Classify + fmt::Display,
        F: FnMut() -> Result<T, E>,
    {
        self.run_traced(op, |_, _, _| {}).result
    }

    /// Like [`run`](Self::run) but calls `on_retry(attempt, error, delay)`
    /// before every sleep. `attempt` is the 0-based index of the failed try.
    pub fn run_with_callback<T, E, F, C>(&self, op: F, on_retry: C) -> Result<T, E>
    where
        E: Classify + fmt::Display,
        F: FnMut() -> Result<T, E>,
        C: FnMut(u32, &E, Duration),
    {
        self.run_traced(op, on_retry).result
    }

    /// Full loop, returning a record of every attempt and the terminal state.
    pub fn run_traced<T, E, F, C>(&self, mut op: F, mut on_retry: C) -> RetryReport<T, E>
    where
        E: Classify + fmt::Display,
        F: FnMut() -> Result<T, E>,
        C: FnMut(u32, &E, Duration),
    {
        let mut attempts = Vec::new();
        let mut attempt = 0u32;
        loop {
            let err = match op() {
                Ok(value) => {
                    attempts.push(RequestAttempt {
                        index: attempt,
                        outcome: AttemptOutcome::Success,
                        delay: None,
                    });
                    return RetryReport {
                        result: Ok(value),
                        attempts,
                        terminal: TerminalState::Success,
                    };
                }
                Err(e) => e,
            };

            let failure = err.failure();
            if !self.policy.is_retryable(&failure) {
                tracing::debug!(attempt, kind = %failure.kind, "not retrying: {}", err);
                attempts.push(RequestAttempt {
                    index: attempt,
                    outcome: AttemptOutcome::FatalFailure,
                    delay: None,
                });
                return RetryReport {
                    result: Err(err),
                    attempts,
                    terminal: TerminalState::FatalFailure,
                };
            }

            match self.policy.decide(attempt, &failure) {
                RetryDecision::NoRetry => {
                    tracing::error!(
                        attempts = attempt + 1,
                        kind = %failure.kind,
                        "retries exhausted: {}",
                        err
                    );
                    attempts.push(RequestAttempt {
                        index: attempt,
                        outcome: AttemptOutcome::RetryableFailure,
                        delay: None,
                    });
                    return RetryReport {
                        result: Err(err),
                        attempts,
                        terminal: TerminalState::Exhausted,
                    };
                }
                RetryDecision::RetryAfter(delay) => {
                    tracing::warn!(
                        attempt,
                        max_attempts = self.policy.max_attempts(),
                        delay_ms = millis(delay),
                        "retrying after error: {}",
                        err
                    );
                    attempts.push(RequestAttempt {
                        index: attempt,
                        outcome: AttemptOutcome::RetryableFailure,
                        delay: Some(delay),
                    });
                    on_retry(attempt, &err, delay);
                    std::thread::sleep(delay);
                    attempt += 1;
                }
            }
        }
    }
}

/// Runs a closure until it succeeds or the retry policy says to stop.
/// On retryable failure, sleeps for the backoff duration then tries again.
pub fn run_with_retry<T, E, F>(policy: &RetryPolicy, f: F) -> Result<T, E>
where
    E: Classify + fmt::Display,
    F: FnMut() -> Result<T, E>,
{
    RetryExecutor::new(policy.clone()).run(f)
}

/// Whole milliseconds for log fields, saturating at `u64::MAX`.
pub(crate) fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
