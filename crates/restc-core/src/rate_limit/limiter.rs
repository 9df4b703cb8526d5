use std::num::NonZeroU32;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use super::window::RateLimitWindow;
use crate::retry::millis;

/// Returned by [`RateLimiter::acquire`] when the wait for a slot would exceed
/// the configured maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("rate limit wait of {wait:?} exceeds the maximum of {max_wait:?}")]
pub struct RateLimitExceeded {
    pub wait: Duration,
    pub max_wait: Duration,
}

#[derive(Debug)]
struct LimiterState {
    second: RateLimitWindow,
    minute: RateLimitWindow,
    /// Server-imposed pause (429 with `Retry-After`).
    paused_until: Option<Instant>,
}

impl LimiterState {
    fn wait_time(&mut self, now: Instant) -> Duration {
        let pause = match self.paused_until {
            Some(until) if until > now => until - now,
            Some(_) => {
                self.paused_until = None;
                Duration::ZERO
            }
            None => Duration::ZERO,
        };
        pause
            .max(self.second.wait_time(now))
            .max(self.minute.wait_time(now))
    }

    fn record(&mut self, now: Instant) {
        self.second.record(now);
        self.minute.record(now);
    }
}

/// Client-side gate keeping outgoing requests under per-second and
/// per-minute ceilings. Shareable across threads (`Arc<RateLimiter>`).
///
/// All check-and-record sequences run under one mutex. Blocking waits in
/// [`acquire`](Self::acquire) sleep with the lock released.
#[derive(Debug)]
pub struct RateLimiter {
    state: Mutex<LimiterState>,
    max_wait: Option<Duration>,
    in_flight: AtomicUsize,
}

impl RateLimiter {
    /// `None` for a ceiling means that window is unlimited.
    pub fn new(
        requests_per_second: Option<NonZeroU32>,
        requests_per_minute: Option<NonZeroU32>,
    ) -> Self {
        Self {
            state: Mutex::new(LimiterState {
                second: RateLimitWindow::per_second(requests_per_second),
                minute: RateLimitWindow::per_minute(requests_per_minute),
                paused_until: None,
            }),
            max_wait: None,
            in_flight: AtomicUsize::new(0),
        }
    }

    pub fn unlimited() -> Self {
        Self::new(None, None)
    }

    /// Fail [`acquire`](Self::acquire) instead of waiting longer than `max_wait`.
    pub fn with_max_wait(mut self, max_wait: Option<Duration>) -> Self {
        self.max_wait = max_wait;
        self
    }

    pub fn max_wait(&self) -> Option<Duration> {
        self.max_wait
    }

    fn lock(&self) -> MutexGuard<'_, LimiterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn allows_request(&self) -> bool {
        self.allows_request_at(Instant::now())
    }

    pub fn allows_request_at(&self, now: Instant) -> bool {
        self.lock().wait_time(now).is_zero()
    }

    /// Time until the next slot opens; zero when a request is allowed now.
    pub fn wait_time(&self) -> Duration {
        self.wait_time_at(Instant::now())
    }

    pub fn wait_time_at(&self, now: Instant) -> Duration {
        self.lock().wait_time(now)
    }

    /// Mark a slot consumed without checking.
    pub fn record_request(&self) {
        self.record_request_at(Instant::now());
    }

    pub fn record_request_at(&self, now: Instant) {
        self.lock().record(now);
    }

    /// Check and record in one lock hold. `None` if no slot is free.
    pub fn try_acquire(&self) -> Option<RateLimitPermit<'_>> {
        self.try_acquire_at(Instant::now())
    }

    pub fn try_acquire_at(&self, now: Instant) -> Option<RateLimitPermit<'_>> {
        let mut state = self.lock();
        if !state.wait_time(now).is_zero() {
            return None;
        }
        state.record(now);
        drop(state);
        Some(self.permit())
    }

    /// Block until a slot is free, then record the request.
    pub fn acquire(&self) -> Result<RateLimitPermit<'_>, RateLimitExceeded> {
        let started = Instant::now();
        loop {
            let wait = {
                let mut state = self.lock();
                let now = Instant::now();
                let wait = state.wait_time(now);
                if wait.is_zero() {
                    state.record(now);
                    drop(state);
                    return Ok(self.permit());
                }
                wait
            };
            if let Some(max_wait) = self.max_wait {
                let total = started.elapsed() + wait;
                if total > max_wait {
                    tracing::warn!(
                        wait_ms = millis(total),
                        max_wait_ms = millis(max_wait),
                        "rate limit wait exceeds maximum"
                    );
                    return Err(RateLimitExceeded {
                        wait: total,
                        max_wait,
                    });
                }
            }
            tracing::debug!(wait_ms = millis(wait), "rate limited, waiting");
            std::thread::sleep(wait);
        }
    }

    /// Run `f` holding a permit; the permit is released on every exit path.
    pub fn with_permit<T, F: FnOnce() -> T>(&self, f: F) -> Result<T, RateLimitExceeded> {
        let _permit = self.acquire()?;
        Ok(f())
    }

    /// Refuse all requests for `duration` (server asked us to back off).
    pub fn pause_for(&self, duration: Duration) {
        self.pause_until(Instant::now() + duration);
    }

    pub fn pause_until(&self, until: Instant) {
        let mut state = self.lock();
        state.paused_until = Some(match state.paused_until {
            Some(existing) => existing.max(until),
            None => until,
        });
    }

    /// Permits currently held.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Forget all recorded requests and any pause.
    pub fn reset(&self) {
        let mut state = self.lock();
        state.second.clear();
        state.minute.clear();
        state.paused_until = None;
    }

    fn permit(&self) -> RateLimitPermit<'_> {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        RateLimitPermit { limiter: self }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::unlimited()
    }
}

/// Releases the in-flight slot when dropped.
#[derive(Debug)]
pub struct RateLimitPermit<'a> {
    limiter: &'a RateLimiter,
}

impl Drop for RateLimitPermit<'_> {
    fn drop(&mut self) {
        self.limiter.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}
