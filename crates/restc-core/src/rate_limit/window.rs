//! Sliding window of recent request instants.

use std::collections::VecDeque;
use std::num::NonZeroU32;
use std::time::{Duration, Instant};

/// Time-ordered request timestamps for one trailing span (e.g. 1 s or 60 s).
///
/// Timestamps older than the span are pruned lazily on every check, so the
/// queue never holds more than the requests recorded within one span. A
/// window without a ceiling records nothing. A ceiling is never zero.
#[derive(Debug, Clone)]
pub struct RateLimitWindow {
    span: Duration,
    limit: Option<NonZeroU32>,
    stamps: VecDeque<Instant>,
}

impl RateLimitWindow {
    pub fn new(span: Duration, limit: Option<NonZeroU32>) -> Self {
        Self {
            span,
            limit,
            stamps: VecDeque::new(),
        }
    }

    pub fn per_second(limit: Option<NonZeroU32>) -> Self {
        Self::new(Duration::from_secs(1), limit)
    }

    pub fn per_minute(limit: Option<NonZeroU32>) -> Self {
        Self::new(Duration::from_secs(60), limit)
    }

    pub fn span(&self) -> Duration {
        self.span
    }

    pub fn limit(&self) -> Option<NonZeroU32> {
        self.limit
    }

    fn prune(&mut self, now: Instant) {
        while let Some(&oldest) = self.stamps.front() {
            if now.saturating_duration_since(oldest) >= self.span {
                self.stamps.pop_front();
            } else {
                break;
            }
        }
    }

    /// Requests recorded within the trailing span.
    pub fn count(&mut self, now: Instant) -> usize {
        self.prune(now);
        self.stamps.len()
    }

    /// Time until one more request fits, zero if it fits now.
    ///
    /// With the window at its ceiling this is `span - (now - oldest)`, where
    /// "oldest" is the stamp whose expiry brings the count below the limit.
    pub fn wait_time(&mut self, now: Instant) -> Duration {
        let Some(limit) = self.limit else {
            return Duration::ZERO;
        };
        let count = self.count(now);
        let limit = limit.get() as usize;
        if count < limit {
            return Duration::ZERO;
        }
        let blocking = self.stamps[count - limit];
        self.span
            .saturating_sub(now.saturating_duration_since(blocking))
    }

    pub fn record(&mut self, now: Instant) {
        if self.limit.is_none() {
            return;
        }
        self.prune(now);
        self.stamps.push_back(now);
    }

    pub fn clear(&mut self) {
        self.stamps.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_and_drains() {
        let t0 = Instant::now();
        let mut w = RateLimitWindow::per_second(NonZeroU32::new(3));
        for i in 0..3 {
            assert_eq!(w.wait_time(t0), Duration::ZERO);
            w.record(t0 + Duration::from_millis(i * 100));
        }
        let now = t0 + Duration::from_millis(250);
        assert_eq!(w.count(now), 3);
        assert_eq!(w.wait_time(now), Duration::from_millis(750));

        let later = t0 + Duration::from_millis(1000);
        assert_eq!(w.count(later), 2);
        assert_eq!(w.wait_time(later), Duration::ZERO);
    }

    #[test]
    fn unlimited_window_records_nothing() {
        let t0 = Instant::now();
        let mut w = RateLimitWindow::per_minute(None);
        for _ in 0..1000 {
            w.record(t0);
        }
        assert_eq!(w.count(t0), 0);
        assert_eq!(w.wait_time(t0), Duration::ZERO);
    }

    #[test]
    fn overfull_window_waits_for_enough_expiry() {
        let t0 = Instant::now();
        let mut w = RateLimitWindow::per_second(NonZeroU32::new(2));
        w.record(t0);
        w.record(t0 + Duration::from_millis(100));
        w.record(t0 + Duration::from_millis(200));
        // Three stamps against a limit of two: the second stamp must expire.
        let now = t0 + Duration::from_millis(300);
        assert_eq!(w.wait_time(now), Duration::from_millis(800));
    }

    #[test]
    fn clear_empties_window() {
        let t0 = Instant::now();
        let mut w = RateLimitWindow::per_second(NonZeroU32::new(1));
        w.record(t0);
        assert!(w.wait_time(t0) > Duration::ZERO);
        w.clear();
        assert_eq!(w.wait_time(t0), Duration::ZERO);
    }

    #[test]
    fn single_slot_window_blocks_on_first_stamp() {
        let t0 = Instant::now();
        let mut w = RateLimitWindow::per_second(NonZeroU32::new(1));
        assert_eq!(w.wait_time(t0), Duration::ZERO);
        w.record(t0);
        assert_eq!(
            w.wait_time(t0 + Duration::from_millis(400)),
            Duration::from_millis(600)
        );
    }

    #[test]
    fn zero_ceiling_cannot_be_expressed() {
        // NonZeroU32::new(0) is None, i.e. no ceiling: checks never index an empty queue.
        let t0 = Instant::now();
        let mut w = RateLimitWindow::per_second(NonZeroU32::new(0));
        assert_eq!(w.limit(), None);
        assert_eq!(w.wait_time(t0), Duration::ZERO);
        w.record(t0);
        assert_eq!(w.count(t0), 0);
    }
}
