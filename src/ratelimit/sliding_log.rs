//! Sliding window log state.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use super::decision::Decision;

/// Exact record of admitted requests within a trailing window.
///
/// Memory per key is proportional to `capacity`, since blocked requests are
/// never recorded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlidingLog {
    /// Admission times, oldest first
    timestamps: VecDeque<Instant>,
}

impl SlidingLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide whether a request at `now` is admitted, recording it if so.
    pub fn admit(&mut self, now: Instant, capacity: u64, window: Duration) -> Decision {
        self.prune(now, window);

        if self.timestamps.len() as u64 >= capacity {
            return Decision::block_for(window);
        }

        // Keep the log ordered even if the caller's clock stalls.
        let at = self.timestamps.back().map_or(now, |last| now.max(*last));
        self.timestamps.push_back(at);
        Decision::allow()
    }

    /// Drop entries that have aged out of the window ending at `now`.
    pub fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(oldest) = self.timestamps.front() {
            if now.saturating_duration_since(*oldest) >= window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    /// Number of admissions currently in the log.
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Oldest admission still in the log.
    pub fn oldest(&self) -> Option<Instant> {
        self.timestamps.front().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(60);

    #[test]
    fn test_fourteenth_request_in_window_blocked() {
        let start = Instant::now();
        let mut log = SlidingLog::new();

        for i in 0..13 {
            let decision = log.admit(start + Duration::from_secs(i), 13, WINDOW);
            assert!(decision.is_allowed(), "request at t={} should pass", i);
        }

        let decision = log.admit(start + Duration::from_secs(13), 13, WINDOW);
        assert!(!decision.is_allowed());
        assert_eq!(decision.retry_after_secs, 60);
        assert_eq!(log.len(), 13);
    }

    #[test]
    fn test_expired_entries_free_capacity() {
        let start = Instant::now();
        let mut log = SlidingLog::new();

        for i in 0..13 {
            log.admit(start + Duration::from_secs(i), 13, WINDOW);
        }

        // At t=61 the entries from t=0 and t=1 have aged out
        let now = start + Duration::from_secs(61);
        assert!(log.admit(now, 13, WINDOW).is_allowed());
        assert_eq!(log.len(), 12);
        assert_eq!(log.oldest(), Some(start + Duration::from_secs(2)));
    }

    #[test]
    fn test_prune_keeps_only_trailing_window() {
        let start = Instant::now();
        let mut log = SlidingLog::new();

        for i in 0..5 {
            log.admit(start + Duration::from_secs(i * 20), 10, WINDOW);
        }

        let now = start + Duration::from_secs(100);
        log.prune(now, WINDOW);

        // Entries at 60, 80 remain; 0, 20, 40 are at least 60s old
        assert_eq!(log.len(), 2);
        assert!(log
            .oldest()
            .map(|t| now.duration_since(t) < WINDOW)
            .unwrap_or(true));
    }

    #[test]
    fn test_entry_exactly_window_old_is_dropped() {
        let start = Instant::now();
        let mut log = SlidingLog::new();

        log.admit(start, 1, WINDOW);
        assert!(!log.admit(start + Duration::from_secs(59), 1, WINDOW).is_allowed());
        assert!(log.admit(start + WINDOW, 1, WINDOW).is_allowed());
    }
}
