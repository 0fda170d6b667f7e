//! Counter-based limiter state.
//!
//! Two flavours share this module: a pure call-count oscillator with no time
//! dimension, and a counter that resets whenever its window elapses.

use std::time::{Duration, Instant};

use super::decision::Decision;

/// Call counter that admits `capacity` calls, blocks the next `capacity`
/// calls, then starts over.
///
/// Blocking is measured in calls, not time: a client that stops sending
/// stays blocked until it has made enough further calls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallCounter {
    count: u64,
}

impl CallCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one call and decide whether it is admitted.
    pub fn admit(&mut self, capacity: u64, retry_after_secs: u64) -> Decision {
        self.count += 1;

        if self.count <= capacity {
            return Decision::allow();
        }

        if self.count <= capacity.saturating_mul(2) {
            return Decision::block(retry_after_secs);
        }

        // Cycle complete; this call opens the next one.
        self.count = 1;
        Decision::allow()
    }

    /// Calls seen in the current cycle.
    pub fn count(&self) -> u64 {
        self.count
    }
}

/// Counter that tracks calls within a window and resets when it elapses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowCounter {
    /// Calls counted in the current window
    count: u64,
    /// When the current window started
    window_start: Instant,
}

impl WindowCounter {
    /// Create a counter whose first window opens at `now`.
    pub fn new(now: Instant) -> Self {
        Self {
            count: 0,
            window_start: now,
        }
    }

    /// Record one call at `now` and decide whether it is admitted.
    pub fn admit(&mut self, now: Instant, capacity: u64, window: Duration) -> Decision {
        self.maybe_reset_window(now, window);

        self.count += 1;
        if self.count > capacity {
            Decision::block_for(window)
        } else {
            Decision::allow()
        }
    }

    /// Calls counted in the current window.
    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn window_start(&self) -> Instant {
        self.window_start
    }

    /// Reset the window if it has expired.
    fn maybe_reset_window(&mut self, now: Instant, window: Duration) {
        let elapsed = now.saturating_duration_since(self.window_start);

        if elapsed >= window {
            self.count = 0;
            self.window_start = now;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_counter_oscillates() {
        let mut counter = CallCounter::new();

        for call in 1..=13 {
            assert!(counter.admit(13, 2).is_allowed(), "call {} should pass", call);
        }

        for call in 14..=26 {
            let decision = counter.admit(13, 2);
            assert!(!decision.is_allowed(), "call {} should be blocked", call);
            assert_eq!(decision.retry_after_secs, 2);
        }

        // 27th call resets the cycle
        assert!(counter.admit(13, 2).is_allowed());
        assert_eq!(counter.count(), 1);

        // The new cycle admits 12 more before blocking again
        for _ in 0..12 {
            assert!(counter.admit(13, 2).is_allowed());
        }
        assert!(!counter.admit(13, 2).is_allowed());
    }

    #[test]
    fn test_window_counter_within_limit() {
        let start = Instant::now();
        let mut counter = WindowCounter::new(start);

        assert!(counter.admit(start, 10, Duration::from_secs(5)).is_allowed());
        assert_eq!(counter.count(), 1);
    }

    #[test]
    fn test_window_counter_exceeds_limit() {
        let start = Instant::now();
        let window = Duration::from_secs(5);
        let mut counter = WindowCounter::new(start);

        for _ in 0..5 {
            assert!(counter.admit(start, 5, window).is_allowed());
        }

        // The 6th request should be rejected for a full window
        let decision = counter.admit(start, 5, window);
        assert!(!decision.is_allowed());
        assert_eq!(decision.retry_after_secs, 5);
    }

    #[test]
    fn test_window_counter_resets_after_window() {
        let start = Instant::now();
        let window = Duration::from_secs(5);
        let mut counter = WindowCounter::new(start);

        for _ in 0..7 {
            counter.admit(start, 5, window);
        }

        let later = start + window;
        assert!(counter.admit(later, 5, window).is_allowed());
        assert_eq!(counter.count(), 1);
        assert_eq!(counter.window_start(), later);
    }

    #[test]
    fn test_window_counter_ignores_time_going_backwards() {
        let start = Instant::now() + Duration::from_secs(10);
        let window = Duration::from_secs(5);
        let mut counter = WindowCounter::new(start);

        counter.admit(start, 1, window);
        let decision = counter.admit(start - Duration::from_secs(3), 1, window);

        assert!(!decision.is_allowed());
        assert_eq!(counter.window_start(), start);
    }
}
