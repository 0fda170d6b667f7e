//! Token bucket with continuous refill.

use std::time::{Duration, Instant};

use super::decision::Decision;

/// Per-key token bucket.
///
/// The bucket starts full. Capacity and refill rate belong to the strategy,
/// so they are passed in rather than stored per key.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenBucket {
    /// Available tokens, always within `[0, capacity]`
    tokens: f64,
    /// Last time tokens were refilled
    last_refill: Instant,
}

impl TokenBucket {
    /// Create a full bucket.
    pub fn new(capacity: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_refill: now,
        }
    }

    /// Refill tokens based on elapsed time.
    pub fn refill(&mut self, now: Instant, capacity: f64, rate_per_second: f64) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * rate_per_second).min(capacity);
        self.last_refill = self.last_refill.max(now);
    }

    /// Refill, then try to consume one token.
    pub fn admit(&mut self, now: Instant, capacity: f64, rate_per_second: f64) -> Decision {
        self.refill(now, capacity, rate_per_second);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            return Decision::allow();
        }

        let needed = 1.0 - self.tokens;
        let wait = (needed / rate_per_second).ceil();
        Decision::block(wait as u64)
    }

    /// Get remaining tokens.
    pub fn tokens(&self) -> f64 {
        self.tokens
    }

    pub fn last_refill(&self) -> Instant {
        self.last_refill
    }

    /// Time for an empty bucket to fill back up to `capacity`, or `None`
    /// if that is too long to represent as a `Duration`.
    pub fn full_refill_time(capacity: f64, rate_per_second: f64) -> Option<Duration> {
        Duration::try_from_secs_f64(capacity / rate_per_second).ok()
    }
}
