//! Core rate limiter implementation.

use std::time::{Duration, Instant};
use tracing::{debug, trace};

use super::decision::Decision;
use super::store::{Entry, LimiterStore, ShardedStore};
use super::strategy::{LimiterState, Strategy};

/// The core rate limiter that applies one strategy to every client key.
///
/// This struct is thread-safe and can be shared across multiple tasks.
/// State is created lazily the first time a key is checked.
pub struct RateLimiter<S: LimiterStore = ShardedStore> {
    /// Strategy applied to every key
    strategy: Strategy,
    /// Per-key state
    store: S,
}

impl RateLimiter<ShardedStore> {
    /// Create a rate limiter backed by the sharded store.
    pub fn new(strategy: Strategy) -> Self {
        Self::with_store(strategy, ShardedStore::new())
    }
}

impl<S: LimiterStore> RateLimiter<S> {
    /// Create a rate limiter over a specific store.
    pub fn with_store(strategy: Strategy, store: S) -> Self {
        Self { strategy, store }
    }

    /// Check whether a request from `key` may proceed right now.
    pub fn check(&self, key: &str) -> Decision {
        self.check_at(key, Instant::now())
    }

    /// Check whether a request from `key` at `now` may proceed.
    ///
    /// Always returns a decision; unknown keys start from fresh state.
    pub fn check_at(&self, key: &str, now: Instant) -> Decision {
        trace!(key = %key, strategy = %self.strategy.kind(), "Checking rate limit");

        let handle = self.store.get_or_init(key, || {
            debug!(
                key = %key,
                strategy = %self.strategy.kind(),
                "Creating new limiter state"
            );
            Entry::new(self.strategy.initial_state(now), now)
        });

        let decision = {
            let mut entry = handle.lock();
            entry.touch(now);
            self.strategy.admit(&mut entry.state, now)
        };

        if !decision.allowed {
            debug!(
                key = %key,
                retry_after_secs = decision.retry_after_secs,
                "Rate limit exceeded"
            );
        }

        decision
    }

    /// Drop state for keys not seen within `idle_ttl` of `now`.
    ///
    /// Returns the number of keys evicted.
    pub fn evict_idle_at(&self, now: Instant, idle_ttl: Duration) -> usize {
        match now.checked_sub(idle_ttl) {
            Some(cutoff) => self.store.retain_active(cutoff),
            None => 0,
        }
    }

    /// Snapshot of the state kept for `key`.
    ///
    /// Returns `None` if the key has never been checked.
    pub fn state_of(&self, key: &str) -> Option<LimiterState> {
        self.store.get(key).map(|handle| handle.lock().state.clone())
    }

    /// The strategy this limiter applies.
    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    /// Get the number of tracked keys.
    pub fn tracked_keys(&self) -> usize {
        self.store.len()
    }

    /// Clear all state.
    ///
    /// This is primarily useful for testing.
    pub fn clear(&self) {
        self.store.clear();
    }
}
