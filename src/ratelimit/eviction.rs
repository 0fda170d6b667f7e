//! Idle state eviction.
//!
//! Limiter state is created for every key ever seen. The sweeper bounds that
//! growth by periodically dropping keys that have been idle for a long time.
//! It runs beside the limiter and does not depend on the strategy in use,
//! beyond deriving a default TTL from its window.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::limiter::RateLimiter;
use super::store::LimiterStore;
use super::strategy::Strategy;
use crate::config::EvictionConfig;

/// Default idle TTL, in multiples of the strategy's natural window.
pub const IDLE_WINDOWS: u32 = 10;

/// When and how often idle keys are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvictionPolicy {
    /// Keys idle for at least this long are dropped
    pub idle_ttl: Duration,
    /// Time between sweeps
    pub sweep_interval: Duration,
}

impl EvictionPolicy {
    /// Resolve the policy for `strategy`, or `None` if eviction is off.
    ///
    /// The fixed-count strategy has no window to derive a TTL from, so it is
    /// only evicted when `idle_ttl_secs` is set explicitly.
    pub fn from_config(config: &EvictionConfig, strategy: &Strategy) -> Option<Self> {
        if !config.enabled {
            return None;
        }

        let idle_ttl = match config.idle_ttl_secs {
            Some(secs) => Duration::from_secs(secs),
            None => match strategy.natural_window() {
                Some(window) => match window.checked_mul(IDLE_WINDOWS) {
                    Some(ttl) => ttl,
                    None => {
                        warn!(
                            strategy = %strategy.kind(),
                            window_secs = window.as_secs(),
                            "Default idle TTL overflows, eviction disabled"
                        );
                        return None;
                    }
                },
                None => {
                    warn!(
                        strategy = %strategy.kind(),
                        "No idle_ttl_secs configured and strategy has no window, eviction disabled"
                    );
                    return None;
                }
            },
        };

        Some(Self {
            idle_ttl,
            sweep_interval: Duration::from_secs(config.sweep_interval_secs),
        })
    }
}

/// Spawn a background task that evicts idle keys on every interval tick.
pub fn spawn_sweeper<S>(limiter: Arc<RateLimiter<S>>, policy: EvictionPolicy) -> JoinHandle<()>
where
    S: LimiterStore + 'static,
{
    info!(
        idle_ttl_secs = policy.idle_ttl.as_secs(),
        sweep_interval_secs = policy.sweep_interval.as_secs(),
        "Starting idle state sweeper"
    );

    tokio::spawn(async move {
        let start = tokio::time::Instant::now() + policy.sweep_interval;
        let mut interval = tokio::time::interval_at(start, policy.sweep_interval);

        loop {
            interval.tick().await;

            let evicted = limiter.evict_idle_at(Instant::now(), policy.idle_ttl);
            if evicted > 0 {
                info!(
                    evicted,
                    remaining = limiter.tracked_keys(),
                    "Evicted idle limiter state"
                );
            } else {
                debug!(remaining = limiter.tracked_keys(), "No idle limiter state to evict");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enabled(idle_ttl_secs: Option<u64>) -> EvictionConfig {
        EvictionConfig {
            enabled: true,
            idle_ttl_secs,
            sweep_interval_secs: 30,
        }
    }

    #[test]
    fn test_default_ttl_is_ten_windows() {
        let strategy = Strategy::sliding_log(13, Duration::from_secs(60));
        let policy = EvictionPolicy::from_config(&enabled(None), &strategy).unwrap();

        assert_eq!(policy.idle_ttl, Duration::from_secs(600));
        assert_eq!(policy.sweep_interval, Duration::from_secs(30));
    }

    #[test]
    fn test_token_bucket_ttl_uses_refill_time() {
        // 13 tokens at 30/min refill in 26s
        let strategy = Strategy::token_bucket(13, 30.0);
        let policy = EvictionPolicy::from_config(&enabled(None), &strategy).unwrap();

        assert_eq!(policy.idle_ttl, Duration::from_secs(260));
    }

    #[test]
    fn test_explicit_ttl_wins() {
        let strategy = Strategy::timed_window(13, Duration::from_secs(5));
        let policy = EvictionPolicy::from_config(&enabled(Some(90)), &strategy).unwrap();

        assert_eq!(policy.idle_ttl, Duration::from_secs(90));
    }

    #[test]
    fn test_fixed_count_needs_explicit_ttl() {
        let strategy = Strategy::fixed_count(13, 2);

        assert!(EvictionPolicy::from_config(&enabled(None), &strategy).is_none());
        assert!(EvictionPolicy::from_config(&enabled(Some(300)), &strategy).is_some());
    }

    #[test]
    fn test_unrepresentable_default_ttl_disables_eviction() {
        let strategies = [
            Strategy::token_bucket(13, 1e-300),
            Strategy::sliding_log(13, Duration::from_secs(u64::MAX)),
            Strategy::timed_window(13, Duration::from_secs(u64::MAX / 5)),
        ];

        for strategy in strategies {
            assert!(
                EvictionPolicy::from_config(&enabled(None), &strategy).is_none(),
                "{}",
                strategy.kind()
            );
            // An explicit TTL still applies
            assert!(EvictionPolicy::from_config(&enabled(Some(300)), &strategy).is_some());
        }
    }

    #[test]
    fn test_disabled() {
        let config = EvictionConfig {
            enabled: false,
            ..Default::default()
        };
        let strategy = Strategy::sliding_log(13, Duration::from_secs(60));

        assert!(EvictionPolicy::from_config(&config, &strategy).is_none());
    }

    #[tokio::test]
    async fn test_sweeper_evicts_idle_keys() {
        let limiter = Arc::new(RateLimiter::new(Strategy::token_bucket(13, 32.0)));
        limiter.check("idle-client");
        assert_eq!(limiter.tracked_keys(), 1);

        let handle = spawn_sweeper(
            Arc::clone(&limiter),
            EvictionPolicy {
                idle_ttl: Duration::from_millis(5),
                sweep_interval: Duration::from_millis(10),
            },
        );

        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.abort();

        assert_eq!(limiter.tracked_keys(), 0);
    }
}
