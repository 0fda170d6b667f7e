//! Admission strategies and the per-key state each one keeps.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use super::counter::{CallCounter, WindowCounter};
use super::decision::Decision;
use super::sliding_log::SlidingLog;
use super::token_bucket::TokenBucket;
use crate::config::RateLimitingConfig;
use crate::error::Result;

/// Strategy selector as it appears in configuration and on the command line.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Admit N calls, block the next N, repeat
    FixedCount,
    /// Counter reset at the end of each fixed window
    TimedWindow,
    /// Exact trailing-window log of admissions
    SlidingLog,
    /// Continuously refilled token bucket
    #[default]
    TokenBucket,
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StrategyKind::FixedCount => "fixed_count",
            StrategyKind::TimedWindow => "timed_window",
            StrategyKind::SlidingLog => "sliding_log",
            StrategyKind::TokenBucket => "token_bucket",
        };
        f.write_str(name)
    }
}

/// A configured admission strategy.
///
/// One strategy is active per limiter; every key is judged by it.
#[derive(Debug, Clone, PartialEq)]
pub enum Strategy {
    FixedCount {
        capacity: u64,
        retry_after_secs: u64,
    },
    TimedWindow {
        capacity: u64,
        window: Duration,
    },
    SlidingLog {
        capacity: u64,
        window: Duration,
    },
    TokenBucket {
        capacity: f64,
        rate_per_second: f64,
    },
}

/// Per-key state, one variant per strategy.
#[derive(Debug, Clone, PartialEq)]
pub enum LimiterState {
    FixedCount(CallCounter),
    TimedWindow(WindowCounter),
    SlidingLog(SlidingLog),
    TokenBucket(TokenBucket),
}

impl Strategy {
    /// Build the strategy selected by `config`.
    pub fn from_config(config: &RateLimitingConfig) -> Result<Self> {
        config.validate()?;

        let capacity = config.burst_capacity;
        let window = Duration::from_secs(config.window_secs);

        Ok(match config.strategy {
            StrategyKind::FixedCount => Strategy::fixed_count(
                capacity,
                config.blocked_retry_after_secs,
            ),
            StrategyKind::TimedWindow => Strategy::timed_window(capacity, window),
            StrategyKind::SlidingLog => Strategy::sliding_log(capacity, window),
            StrategyKind::TokenBucket => {
                Strategy::token_bucket(capacity, config.rate_per_minute)
            }
        })
    }

    pub fn fixed_count(capacity: u64, retry_after_secs: u64) -> Self {
        Strategy::FixedCount {
            capacity,
            retry_after_secs,
        }
    }

    pub fn timed_window(capacity: u64, window: Duration) -> Self {
        Strategy::TimedWindow { capacity, window }
    }

    pub fn sliding_log(capacity: u64, window: Duration) -> Self {
        Strategy::SlidingLog { capacity, window }
    }

    pub fn token_bucket(capacity: u64, rate_per_minute: f64) -> Self {
        Strategy::TokenBucket {
            capacity: capacity as f64,
            rate_per_second: rate_per_minute / 60.0,
        }
    }

    pub fn kind(&self) -> StrategyKind {
        match self {
            Strategy::FixedCount { .. } => StrategyKind::FixedCount,
            Strategy::TimedWindow { .. } => StrategyKind::TimedWindow,
            Strategy::SlidingLog { .. } => StrategyKind::SlidingLog,
            Strategy::TokenBucket { .. } => StrategyKind::TokenBucket,
        }
    }

    /// State for a key observed for the first time at `now`.
    pub fn initial_state(&self, now: Instant) -> LimiterState {
        match self {
            Strategy::FixedCount { .. } => LimiterState::FixedCount(CallCounter::new()),
            Strategy::TimedWindow { .. } => LimiterState::TimedWindow(WindowCounter::new(now)),
            Strategy::SlidingLog { .. } => LimiterState::SlidingLog(SlidingLog::new()),
            Strategy::TokenBucket { capacity, .. } => {
                LimiterState::TokenBucket(TokenBucket::new(*capacity, now))
            }
        }
    }

    /// Apply one admission step to `state`.
    pub fn admit(&self, state: &mut LimiterState, now: Instant) -> Decision {
        let decision = match (self, &mut *state) {
            (
                Strategy::FixedCount {
                    capacity,
                    retry_after_secs,
                },
                LimiterState::FixedCount(counter),
            ) => Some(counter.admit(*capacity, *retry_after_secs)),
            (Strategy::TimedWindow { capacity, window }, LimiterState::TimedWindow(counter)) => {
                Some(counter.admit(now, *capacity, *window))
            }
            (Strategy::SlidingLog { capacity, window }, LimiterState::SlidingLog(log)) => {
                Some(log.admit(now, *capacity, *window))
            }
            (
                Strategy::TokenBucket {
                    capacity,
                    rate_per_second,
                },
                LimiterState::TokenBucket(bucket),
            ) => Some(bucket.admit(now, *capacity, *rate_per_second)),
            _ => None,
        };

        match decision {
            Some(decision) => decision,
            // State left behind by a different strategy is treated as unseen.
            None => {
                *state = self.initial_state(now);
                self.admit(state, now)
            }
        }
    }

    /// The span of time the strategy reasons about, if it has one.
    ///
    /// For the token bucket this is the time to refill from empty. A refill
    /// time too long to represent counts as no window.
    pub fn natural_window(&self) -> Option<Duration> {
        match self {
            Strategy::FixedCount { .. } => None,
            Strategy::TimedWindow { window, .. } | Strategy::SlidingLog { window, .. } => {
                Some(*window)
            }
            Strategy::TokenBucket {
                capacity,
                rate_per_second,
            } => TokenBucket::full_refill_time(*capacity, *rate_per_second),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_selects_strategy() {
        let mut config = RateLimitingConfig::default();

        config.strategy = StrategyKind::FixedCount;
        assert_eq!(
            Strategy::from_config(&config).unwrap(),
            Strategy::fixed_count(13, 2)
        );

        config.strategy = StrategyKind::TimedWindow;
        config.window_secs = 5;
        assert_eq!(
            Strategy::from_config(&config).unwrap(),
            Strategy::timed_window(13, Duration::from_secs(5))
        );

        config.strategy = StrategyKind::SlidingLog;
        config.window_secs = 60;
        assert_eq!(
            Strategy::from_config(&config).unwrap().kind(),
            StrategyKind::SlidingLog
        );

        config.strategy = StrategyKind::TokenBucket;
        let strategy = Strategy::from_config(&config).unwrap();
        match strategy {
            Strategy::TokenBucket {
                capacity,
                rate_per_second,
            } => {
                assert_eq!(capacity, 13.0);
                assert!((rate_per_second - 32.0 / 60.0).abs() < 1e-12);
            }
            other => panic!("unexpected strategy {:?}", other),
        }
    }

    #[test]
    fn test_from_config_rejects_invalid() {
        let config = RateLimitingConfig {
            burst_capacity: 0,
            ..Default::default()
        };
        assert!(Strategy::from_config(&config).is_err());
    }

    #[test]
    fn test_initial_state_matches_strategy() {
        let now = Instant::now();
        let strategies = [
            Strategy::fixed_count(3, 2),
            Strategy::timed_window(3, Duration::from_secs(5)),
            Strategy::sliding_log(3, Duration::from_secs(60)),
            Strategy::token_bucket(3, 60.0),
        ];

        for strategy in strategies {
            let state = strategy.initial_state(now);
            let matches = matches!(
                (strategy.kind(), &state),
                (StrategyKind::FixedCount, LimiterState::FixedCount(_))
                    | (StrategyKind::TimedWindow, LimiterState::TimedWindow(_))
                    | (StrategyKind::SlidingLog, LimiterState::SlidingLog(_))
                    | (StrategyKind::TokenBucket, LimiterState::TokenBucket(_))
            );
            assert!(matches, "{} built the wrong state", strategy.kind());
        }
    }

    #[test]
    fn test_mismatched_state_is_replaced() {
        let now = Instant::now();
        let strategy = Strategy::sliding_log(2, Duration::from_secs(60));
        let mut state = LimiterState::FixedCount(CallCounter::new());

        assert!(strategy.admit(&mut state, now).is_allowed());
        match state {
            LimiterState::SlidingLog(log) => assert_eq!(log.len(), 1),
            other => panic!("state not replaced: {:?}", other),
        }
    }

    #[test]
    fn test_natural_window() {
        assert_eq!(Strategy::fixed_count(13, 2).natural_window(), None);
        assert_eq!(
            Strategy::timed_window(13, Duration::from_secs(5)).natural_window(),
            Some(Duration::from_secs(5))
        );
        assert_eq!(
            Strategy::token_bucket(13, 30.0).natural_window(),
            Some(Duration::from_secs(26))
        );
        // Refill time too long to represent
        assert_eq!(Strategy::token_bucket(13, 1e-300).natural_window(), None);
    }

    #[test]
    fn test_kind_display_matches_config_names() {
        assert_eq!(StrategyKind::FixedCount.to_string(), "fixed_count");
        assert_eq!(StrategyKind::TokenBucket.to_string(), "token_bucket");
    }
}
