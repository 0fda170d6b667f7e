//! Rate limiting logic and state management.

mod counter;
mod decision;
mod eviction;
mod key;
mod limiter;
mod sliding_log;
mod store;
mod strategy;
mod token_bucket;

pub use counter::{CallCounter, WindowCounter};
pub use decision::Decision;
pub use eviction::{spawn_sweeper, EvictionPolicy, IDLE_WINDOWS};
pub use key::{ClientKey, KeyMode, ANONYMOUS_USER};
pub use limiter::RateLimiter;
pub use sliding_log::SlidingLog;
pub use store::{Entry, GlobalLockStore, LimiterStore, ShardedStore, StateHandle};
pub use strategy::{LimiterState, Strategy, StrategyKind};
pub use token_bucket::TokenBucket;
