//! Configuration management for Turnstile.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use tracing::info;

use crate::error::{Result, TurnstileError};
use crate::ratelimit::{KeyMode, StrategyKind};

/// Prefix for environment variable overrides, e.g.
/// `TURNSTILE__RATE_LIMITING__BURST_CAPACITY=20`.
const ENV_PREFIX: &str = "TURNSTILE";

/// Upper bound for every configured duration, including the token bucket's
/// full refill time (ten years).
pub const MAX_DURATION_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Main configuration for the Turnstile service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnstileConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server address
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
        }
    }
}

fn default_http_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8000))
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Admission strategy used for every key
    #[serde(default)]
    pub strategy: StrategyKind,

    /// Requests admitted back-to-back before limiting engages
    #[serde(default = "default_burst_capacity")]
    pub burst_capacity: u64,

    /// Token bucket refill rate
    #[serde(default = "default_rate_per_minute")]
    pub rate_per_minute: f64,

    /// Window length for the timed window and sliding log strategies
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Retry hint returned by the fixed-count strategy while blocking
    #[serde(default = "default_blocked_retry_after")]
    pub blocked_retry_after_secs: u64,

    /// How client keys are derived from caller identity
    #[serde(default)]
    pub key_mode: KeyMode,

    /// Idle state eviction
    #[serde(default)]
    pub eviction: EvictionConfig,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::default(),
            burst_capacity: default_burst_capacity(),
            rate_per_minute: default_rate_per_minute(),
            window_secs: default_window_secs(),
            blocked_retry_after_secs: default_blocked_retry_after(),
            key_mode: KeyMode::default(),
            eviction: EvictionConfig::default(),
        }
    }
}

fn default_burst_capacity() -> u64 {
    13
}

fn default_rate_per_minute() -> f64 {
    32.0
}

fn default_window_secs() -> u64 {
    60
}

fn default_blocked_retry_after() -> u64 {
    2
}

/// Idle eviction configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvictionConfig {
    /// Whether the background sweep runs at all
    #[serde(default = "default_eviction_enabled")]
    pub enabled: bool,

    /// Idle time after which a key's state is dropped.
    /// Defaults to ten times the strategy's natural window.
    #[serde(default)]
    pub idle_ttl_secs: Option<u64>,

    /// Interval between sweeps
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for EvictionConfig {
    fn default() -> Self {
        Self {
            enabled: default_eviction_enabled(),
            idle_ttl_secs: None,
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

fn default_eviction_enabled() -> bool {
    true
}

fn default_sweep_interval() -> u64 {
    60
}

impl RateLimitingConfig {
    /// Reject values that would make a strategy meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.burst_capacity == 0 {
            return Err(TurnstileError::Config(
                "burst_capacity must be at least 1".to_string(),
            ));
        }
        if !self.rate_per_minute.is_finite() || self.rate_per_minute <= 0.0 {
            return Err(TurnstileError::Config(format!(
                "rate_per_minute must be a positive number, got {}",
                self.rate_per_minute
            )));
        }
        let refill_secs = self.burst_capacity as f64 * 60.0 / self.rate_per_minute;
        if refill_secs > MAX_DURATION_SECS as f64 {
            return Err(TurnstileError::Config(format!(
                "rate_per_minute {} is too low: refilling {} tokens would take longer than {}s",
                self.rate_per_minute, self.burst_capacity, MAX_DURATION_SECS
            )));
        }
        check_duration("window_secs", self.window_secs)?;
        check_duration("blocked_retry_after_secs", self.blocked_retry_after_secs)?;
        check_duration(
            "eviction.sweep_interval_secs",
            self.eviction.sweep_interval_secs,
        )?;
        if let Some(idle_ttl_secs) = self.eviction.idle_ttl_secs {
            check_duration("eviction.idle_ttl_secs", idle_ttl_secs)?;
        }
        Ok(())
    }
}

fn check_duration(name: &str, secs: u64) -> Result<()> {
    if secs == 0 {
        return Err(TurnstileError::Config(format!(
            "{} must be at least 1",
            name
        )));
    }
    if secs > MAX_DURATION_SECS {
        return Err(TurnstileError::Config(format!(
            "{} must be at most {}, got {}",
            name, MAX_DURATION_SECS, secs
        )));
    }
    Ok(())
}

impl TurnstileConfig {
    /// Load configuration from an optional file, layered with
    /// `TURNSTILE__*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();

        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(::config::File::from(path));
        }

        let config: TurnstileConfig = builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.rate_limiting.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: TurnstileConfig = serde_yaml::from_str(yaml)
            .map_err(|e| TurnstileError::Config(format!("Failed to parse config: {}", e)))?;
        config.rate_limiting.validate()?;
        Ok(config)
    }
}
