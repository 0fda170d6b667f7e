use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use turnstile::config::TurnstileConfig;
use turnstile::http::{AppState, HttpServer};
use turnstile::ratelimit::{
    spawn_sweeper, EvictionPolicy, KeyMode, RateLimiter, Strategy, StrategyKind,
};

/// In-memory admission control service.
#[derive(Debug, Parser)]
#[command(name = "turnstile", version, about)]
struct Args {
    /// Path to a configuration file (YAML, TOML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address for the HTTP server
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Rate limiting strategy
    #[arg(long, value_enum)]
    strategy: Option<StrategyKind>,

    /// How client keys are derived
    #[arg(long, value_enum)]
    key_mode: Option<KeyMode>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format);

    info!("Starting Turnstile Admission Control Service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = TurnstileConfig::load(args.config.as_deref())?;
    if let Some(bind) = args.bind {
        config.server.http_addr = bind;
    }
    if let Some(strategy) = args.strategy {
        config.rate_limiting.strategy = strategy;
    }
    if let Some(key_mode) = args.key_mode {
        config.rate_limiting.key_mode = key_mode;
    }

    let limits = &config.rate_limiting;
    info!(
        http_addr = %config.server.http_addr,
        strategy = %limits.strategy,
        burst_capacity = limits.burst_capacity,
        rate_per_minute = limits.rate_per_minute,
        window_secs = limits.window_secs,
        key_mode = ?limits.key_mode,
        "Configuration loaded"
    );

    let strategy = Strategy::from_config(limits)?;
    let rate_limiter = Arc::new(RateLimiter::new(strategy));
    info!("Rate limiter initialized");

    let sweeper = EvictionPolicy::from_config(&limits.eviction, rate_limiter.strategy())
        .map(|policy| spawn_sweeper(Arc::clone(&rate_limiter), policy));

    let state = Arc::new(AppState::new(rate_limiter, limits.key_mode));
    let server = HttpServer::new(config.server.http_addr, state);

    server.serve_with_shutdown(shutdown_signal()).await?;

    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }

    info!("Turnstile Admission Control Service stopped");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    match format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(fmt::layer().with_target(false).with_thread_ids(true))
            .with(filter)
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init(),
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
