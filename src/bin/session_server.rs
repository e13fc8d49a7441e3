//! Standalone authoritative session server.
//!
//! ```text
//! session-server <heroes.toml> [config.toml]
//! ```
//!
//! Environment overrides (`SESSION_SERVER_ADDRESS`, `SESSION_TICK_INTERVAL_MS`,
//! ...) apply on top of the config file.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info};

use session_core::config::SessionConfig;
use session_core::service::LocalServer;
use session_core::sim::data::GameData;
use session_core::utils::logging::init_logging;
use session_core::utils::SessionMetrics;
use session_core::{Result, SessionError};

/// How often counters are written to the log
const METRICS_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("session-server: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let data_path = args.next().ok_or_else(|| {
        SessionError::ConfigError("usage: session-server <heroes.toml> [config.toml]".into())
    })?;

    let mut config = match args.next() {
        Some(path) => SessionConfig::from_file(path)?,
        None => SessionConfig::default(),
    };
    config.apply_env(|key| std::env::var(key).ok())?;
    config.validate_strict()?;

    init_logging(&config.logging)?;

    let data = GameData::from_file(&data_path)?;
    for problem in data.validate() {
        error!(problem = %problem, "game data problem");
    }

    let metrics = Arc::new(SessionMetrics::new());
    let server = LocalServer::start(&config, Arc::new(data), metrics.clone()).await?;
    info!(
        address = %server.local_addr(),
        tick_ms = config.server.tick_interval.as_millis() as u64,
        "session server running"
    );

    let mut ticker = tokio::time::interval(config.server.tick_interval);
    let mut last_tick = Instant::now();
    let mut last_report = Instant::now();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("received CTRL+C, shutting down");
                break;
            }

            _ = ticker.tick() => {
                let now = Instant::now();
                let elapsed_ms = now.duration_since(last_tick).as_millis() as u64;
                last_tick = now;
                server.tick(elapsed_ms)?;

                if last_report.elapsed() >= METRICS_INTERVAL {
                    metrics.log_metrics();
                    last_report = now;
                }
            }
        }
    }

    server.shutdown().await?;
    metrics.log_metrics();
    Ok(())
}
