//! Subscriber setup for binaries.
//!
//! The library only emits `tracing` events; installing a subscriber is left
//! to whoever owns the process.

use tracing_subscriber::fmt;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::error::{Result, SessionError};

/// Install a global `fmt` subscriber described by `config`.
///
/// `RUST_LOG`, when set, takes precedence over `log_level`.
///
/// # Errors
/// `ConfigError` if a global subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str().to_lowercase()));

    let builder = fmt().with_env_filter(filter).with_target(true);

    let installed = if config.json_format {
        builder.json().with_current_span(true).try_init()
    } else {
        builder.compact().try_init()
    };

    installed.map_err(|e| SessionError::ConfigError(format!("Failed to install logger: {e}")))?;

    tracing::info!(app = %config.app_name, "logging initialized");
    Ok(())
}
