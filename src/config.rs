//! # Configuration Management
//!
//! Centralized configuration for the session endpoint, the session proxy and
//! the authoritative simulation.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Direct instantiation with defaults
//! - Environment overrides via `from_env()`
//!
//! Durations are expressed in milliseconds in every source.

use crate::error::{Result, SessionError};
use crate::utils::timeout;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Default upper bound for one framed envelope (tag + payload)
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// Default spawn cell
pub const DEFAULT_SPAWN: (f32, f32) = (20.5, 20.5);

/// Main configuration structure that contains all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct SessionConfig {
    /// Endpoint and tick settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Proxy connection settings
    #[serde(default)]
    pub client: ClientConfig,

    /// Transport configuration
    #[serde(default)]
    pub transport: TransportConfig,

    /// Simulation tuning
    #[serde(default)]
    pub game: GameConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl SessionConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| SessionError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| SessionError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply environment overrides using `lookup` to read variables.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup("SESSION_SERVER_ADDRESS") {
            self.client.address = addr.clone();
            self.server.address = addr;
        }

        if let Some(timeout) = lookup("SESSION_RESPONSE_TIMEOUT_MS") {
            let millis = timeout.parse::<u64>().map_err(|e| {
                SessionError::ConfigError(format!("SESSION_RESPONSE_TIMEOUT_MS: {e}"))
            })?;
            self.client.response_timeout = Duration::from_millis(millis);
        }

        if let Some(tick) = lookup("SESSION_TICK_INTERVAL_MS") {
            let millis = tick.parse::<u64>().map_err(|e| {
                SessionError::ConfigError(format!("SESSION_TICK_INTERVAL_MS: {e}"))
            })?;
            self.server.tick_interval = Duration::from_millis(millis);
        }

        Ok(())
    }

    /// Defaults with `mutator` applied on top.
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// The defaults rendered as TOML, for seeding a config file.
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Every problem found across all sections. Empty means usable.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.server.validate());
        errors.extend(self.client.validate());
        errors.extend(self.transport.validate());
        errors.extend(self.game.validate());
        errors.extend(self.logging.validate());
        errors
    }

    /// [`validate`](Self::validate), folded into one `ConfigError`.
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(SessionError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

/// What a second `initialize_new_game` call does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReinitPolicy {
    /// Keep the first seed and log a warning
    #[default]
    Keep,
    /// Draw a fresh seed
    Reset,
}

/// Endpoint and tick settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address (e.g., "127.0.0.1:6669")
    pub address: String,

    /// Maximum number of decoded events queued for the simulation host
    pub event_queue_limit: usize,

    /// Timeout for graceful shutdown
    #[serde(with = "duration_serde")]
    pub shutdown_timeout: Duration,

    /// Interval between simulation ticks
    #[serde(with = "duration_serde")]
    pub tick_interval: Duration,

    pub reinit_policy: ReinitPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: String::from("127.0.0.1:6669"),
            event_queue_limit: 256,
            shutdown_timeout: timeout::SHUTDOWN_TIMEOUT,
            tick_interval: timeout::TICK_INTERVAL,
            reinit_policy: ReinitPolicy::Keep,
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.address.is_empty() {
            errors.push("Server address cannot be empty".to_string());
        } else if self.address.parse::<std::net::SocketAddr>().is_err() {
            errors.push(format!(
                "Invalid server address format: '{}' (expected format: '0.0.0.0:6669')",
                self.address
            ));
        }

        if self.event_queue_limit == 0 {
            errors.push("Event queue limit must be greater than 0".to_string());
        } else if self.event_queue_limit > 1_000_000 {
            errors.push(format!(
                "Event queue limit too large: {} (max recommended: 1,000,000)",
                self.event_queue_limit
            ));
        }

        if self.shutdown_timeout.as_millis() < 100 {
            errors.push("Shutdown timeout too short (minimum: 100ms)".to_string());
        } else if self.shutdown_timeout.as_secs() > 60 {
            errors.push("Shutdown timeout too long (maximum: 60s)".to_string());
        }

        if self.tick_interval.is_zero() {
            errors.push("Tick interval must be greater than 0".to_string());
        } else if self.tick_interval.as_secs() > 1 {
            errors.push("Tick interval too long (maximum: 1s)".to_string());
        }

        errors
    }
}

/// Proxy connection settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Target server address
    pub address: String,

    /// Upper bound on the TCP connect
    #[serde(with = "duration_serde")]
    pub connection_timeout: Duration,

    /// Upper bound on every wait for a server response
    #[serde(with = "duration_serde")]
    pub response_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            address: String::from("127.0.0.1:6669"),
            connection_timeout: timeout::DEFAULT_TIMEOUT,
            response_timeout: timeout::RESPONSE_TIMEOUT,
        }
    }
}

impl ClientConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.address.is_empty() {
            errors.push("Client address cannot be empty".to_string());
        } else if !is_host_port(&self.address) {
            errors.push(format!(
                "Invalid client address format: '{}' (expected format: 'host:6669')",
                self.address
            ));
        }

        if self.connection_timeout.as_millis() < 100 {
            errors.push("Connection timeout too short (minimum: 100ms)".to_string());
        }

        if self.response_timeout.as_millis() < 10 {
            errors.push("Response timeout too short (minimum: 10ms)".to_string());
        } else if self.response_timeout.as_secs() > 600 {
            errors.push("Response timeout too long (maximum: 600s)".to_string());
        }

        errors
    }
}

/// Transport configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Maximum allowed envelope size (tag + payload) in bytes
    pub max_frame_size: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_frame_size: MAX_FRAME_SIZE,
        }
    }
}

impl TransportConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.max_frame_size == 0 {
            errors.push("Max frame size cannot be 0".to_string());
        } else if self.max_frame_size < 1024 {
            errors.push("Max frame size too small (minimum: 1 KB)".to_string());
        } else if self.max_frame_size > 16 * 1024 * 1024 {
            errors.push(format!(
                "Max frame size too large: {} bytes (maximum: 16 MB)",
                self.max_frame_size
            ));
        }

        errors
    }
}

/// Simulation tuning
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GameConfig {
    pub spawn_x: f32,
    pub spawn_y: f32,

    /// Multiplier applied to hero walk/run velocities
    pub velocity_scale: f32,

    /// Threshold of the single-level table used when a hero has no
    /// experience data
    pub default_experience_threshold: u64,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            spawn_x: DEFAULT_SPAWN.0,
            spawn_y: DEFAULT_SPAWN.1,
            velocity_scale: 0.25,
            default_experience_threshold: 100,
        }
    }
}

impl GameConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if !self.spawn_x.is_finite() || !self.spawn_y.is_finite() {
            errors.push("Spawn position must be finite".to_string());
        }

        if !self.velocity_scale.is_finite() || self.velocity_scale <= 0.0 {
            errors.push(format!(
                "Velocity scale must be a positive number (got {})",
                self.velocity_scale
            ));
        }

        if self.default_experience_threshold == 0 {
            errors.push("Default experience threshold must be greater than 0".to_string());
        }

        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("session-server"),
            log_level: Level::INFO,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        errors
    }
}

/// `host:port` with a non-empty host, resolved later by the connect call.
fn is_host_port(address: &str) -> bool {
    match address.rsplit_once(':') {
        Some((host, port)) => !host.is_empty() && port.parse::<u16>().is_ok(),
        None => false,
    }
}

/// Helper module for Duration serialization/deserialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let level_str = match *level {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };
        level_str.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}
