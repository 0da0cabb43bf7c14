//! Configuration loading: TOML file with environment variable overrides.
//!
//! Looks for `hkbridge.toml` in the working directory. Every field has a
//! sensible default so the file is optional. Environment variables take
//! precedence over file values.

use std::time::Duration;

use serde::Deserialize;

use hkbridge_app::reconciler::ReconcilerConfig;
use hkbridge_domain::id::MacAddress;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Database settings.
    pub database: DatabaseConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Pairing and reconciliation settings.
    pub bridge: BridgeConfig,
    /// Integration toggles.
    pub integrations: IntegrationsConfig,
}

/// `SQLite` database configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// `SQLite` connection URL or file path.
    pub url: String,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

/// Pairing and reconciliation settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// MAC address of the paired bridge, as advertised.
    pub mac: String,
    /// Seconds between two full polls of every accessory.
    pub poll_interval_secs: u64,
    /// Per-attempt timeout of a transport request, in milliseconds.
    pub command_timeout_ms: u64,
    /// Retries after a transient transport failure.
    pub command_retries: u32,
    /// Delay before the first retry, doubled for each further one.
    pub retry_backoff_ms: u64,
    /// Consecutive failures after which an accessory's entities become
    /// unavailable.
    pub unavailable_after: u32,
    /// Capacity of the inbound update channel.
    pub channel_capacity: usize,
    /// Capacity of each per-accessory worker queue.
    pub worker_capacity: usize,
}

/// Per-integration toggles.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct IntegrationsConfig {
    /// Populate the virtual transport with the demo accessories.
    pub virtual_enabled: bool,
    /// Accept `<service> <entity_id>` commands on standard input.
    pub console_enabled: bool,
}

impl Config {
    /// Load configuration from `hkbridge.toml` (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or if a
    /// value is out of range.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::from_file("hkbridge.toml")?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("HKBRIDGE_DATABASE_URL") {
            self.database.url = val;
        }
        if let Ok(val) = std::env::var("HKBRIDGE_MAC") {
            self.bridge.mac = val;
        }
        if let Ok(val) = std::env::var("HKBRIDGE_LOG") {
            self.logging.filter = val;
        }
        if let Ok(val) = std::env::var("RUST_LOG") {
            self.logging.filter = val;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.bridge.mac()?;
        if self.bridge.poll_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "poll interval must be non-zero".to_string(),
            ));
        }
        if self.bridge.command_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "command timeout must be non-zero".to_string(),
            ));
        }
        if self.bridge.unavailable_after == 0 {
            return Err(ConfigError::Validation(
                "unavailable threshold must be at least 1".to_string(),
            ));
        }
        if self.bridge.channel_capacity == 0 || self.bridge.worker_capacity == 0 {
            return Err(ConfigError::Validation(
                "channel capacities must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Return the database URL in `sqlx`-compatible format.
    #[must_use]
    pub fn database_url(&self) -> &str {
        &self.database.url
    }
}

impl BridgeConfig {
    /// The pairing MAC address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] when `mac` is malformed.
    pub fn mac(&self) -> Result<MacAddress, ConfigError> {
        self.mac
            .parse()
            .map_err(|err| ConfigError::Validation(format!("bridge.mac: {err}")))
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    #[must_use]
    pub fn reconciler_config(&self) -> ReconcilerConfig {
        ReconcilerConfig {
            command_timeout: Duration::from_millis(self.command_timeout_ms),
            command_retries: self.command_retries,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
            unavailable_after: self.unavailable_after,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:hkbridge.db?mode=rwc".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "hkbridged=info,hkbridge=info".to_string(),
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            mac: "00:00:00:00:00:00".to_string(),
            poll_interval_secs: 60,
            command_timeout_ms: 10_000,
            command_retries: 2,
            retry_backoff_ms: 500,
            unavailable_after: 3,
            channel_capacity: 256,
            worker_capacity: 32,
        }
    }
}

impl Default for IntegrationsConfig {
    fn default() -> Self {
        Self {
            virtual_enabled: true,
            console_enabled: true,
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}
