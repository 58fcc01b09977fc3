//! # Engine Configuration
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     SHIFTLINE_DB_PATH=/var/lib/shiftline/shiftline.db                  │
//! │     SHIFTLINE_RETRY_MAX_ATTEMPTS=8                                     │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     shiftline.toml                                                     │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [database]
//! path = "shiftline.db"
//! max_connections = 5
//! busy_timeout_ms = 5000
//!
//! [retry]
//! max_attempts = 5
//! initial_backoff_ms = 20
//! max_backoff_ms = 500
//!
//! [fanout]
//! queue_capacity = 64
//! redis_url = "redis://127.0.0.1/"
//! channel_prefix = "shiftline"
//! ```

use serde::{Deserialize, Serialize};
use shiftline_db::DbConfig;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

// =============================================================================
// Sections
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// How long a statement waits on a locked database.
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("shiftline.db")
}

fn default_max_connections() -> u32 {
    5
}

fn default_busy_timeout() -> u64 {
    5000
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_db_path(),
            max_connections: default_max_connections(),
            busy_timeout_ms: default_busy_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            run_migrations: true,
        }
    }
}

/// Retry budget for transient store failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Total attempts, the first one included.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_backoff() -> u64 {
    20
}

fn default_max_backoff() -> u64 {
    500
}

impl Default for RetrySettings {
    fn default() -> Self {
        RetrySettings {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FanoutSettings {
    /// Frames buffered per live connection before new ones are dropped.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Mirror events to Redis pub/sub when set.
    #[serde(default)]
    pub redis_url: Option<String>,

    #[serde(default = "default_channel_prefix")]
    pub channel_prefix: String,
}

fn default_queue_capacity() -> usize {
    64
}

fn default_channel_prefix() -> String {
    "shiftline".to_string()
}

impl Default for FanoutSettings {
    fn default() -> Self {
        FanoutSettings {
            queue_capacity: default_queue_capacity(),
            redis_url: None,
            channel_prefix: default_channel_prefix(),
        }
    }
}

// =============================================================================
// Engine Configuration
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default)]
    pub fanout: FanoutSettings,
}

impl EngineConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file, if given and present
    /// 3. `SHIFTLINE_*` environment variables
    pub fn load(config_path: Option<&Path>) -> ConfigResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path {
            if path.exists() {
                info!(?path, "Loading engine config from file");
                config = Self::from_toml_str(&std::fs::read_to_string(path)?)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(contents)?)
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies `SHIFTLINE_*` overrides from `lookup`. Values that do not
    /// parse are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parsed<T: std::str::FromStr>(value: Option<String>) -> Option<T> {
            value.and_then(|v| v.trim().parse().ok())
        }

        if let Some(path) = lookup("SHIFTLINE_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }
        if let Some(max) = parsed(lookup("SHIFTLINE_DB_MAX_CONNECTIONS")) {
            self.database.max_connections = max;
        }
        if let Some(ms) = parsed(lookup("SHIFTLINE_DB_BUSY_TIMEOUT_MS")) {
            self.database.busy_timeout_ms = ms;
        }
        if let Some(attempts) = parsed(lookup("SHIFTLINE_RETRY_MAX_ATTEMPTS")) {
            self.retry.max_attempts = attempts;
        }
        if let Some(ms) = parsed(lookup("SHIFTLINE_RETRY_INITIAL_BACKOFF_MS")) {
            self.retry.initial_backoff_ms = ms;
        }
        if let Some(ms) = parsed(lookup("SHIFTLINE_RETRY_MAX_BACKOFF_MS")) {
            self.retry.max_backoff_ms = ms;
        }
        if let Some(capacity) = parsed(lookup("SHIFTLINE_FANOUT_QUEUE_CAPACITY")) {
            self.fanout.queue_capacity = capacity;
        }
        if let Some(url) = lookup("SHIFTLINE_REDIS_URL") {
            self.fanout.redis_url = Some(url).filter(|u| !u.trim().is_empty());
        }
        if let Some(prefix) = lookup("SHIFTLINE_CHANNEL_PREFIX") {
            self.fanout.channel_prefix = prefix;
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.database.path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("database.path must not be empty".into()));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "database.max_connections must be greater than 0".into(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts must be greater than 0".into(),
            ));
        }
        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            return Err(ConfigError::Invalid(
                "retry.initial_backoff_ms must not exceed retry.max_backoff_ms".into(),
            ));
        }
        if self.fanout.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "fanout.queue_capacity must be greater than 0".into(),
            ));
        }
        if let Some(url) = &self.fanout.redis_url {
            if !url.starts_with("redis://") && !url.starts_with("rediss://") {
                return Err(ConfigError::Invalid(format!(
                    "fanout.redis_url must start with redis:// or rediss://, got: {}",
                    url
                )));
            }
        }
        Ok(())
    }

    pub fn to_db_config(&self) -> DbConfig {
        DbConfig::new(&self.database.path)
            .max_connections(self.database.max_connections)
            .busy_timeout(Duration::from_millis(self.database.busy_timeout_ms))
            .connect_timeout(Duration::from_secs(self.database.connect_timeout_secs))
            .run_migrations(self.database.run_migrations)
    }
}
