//! Relay configuration management.
//!
//! Handles the configuration file at:
//! - Linux/macOS: ~/.config/tf2-roster-relay/config.toml
//! - Windows: %APPDATA%\tf2-roster-relay\config.toml
//!
//! Every field has a default, so a missing file or a partial file is fine.
//! Command-line flags are applied on top by the binary.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RelayError, Result};

/// Top-level relay configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RelayConfig {
    /// Game client RCON listener
    #[serde(default)]
    pub rcon: RconConfig,

    /// WebSocket push channel
    #[serde(default)]
    pub push: PushConfig,

    /// Console log source
    #[serde(default)]
    pub log: LogSourceConfig,

    /// Engine timers
    #[serde(default)]
    pub timing: TimingConfig,

    /// Player/chat persistence
    #[serde(default)]
    pub store: StoreConfig,

    /// Diagnostic output
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// RCON connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RconConfig {
    #[serde(default = "default_rcon_host")]
    pub host: String,
    #[serde(default = "default_rcon_port")]
    pub port: u16,
    /// Must match `+rcon_password` in the game's launch options
    #[serde(default)]
    pub password: String,
    /// Bound on each socket read/write, not on a whole command
    #[serde(default = "default_io_timeout_secs")]
    pub io_timeout_secs: u64,
}

fn default_rcon_host() -> String {
    "127.0.0.1".to_string()
}

fn default_rcon_port() -> u16 {
    27015
}

fn default_io_timeout_secs() -> u64 {
    10
}

impl Default for RconConfig {
    fn default() -> Self {
        Self {
            host: default_rcon_host(),
            port: default_rcon_port(),
            password: String::new(),
            io_timeout_secs: default_io_timeout_secs(),
        }
    }
}

impl RconConfig {
    pub fn io_timeout(&self) -> Duration {
        Duration::from_secs(self.io_timeout_secs.max(1))
    }
}

/// WebSocket server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushConfig {
    #[serde(default = "default_push_host")]
    pub host: String,
    #[serde(default = "default_push_port")]
    pub port: u16,
    #[serde(default = "default_push_path")]
    pub path: String,
}

fn default_push_host() -> String {
    "127.0.0.1".to_string()
}

fn default_push_port() -> u16 {
    27689
}

fn default_push_path() -> String {
    "/websocket".to_string()
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            host: default_push_host(),
            port: default_push_port(),
            path: default_push_path(),
        }
    }
}

/// Console log settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSourceConfig {
    /// Path to `console.log`; detected from the Steam library when unset
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Empty the log before tailing so old matches are not replayed
    #[serde(default = "default_true")]
    pub truncate_on_start: bool,
    /// Fallback poll interval when no change notification arrives
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_true() -> bool {
    true
}

fn default_poll_interval_ms() -> u64 {
    250
}

impl Default for LogSourceConfig {
    fn default() -> Self {
        Self {
            path: None,
            truncate_on_start: true,
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// Engine timers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Roster coalescing interval
    #[serde(default = "default_publish_interval_ms")]
    pub publish_interval_ms: u64,
    /// Proactive status/lobby refresh interval
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
    /// Age after which an unrefreshed player is evicted
    #[serde(default = "default_staleness_secs")]
    pub staleness_secs: u64,
    /// How often stale players are swept
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_publish_interval_ms() -> u64 {
    1000
}

fn default_refresh_interval_secs() -> u64 {
    10
}

fn default_staleness_secs() -> u64 {
    20
}

fn default_sweep_interval_secs() -> u64 {
    5
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            publish_interval_ms: default_publish_interval_ms(),
            refresh_interval_secs: default_refresh_interval_secs(),
            staleness_secs: default_staleness_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl TimingConfig {
    pub fn publish_interval(&self) -> Duration {
        Duration::from_millis(self.publish_interval_ms.max(1))
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs.max(1))
    }

    pub fn staleness_window(&self) -> Duration {
        Duration::from_secs(self.staleness_secs.max(1))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

/// Persistence settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// SQLite database path; defaults to the platform data directory
    #[serde(default)]
    pub database: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            database: None,
        }
    }
}

impl StoreConfig {
    pub fn database_path(&self) -> PathBuf {
        self.database.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("tf2-roster-relay")
                .join("relay.sqlite3")
        })
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl RelayConfig {
    /// Default configuration file location
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("tf2-roster-relay").join("config.toml"))
    }

    /// Load from `path`, or from the default location when `None`.
    ///
    /// A missing file yields the defaults; an unreadable or malformed one is
    /// an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from(path),
            None => match Self::default_path() {
                Some(path) => Self::load_from(&path),
                None => Ok(Self::default()),
            },
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| RelayError::ConfigError {
            message: format!("Failed to read {}: {}", path.display(), e),
        })?;

        Self::parse(&content)
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| RelayError::ConfigError {
            message: format!("Failed to parse config: {}", e),
        })
    }
}
