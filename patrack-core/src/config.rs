//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/patrack/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/patrack/` (~/.config/patrack/)
//! - Data: `$XDG_DATA_HOME/patrack/` (~/.local/share/patrack/)
//! - State/Logs: `$XDG_STATE_HOME/patrack/` (~/.local/state/patrack/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Deployment settings for the tracker
    #[serde(default)]
    pub tracker: TrackerConfig,

    /// HTTP delivery settings
    #[serde(default)]
    pub transport: TransportConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Deployment-time tracker settings
///
/// These are fixed once the tracker is constructed. The only runtime switch is
/// debug mode, which the facade can turn on but never off.
#[derive(Debug, Deserialize, Clone)]
pub struct TrackerConfig {
    /// Collector endpoint receiving envelopes (e.g., `https://host/api/events`)
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Routing key stamped on every envelope
    #[serde(default)]
    pub project_id: String,

    /// Emit a pageview on load and on in-place navigation
    #[serde(default = "default_true")]
    pub track_pageviews: bool,

    /// Emit `click` events for interactive elements
    #[serde(default = "default_true")]
    pub track_clicks: bool,

    /// Emit `form`/`submit` events
    #[serde(default = "default_true")]
    pub track_forms: bool,

    /// Minutes of inactivity after which a new session starts
    #[serde(default = "default_session_timeout")]
    pub session_timeout_minutes: u32,

    /// Start with debug logging of outgoing envelopes enabled
    #[serde(default)]
    pub debug: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            project_id: String::new(),
            track_pageviews: true,
            track_clicks: true,
            track_forms: true,
            session_timeout_minutes: default_session_timeout(),
            debug: false,
        }
    }
}

impl TrackerConfig {
    /// Session timeout as a chrono duration
    pub fn session_timeout(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.session_timeout_minutes))
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if self.project_id.trim().is_empty() {
            return Err(Error::Config("tracker.project_id is required".to_string()));
        }

        let endpoint = url::Url::parse(&self.endpoint)
            .map_err(|e| Error::Config(format!("tracker.endpoint is not a URL: {}", e)))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(Error::Config(format!(
                "tracker.endpoint must use http or https, got {}",
                endpoint.scheme()
            )));
        }

        if self.session_timeout_minutes == 0 {
            return Err(Error::Config(
                "tracker.session_timeout_minutes must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_endpoint() -> String {
    "http://localhost:5000/api/events".to_string()
}

fn default_true() -> bool {
    true
}

fn default_session_timeout() -> u32 {
    30
}

/// HTTP transport configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TransportConfig {
    /// HTTP request timeout in seconds
    #[serde(default = "default_transport_timeout")]
    pub timeout_secs: u64,

    /// Seconds `shutdown` waits for in-flight sends
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_transport_timeout(),
            shutdown_grace_secs: default_shutdown_grace(),
        }
    }
}

impl TransportConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

fn default_transport_timeout() -> u64 {
    10
}

fn default_shutdown_grace() -> u64 {
    5
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/patrack/config.toml` (~/.config/patrack/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("patrack").join("config.toml")
    }

    /// Returns the data directory path
    ///
    /// `$XDG_DATA_HOME/patrack/` (~/.local/share/patrack/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("patrack")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/patrack/` (~/.local/state/patrack/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("patrack")
    }

    /// Returns the storage database path
    ///
    /// `$XDG_DATA_HOME/patrack/storage.db` (~/.local/share/patrack/storage.db)
    pub fn database_path() -> PathBuf {
        Self::data_dir().join("storage.db")
    }

    /// Returns the log file path; rotated files append a `.YYYY-MM-DD` suffix
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("patrack.log")
    }
}
