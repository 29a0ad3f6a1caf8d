//! Configuration loading and management
//!
//! [`TrackerOptions`] is the per-session configuration handed to
//! [`crate::App`]. For the `yamak` CLI the same options, plus transport and
//! logging settings, are loaded from `~/.config/yamak/config.toml`.
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/yamak/` (~/.config/yamak/)
//! - State/Logs: `$XDG_STATE_HOME/yamak/` (~/.local/state/yamak/)

use crate::error::{Error, Result};
use crate::transport::SendCallback;
use crate::types::API_URL;
use serde::Deserialize;
use std::path::{Path, PathBuf};

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

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Tracking session configuration
    #[serde(default)]
    pub tracker: TrackerConfig,

    /// HTTP transport configuration
    #[serde(default)]
    pub transport: TransportConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// `[tracker]` section: the project plus its session options
#[derive(Debug, Deserialize, Default, Clone)]
pub struct TrackerConfig {
    /// Project (website) identifier sent with every event
    pub project_id: Option<String>,

    #[serde(flatten)]
    pub options: TrackerOptions,
}

/// Options recognized by a tracking session.
///
/// Nothing is validated: absent fields default to disabled/false.
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct TrackerOptions {
    /// Do not poll for path changes or send page views
    pub disable_page_view_tracking: bool,

    /// Do not send any event
    pub disable_event_tracking: bool,

    /// Forwarded to the collector as `ignoreErrors`
    pub ignore_errors: bool,

    /// Include `location.hash` in tracked paths
    pub track_hash: bool,

    /// Include `location.search` in tracked paths
    pub track_search: bool,

    /// Paths whose page views are not sent (see [`crate::matcher`])
    pub exclude_paths: Vec<String>,

    /// Send an event when a link to another host is clicked
    pub track_outbound_links: bool,

    /// Collector endpoint, defaults to [`API_URL`]
    pub endpoint: Option<String>,

    /// Called when each normal send completes
    #[serde(skip)]
    pub on_send_complete: Option<SendCallback>,
}

impl TrackerOptions {
    /// The configured endpoint or the default collector
    pub fn endpoint(&self) -> &str {
        self.endpoint.as_deref().unwrap_or(API_URL)
    }
}

/// `[transport]` section
#[derive(Debug, Deserialize, Clone)]
pub struct TransportConfig {
    /// HTTP request timeout in seconds
    #[serde(default = "default_transport_timeout")]
    pub timeout_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_transport_timeout(),
        }
    }
}

fn default_transport_timeout() -> u64 {
    10
}

/// Logging configuration
#[derive(Debug, Deserialize)]
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
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/yamak/config.toml` (~/.config/yamak/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("yamak").join("config.toml")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/yamak/` (~/.local/state/yamak/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("yamak")
    }
}
