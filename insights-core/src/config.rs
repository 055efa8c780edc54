//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/agent-insights/config.toml`.
//!
//! The configuration is an explicit value: callers construct it once at
//! process start (via [`Config::load`] or [`Config::default`]) and pass it
//! into [`crate::ingest::IndexCoordinator::new`]. There is no module-level
//! singleton.
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/agent-insights/` (~/.config/agent-insights/)
//! - Data: `$XDG_DATA_HOME/agent-insights/` (~/.local/share/agent-insights/)
//! - State/Logs: `$XDG_STATE_HOME/agent-insights/` (~/.local/state/agent-insights/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::PathBuf;

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
    /// Transcript source overrides
    #[serde(default)]
    pub sources: SourceOverrides,

    /// Indexing behavior
    #[serde(default)]
    pub indexing: IndexingConfig,

    /// Search behavior
    #[serde(default)]
    pub search: SearchConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Override paths for transcript source directories
#[derive(Debug, Deserialize, Default, Clone)]
pub struct SourceOverrides {
    /// Override root for Claude Code transcripts (default ~/.claude)
    pub claude_code_path: Option<PathBuf>,
}

/// Indexing configuration
#[derive(Debug, Deserialize, Clone)]
pub struct IndexingConfig {
    /// Tool names treated as sub-agent delegation
    #[serde(default = "default_sub_agent_tools")]
    pub sub_agent_tools: Vec<String>,

    /// Divisor for the character-based token estimate
    #[serde(default = "default_chars_per_token")]
    pub chars_per_token: usize,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            sub_agent_tools: default_sub_agent_tools(),
            chars_per_token: default_chars_per_token(),
        }
    }
}

fn default_sub_agent_tools() -> Vec<String> {
    vec!["Task".to_string(), "Agent".to_string(), "dispatch_agent".to_string()]
}

fn default_chars_per_token() -> usize {
    4
}

/// Search configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    /// Default maximum number of hits returned by a search
    #[serde(default = "default_search_limit")]
    pub default_limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_search_limit(),
        }
    }
}

fn default_search_limit() -> usize {
    20
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

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// Runs once at construction; invalid values are reported as
    /// [`Error::Config`] rather than surfacing later at use sites.
    pub fn validate(&self) -> Result<()> {
        if self.indexing.chars_per_token == 0 {
            return Err(Error::Config(
                "indexing.chars_per_token must be at least 1".to_string(),
            ));
        }
        if self.search.default_limit == 0 {
            return Err(Error::Config(
                "search.default_limit must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/agent-insights/config.toml`
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("agent-insights").join("config.toml")
    }

    /// Returns the data directory path (for the SQLite database)
    ///
    /// `$XDG_DATA_HOME/agent-insights/`
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("agent-insights")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/agent-insights/`
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("agent-insights")
    }

    /// Returns the database file path
    ///
    /// `$XDG_DATA_HOME/agent-insights/insights.db`
    pub fn database_path() -> PathBuf {
        Self::data_dir().join("insights.db")
    }

    /// Returns the log file path
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("agent-insights.log")
    }

    /// Root directory holding Claude Code transcripts for this instance.
    ///
    /// Honors the `sources.claude_code_path` override; falls back to
    /// `~/.claude`.
    pub fn claude_code_root(&self) -> PathBuf {
        self.sources
            .claude_code_path
            .clone()
            .unwrap_or_else(|| home_dir().join(".claude"))
    }
}
