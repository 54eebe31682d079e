//! Configuration
//!
//! Loads the command line's settings from `$XDG_CONFIG_HOME/copilot/copilot.toml`.
//!
//! # Configuration Priority
//!
//! Highest first:
//! 1. CLI arguments ([`ConfigOverrides`])
//! 2. Environment variables (`COPILOT_*`)
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [service]
//! base_url = "https://dashboard.example.com/api"
//! timeout_secs = 30
//!
//! [history]
//! capacity = 30
//!
//! [polling]
//! interval_ms = 1000
//!
//! [matching]
//! enter_greedy = false
//! run_greedy = true
//! prefix = "/"
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::command_line::MatchSettings;
use crate::execution::DEFAULT_HISTORY_CAPACITY;

/// Default service endpoint
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080/api";

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Where the effective configuration came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Command-line argument
    Cli,
    /// Environment variable
    Env,
    /// TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// `[service]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceToml {
    /// Copilot API base URL
    pub base_url: Option<String>,
    /// Bearer token
    pub token: Option<String>,
    /// Per-request timeout in seconds
    pub timeout_secs: Option<u64>,
}

/// `[history]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryToml {
    /// Maximum unlocked executions kept
    pub capacity: Option<usize>,
}

/// `[polling]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingToml {
    /// Delay between polls of a working conversation, in milliseconds
    pub interval_ms: Option<u64>,
}

/// `[matching]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingToml {
    /// Greedy matching for lines submitted with enter
    pub enter_greedy: Option<bool>,
    /// Greedy matching for `--run`
    pub run_greedy: Option<bool>,
    /// Root sentinel
    pub prefix: Option<String>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CopilotToml {
    /// Service section
    pub service: ServiceToml,
    /// History section
    pub history: HistoryToml,
    /// Polling section
    pub polling: PollingToml,
    /// Matching section
    pub matching: MatchingToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Effective configuration of the command line
#[derive(Clone, Debug)]
pub struct CopilotConfig {
    /// Copilot API base URL
    pub base_url: String,
    /// Bearer token
    pub token: Option<String>,
    /// Per-request timeout
    pub request_timeout: Duration,
    /// Execution history capacity
    pub history_capacity: usize,
    /// Delay between polls of a working conversation
    pub poll_interval: Duration,
    /// Matching modes and root sentinel
    pub matching: MatchSettings,
    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,
    source: ConfigSource,
}

impl Default for CopilotConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            token: None,
            request_timeout: Duration::from_secs(30),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            poll_interval: Duration::from_millis(1000),
            matching: MatchSettings::default(),
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl CopilotConfig {
    /// Create a configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest-priority source that set a value
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Reject values the command line cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.history_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "history capacity must be at least 1".to_string(),
            ));
        }
        if self.matching.prefix.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "command prefix must not be blank".to_string(),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::ValidationError(
                "poll interval must be positive".to_string(),
            ));
        }
        if self.base_url.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "base URL must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/copilot/copilot.toml`.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("copilot").join("copilot.toml"))
}

/// Load configuration from the default path and the environment
pub fn load_config() -> Result<CopilotConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path and the environment
///
/// A missing file is not an error; a file that cannot be parsed is.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<CopilotConfig, ConfigError> {
    let mut config = CopilotConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: CopilotToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config);
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(path = %config_path.display(), "Loaded configuration from file");
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config, |key| std::env::var(key).ok());
    config.validate()?;

    Ok(config)
}

fn apply_toml_config(config: &mut CopilotConfig, toml: &CopilotToml) {
    if let Some(ref url) = toml.service.base_url {
        config.base_url = url.clone();
    }
    if toml.service.token.is_some() {
        config.token = toml.service.token.clone();
    }
    if let Some(secs) = toml.service.timeout_secs {
        config.request_timeout = Duration::from_secs(secs);
    }
    if let Some(capacity) = toml.history.capacity {
        config.history_capacity = capacity;
    }
    if let Some(ms) = toml.polling.interval_ms {
        config.poll_interval = Duration::from_millis(ms);
    }
    if let Some(greedy) = toml.matching.enter_greedy {
        config.matching.enter_greedy = greedy;
    }
    if let Some(greedy) = toml.matching.run_greedy {
        config.matching.run_greedy = greedy;
    }
    if let Some(ref prefix) = toml.matching.prefix {
        config.matching.prefix = prefix.clone();
    }
}

fn parse_flag(value: &str) -> bool {
    value != "0" && !value.eq_ignore_ascii_case("false")
}

/// Apply `COPILOT_*` variables, read through `lookup`
fn apply_env_config(config: &mut CopilotConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(url) = lookup("COPILOT_BASE_URL") {
        config.base_url = url;
        config.source = ConfigSource::Env;
    }
    if let Some(token) = lookup("COPILOT_TOKEN") {
        config.token = Some(token);
        config.source = ConfigSource::Env;
    }
    if let Some(capacity) = lookup("COPILOT_HISTORY_CAPACITY") {
        match capacity.parse::<usize>() {
            Ok(n) => {
                config.history_capacity = n;
                config.source = ConfigSource::Env;
            }
            Err(_) => tracing::warn!(value = %capacity, "Ignoring invalid COPILOT_HISTORY_CAPACITY"),
        }
    }
    if let Some(interval) = lookup("COPILOT_POLL_INTERVAL_MS") {
        match interval.parse::<u64>() {
            Ok(ms) => {
                config.poll_interval = Duration::from_millis(ms);
                config.source = ConfigSource::Env;
            }
            Err(_) => tracing::warn!(value = %interval, "Ignoring invalid COPILOT_POLL_INTERVAL_MS"),
        }
    }
    if let Some(greedy) = lookup("COPILOT_ENTER_GREEDY") {
        config.matching.enter_greedy = parse_flag(&greedy);
        config.source = ConfigSource::Env;
    }
    if let Some(greedy) = lookup("COPILOT_RUN_GREEDY") {
        config.matching.run_greedy = parse_flag(&greedy);
        config.source = ConfigSource::Env;
    }
    if let Some(prefix) = lookup("COPILOT_COMMAND_PREFIX") {
        config.matching.prefix = prefix;
        config.source = ConfigSource::Env;
    }
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Command-line overrides, applied after [`load_config`]
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Base URL override
    pub base_url: Option<String>,
    /// Token override
    pub token: Option<String>,
    /// Poll interval override (milliseconds)
    pub poll_interval_ms: Option<u64>,
}

impl ConfigOverrides {
    /// Create an empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set base URL override
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set token override
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Set poll interval override
    #[must_use]
    pub fn with_poll_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = Some(ms);
        self
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut CopilotConfig) {
        if self.base_url.is_some() || self.token.is_some() || self.poll_interval_ms.is_some() {
            config.source = ConfigSource::Cli;
        }
        if let Some(ref url) = self.base_url {
            config.base_url = url.clone();
        }
        if let Some(ref token) = self.token {
            config.token = Some(token.clone());
        }
        if let Some(ms) = self.poll_interval_ms {
            config.poll_interval = Duration::from_millis(ms);
        }
    }
}
