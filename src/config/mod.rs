//! Configuration module for Reklam Uploadr
//!
//! Handles loading and parsing of YAML configuration files with support for
//! environment variable expansion and validation.

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

// ============================================================================
// Environment Variable Expansion
// ============================================================================

lazy_static! {
    static ref ENV_VAR_PATTERN: regex_lite::Regex =
        regex_lite::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}").unwrap();
}

/// Expand environment variables in a string.
///
/// Supports two syntaxes:
/// - `${VAR_NAME}` - Simple expansion, keeps placeholder if var not found
/// - `${VAR_NAME:-default}` - Expansion with default value
///
/// # Examples
///
/// ```ignore
/// std::env::set_var("API_HOST", "api.local");
/// assert_eq!(expand_env_vars("https://${API_HOST}/api"), "https://api.local/api");
/// assert_eq!(expand_env_vars("${MISSING:-fallback}"), "fallback");
/// ```
pub(crate) fn expand_env_vars(s: &str) -> String {
    let mut last_match = 0;
    let mut result = String::with_capacity(s.len());

    for cap in ENV_VAR_PATTERN.captures_iter(s) {
        let Some(full_match) = cap.get(0) else {
            continue;
        };
        let var_name = &cap[1];

        result.push_str(&s[last_match..full_match.start()]);

        let value = match std::env::var(var_name) {
            Ok(val) => val,
            Err(_) => match cap.get(2) {
                Some(default) => default.as_str().to_string(),
                // No env var and no default. Keep the original placeholder.
                None => full_match.as_str().to_string(),
            },
        };
        result.push_str(&value);

        last_match = full_match.end();
    }

    result.push_str(&s[last_match..]);
    result
}

/// Validate that a URL starts with http:// or https://
fn is_valid_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        ConfigLoader::load(path)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_valid_http_url(&self.api.base_url) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid API base_url '{}': must start with http:// or https://",
                self.api.base_url
            )));
        }

        if self.api.timeout_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "api.timeout_seconds must be greater than zero".into(),
            ));
        }

        if self.upload.max_files == 0 {
            return Err(ConfigError::ValidationError(
                "upload.max_files must be at least 1".into(),
            ));
        }

        if self.upload.chunk_size == 0 {
            return Err(ConfigError::ValidationError(
                "upload.chunk_size must be at least 1".into(),
            ));
        }

        if self.upload.transfer_timeout_seconds == Some(0) {
            return Err(ConfigError::ValidationError(
                "upload.transfer_timeout_seconds must be greater than zero when set".into(),
            ));
        }

        match self.logging.format.as_str() {
            "pretty" | "json" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid logging format '{}': must be 'pretty' or 'json'",
                    other
                )))
            }
        }

        Ok(())
    }
}

/// Backend API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the REST backend, e.g. `https://api.example.com/api`
    pub base_url: String,
    /// Bearer token forwarded on backend calls
    #[serde(default)]
    pub token: Option<String>,
    /// Deadline for each backend call, also used as the connect timeout of
    /// transfers. Default: 60
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

fn default_timeout_seconds() -> u64 {
    60
}

/// Upload queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Maximum number of files accepted in one batch. Default: 10
    #[serde(default = "default_max_files")]
    pub max_files: usize,
    /// Reject every submission (e.g. permission denied). Default: false
    #[serde(default)]
    pub disabled: bool,
    /// Delay before a fully successful batch is cleared. Default: 1200
    #[serde(default = "default_clear_delay_millis")]
    pub clear_delay_millis: u64,
    /// Size of the chunks streamed during a transfer. Default: 64KB
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Overall deadline of one transfer `PUT`. Default: unset (no deadline)
    #[serde(default)]
    pub transfer_timeout_seconds: Option<u64>,
}

impl UploadConfig {
    pub fn clear_delay(&self) -> Duration {
        Duration::from_millis(self.clear_delay_millis)
    }

    pub fn transfer_timeout(&self) -> Option<Duration> {
        self.transfer_timeout_seconds.map(Duration::from_secs)
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_files: default_max_files(),
            disabled: false,
            clear_delay_millis: default_clear_delay_millis(),
            chunk_size: default_chunk_size(),
            transfer_timeout_seconds: None,
        }
    }
}

fn default_max_files() -> usize {
    10
}

fn default_clear_delay_millis() -> u64 {
    1200
}

fn default_chunk_size() -> usize {
    65536 // 64KB
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Fallback level when RUST_LOG is not set. Default: "info"
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format: "pretty" or "json". Default: "pretty"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}
