//! Configuration module for Stream Uploadr
//!
//! Handles loading and parsing of YAML configuration files with support for
//! environment variable expansion and validation. The resulting [`Config`] is
//! passed explicitly to the S3 client and server at construction time.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

/// Smallest part size S3 accepts for every part except the last one.
pub const S3_MIN_PART_SIZE: usize = 5 * 1024 * 1024;

// ============================================================================
// Environment Variable Expansion
// ============================================================================

/// Expand environment variables in a string.
///
/// Supports two syntaxes:
/// - `${VAR_NAME}` - Simple expansion, keeps placeholder if var not found
/// - `${VAR_NAME:-default}` - Expansion with default value
///
/// Variable names must start with an uppercase letter or underscore and
/// contain only uppercase letters, digits, and underscores.
///
/// # Examples
///
/// ```ignore
/// std::env::set_var("MY_VAR", "value");
/// let result = expand_env_vars("prefix-${MY_VAR}-suffix");
/// assert_eq!(result, "prefix-value-suffix");
///
/// let result = expand_env_vars("${MISSING:-default}");
/// assert_eq!(result, "default");
/// ```
pub(crate) fn expand_env_vars(s: &str) -> String {
    let re = match regex_lite::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}") {
        Ok(re) => re,
        Err(_) => return s.to_string(),
    };
    let mut last_match = 0;
    let mut result = String::with_capacity(s.len());

    for cap in re.captures_iter(s) {
        let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
            continue;
        };

        result.push_str(&s[last_match..full_match.start()]);

        let value = match std::env::var(var_name.as_str()) {
            Ok(val) => val,
            Err(_) => match cap.get(2) {
                Some(default) => default.as_str().to_string(),
                // No env var and no default: keep the original placeholder.
                None => full_match.as_str().to_string(),
            },
        };
        result.push_str(&value);

        last_match = full_match.end();
    }

    result.push_str(&s[last_match..]);

    result
}

// ============================================================================
// Validation Helpers
// ============================================================================

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
    #[serde(default)]
    pub server: ServerConfig,
    pub s3: S3Config,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Config {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        ConfigLoader::load(path)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.s3.bucket.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "s3.bucket must not be empty".into(),
            ));
        }

        if self.s3.region.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "s3.region must not be empty".into(),
            ));
        }

        if let Some(ref endpoint) = self.s3.endpoint {
            if !is_valid_http_url(endpoint) {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid S3 endpoint '{}': must start with http:// or https://",
                    endpoint
                )));
            }
        }

        if self.s3.request_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "s3.request_timeout_secs must be greater than 0".into(),
            ));
        }

        if self.upload.min_part_size == 0 {
            return Err(ConfigError::ValidationError(
                "upload.min_part_size must be greater than 0".into(),
            ));
        }

        if self.upload.min_part_size < S3_MIN_PART_SIZE && !self.upload.allow_small_parts {
            return Err(ConfigError::ValidationError(format!(
                "upload.min_part_size {} is below the S3 minimum of {} bytes \
                 (set upload.allow_small_parts for S3-compatible test stores)",
                self.upload.min_part_size, S3_MIN_PART_SIZE
            )));
        }

        if !self.server.ingest_path.starts_with('/') {
            return Err(ConfigError::ValidationError(format!(
                "Invalid ingest_path '{}': must start with '/'",
                self.server.ingest_path
            )));
        }

        if self.server.channel_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "server.channel_capacity must be greater than 0".into(),
            ));
        }

        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_address")]
    pub address: String,
    /// Path that accepts streaming uploads
    #[serde(default = "default_ingest_path")]
    pub ingest_path: String,
    /// Chunks queued per session before the connection is back-pressured
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            ingest_path: default_ingest_path(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

fn default_address() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_ingest_path() -> String {
    "/ws".to_string()
}

fn default_channel_capacity() -> usize {
    32
}

/// S3 backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub access_key: Option<String>,
    #[serde(default)]
    pub secret_key: Option<String>,
    #[serde(default)]
    pub session_token: Option<String>,
    /// Upper bound on every S3 request; expiry counts as a network failure
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout_secs() -> u64 {
    30
}

/// Upload configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Buffered bytes that trigger a non-final part upload
    #[serde(default = "default_min_part_size")]
    pub min_part_size: usize,
    /// Permit `min_part_size` below the S3 minimum (MinIO/test stores only)
    #[serde(default)]
    pub allow_small_parts: bool,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    #[serde(default = "default_key_suffix")]
    pub key_suffix: String,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            min_part_size: default_min_part_size(),
            allow_small_parts: false,
            key_prefix: default_key_prefix(),
            key_suffix: default_key_suffix(),
        }
    }
}

impl UploadConfig {
    /// Generate a fresh destination key, e.g. `audio/<uuid>.wav`
    pub fn generate_key(&self) -> String {
        format!(
            "{}{}{}",
            self.key_prefix,
            uuid::Uuid::new_v4(),
            self.key_suffix
        )
    }
}

fn default_min_part_size() -> usize {
    S3_MIN_PART_SIZE
}

fn default_key_prefix() -> String {
    "audio/".to_string()
}

fn default_key_suffix() -> String {
    ".wav".to_string()
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            port: default_metrics_port(),
        }
    }
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_metrics_port() -> u16 {
    9090
}
