//! Configuration module for s3-multer
//!
//! Handles loading and parsing of YAML configuration files with support for
//! environment variable expansion and validation.
//!
//! ```yaml
//! s3:
//!   region: "${AWS_REGION:-us-east-1}"
//!   endpoint: "http://localhost:9000"
//!   force_path_style: true
//! upload:
//!   part_size: 8388608
//! storage:
//!   bucket: uploads
//!   acl: public-read
//!   content_type: auto
//!   metadata:
//!     source: s3-multer
//! ```

use crate::options::StorageOptions;
use crate::s3::{S3ClientConfig, MIN_PART_SIZE};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use thiserror::Error;

mod loader;

pub use loader::{expand_env_vars, ConfigLoader};

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

    #[error("Invalid option '{name}': expected {expected}, found {found}")]
    InvalidOption {
        name: &'static str,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Missing required option '{0}'")]
    MissingOption(&'static str),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub s3: S3Config,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub storage: StorageSettings,
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
        if self.s3.region.trim().is_empty() {
            return Err(ConfigError::ValidationError("S3 region cannot be empty".into()));
        }

        if let Some(ref endpoint) = self.s3.endpoint {
            if !is_valid_http_url(endpoint) {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid S3 endpoint '{}': must start with http:// or https://",
                    endpoint
                )));
            }
        }

        if self.s3.access_key.is_some() != self.s3.secret_key.is_some() {
            return Err(ConfigError::ValidationError(
                "access_key and secret_key must be set together".into(),
            ));
        }

        if self.upload.part_size < MIN_PART_SIZE {
            return Err(ConfigError::ValidationError(format!(
                "part_size {} is below the S3 minimum of {} bytes",
                self.upload.part_size, MIN_PART_SIZE
            )));
        }

        if self.storage.bucket.is_null() {
            return Err(ConfigError::MissingOption("bucket"));
        }

        // Shape errors surface here rather than at first use.
        StorageOptions::from_settings(&self.storage)?;

        Ok(())
    }

    /// Client settings for [`crate::s3::S3Client`].
    pub fn s3_client_config(&self) -> S3ClientConfig {
        S3ClientConfig {
            region: self.s3.region.clone(),
            endpoint: self.s3.endpoint.clone(),
            access_key: self.s3.access_key.clone(),
            secret_key: self.s3.secret_key.clone(),
            force_path_style: self.s3.force_path_style,
            part_size: self.upload.part_size,
        }
    }

    /// Storage options described by the `storage` section.
    pub fn storage_options(&self) -> Result<StorageOptions, ConfigError> {
        StorageOptions::from_settings(&self.storage)
    }
}

/// S3 backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub access_key: Option<String>,
    #[serde(default)]
    pub secret_key: Option<String>,
    #[serde(default)]
    pub force_path_style: bool,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            region: default_region(),
            endpoint: None,
            access_key: None,
            secret_key: None,
            force_path_style: false,
        }
    }
}

fn default_region() -> String {
    "us-east-1".to_string()
}

/// Upload configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    #[serde(default = "default_part_size")]
    pub part_size: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            part_size: default_part_size(),
        }
    }
}

fn default_part_size() -> usize {
    MIN_PART_SIZE
}

/// Untyped storage option settings.
///
/// Values keep their YAML shape until [`StorageOptions::from_settings`]
/// checks them, so a wrongly typed option is reported by name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub bucket: Value,
    pub key: Value,
    pub acl: Value,
    pub content_type: Value,
    pub metadata: Value,
    pub cache_control: Value,
    pub should_transform: Value,
    pub content_disposition: Value,
    pub content_encoding: Value,
    pub storage_class: Value,
    pub server_side_encryption: Value,
    pub sse_kms_key_id: Value,
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Whether `record_*` calls reach the collectors, see [`crate::metrics::set_enabled`].
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
        }
    }
}

fn default_metrics_enabled() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config_with_bucket() -> Config {
        Config {
            storage: StorageSettings {
                bucket: json!("uploads"),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.s3.region, "us-east-1");
        assert_eq!(config.upload.part_size, MIN_PART_SIZE);
        assert!(config.metrics.enabled);
        assert!(config.storage.bucket.is_null());
    }

    #[test]
    fn test_config_validation_missing_bucket() {
        assert!(matches!(
            Config::default().validate(),
            Err(ConfigError::MissingOption("bucket"))
        ));
    }

    #[test]
    fn test_config_validation_small_part_size() {
        let mut config = config_with_bucket();
        config.upload.part_size = 1024;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_config_validation_bad_endpoint() {
        let mut config = config_with_bucket();
        config.s3.endpoint = Some("localhost:9000".into());
        assert!(config.validate().is_err());

        config.s3.endpoint = Some("http://localhost:9000".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_half_credentials() {
        let mut config = config_with_bucket();
        config.s3.access_key = Some("AKIA".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_wrong_option_shape() {
        let mut config = config_with_bucket();
        config.storage.acl = json!(["private"]);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidOption { name: "acl", .. })
        ));
    }

    #[test]
    fn test_s3_client_config() {
        let mut config = config_with_bucket();
        config.s3.endpoint = Some("http://localhost:9000".into());
        config.s3.force_path_style = true;
        config.upload.part_size = 8 * 1024 * 1024;

        let client = config.s3_client_config();
        assert_eq!(client.endpoint.as_deref(), Some("http://localhost:9000"));
        assert!(client.force_path_style);
        assert_eq!(client.part_size, 8 * 1024 * 1024);
    }
}
