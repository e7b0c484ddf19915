//! Configuration management for the frame relay service.
//!
//! Values come from built-in defaults, optional config files and
//! `RELAY__`-prefixed environment variables, in that order of precedence.

use serde::Deserialize;
use std::path::PathBuf;

/// Main configuration for the relay service
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// Frame storage configuration
    #[serde(default)]
    pub storage: StorageConfig,
    /// HTTP API configuration
    #[serde(default)]
    pub api: ApiConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging/metrics
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log output format (json or pretty)
    #[serde(default = "default_log_format")]
    pub log_format: String,
    /// Expose Prometheus metrics
    #[serde(default)]
    pub metrics_enabled: bool,
    /// Metrics port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

/// Frame storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Directory holding uploaded frames, created on startup if absent
    #[serde(default = "default_root_dir")]
    pub root_dir: PathBuf,
}

/// HTTP API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// API listen address
    #[serde(default = "default_api_host")]
    pub host: String,
    /// API listen port
    #[serde(default = "default_api_port")]
    pub port: u16,
    /// Enable CORS
    #[serde(default = "default_true")]
    pub cors_enabled: bool,
    /// Allowed CORS origins (empty = any)
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Largest accepted request body on /upload
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

// Default value functions
fn default_service_name() -> String {
    "frame-relay".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_root_dir() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    5002
}

fn default_true() -> bool {
    true
}

fn default_max_upload_bytes() -> usize {
    16 * 1024 * 1024 // 16MB
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            metrics_enabled: false,
            metrics_port: default_metrics_port(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root_dir: default_root_dir(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
            cors_enabled: default_true(),
            cors_origins: Vec::new(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

impl Config {
    /// Load configuration from environment and config files
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            // Add config file if present
            .add_source(config::File::with_name("config/relay").required(false))
            .add_source(config::File::with_name("/etc/frame-relay/relay").required(false))
            // Override with environment variables
            // RELAY__API__PORT -> api.port
            .add_source(
                config::Environment::with_prefix("RELAY")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("api.cors_origins"),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.storage.root_dir.as_os_str().is_empty() {
            return Err(ConfigValidationError::MissingField(
                "storage.root_dir".to_string(),
            ));
        }

        if self.api.port == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "api.port".to_string(),
                message: "Port must be greater than 0".to_string(),
            });
        }

        if self.api.max_upload_bytes == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "api.max_upload_bytes".to_string(),
                message: "Upload limit must be greater than 0".to_string(),
            });
        }

        if !matches!(self.service.log_format.as_str(), "json" | "pretty") {
            return Err(ConfigValidationError::InvalidValue {
                field: "service.log_format".to_string(),
                message: "Expected json or pretty".to_string(),
            });
        }

        Ok(())
    }

    /// Socket address string the API listens on
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }
}
