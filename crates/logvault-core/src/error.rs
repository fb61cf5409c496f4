//! Error types for LogVault configuration

use std::path::PathBuf;

/// Configuration error. Always fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required config key: {0}")]
    MissingKey(String),

    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Config file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("Unsupported config file extension: {0}. Expected .yaml, .yml, .toml, or .json")]
    UnsupportedFormat(PathBuf),

    #[error("No config file found in {0}")]
    NoConfigFile(PathBuf),

    #[error("Directory is not writable: {0}")]
    NotWritable(PathBuf),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("YAML parse error: {0}")]
    YamlError(#[from] serde_yaml::Error),
}

/// Result type alias for configuration handling
pub type Result<T> = std::result::Result<T, ConfigError>;

impl ConfigError {
    pub fn missing<S: Into<String>>(key: S) -> Self {
        ConfigError::MissingKey(key.into())
    }

    pub fn invalid<K: Into<String>, R: Into<String>>(key: K, reason: R) -> Self {
        ConfigError::InvalidValue {
            key: key.into(),
            reason: reason.into(),
        }
    }
}
