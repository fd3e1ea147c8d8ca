//! Error types for configuration management

use std::path::PathBuf;
use thiserror::Error;
use vericp_types::Error as VericpError;

/// Configuration error type
#[derive(Error, Debug)]
pub enum ConfigError {
    /// I/O error when reading or writing a configuration file
    #[error("I/O error on config file '{path}': {source}")]
    Io {
        /// Path to the configuration file
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// Configuration validation error
    #[error("Configuration validation failed: {message}")]
    Validation {
        /// Validation error message
        message: String,
    },

    /// Invalid configuration value
    #[error("Invalid value for '{key}': {message}")]
    InvalidValue {
        /// Configuration key
        key: String,
        /// Error message
        message: String,
    },

    /// Serialization error
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error message
        message: String,
    },

    /// Error raised while layering or deserializing sources
    #[error("Configuration error: {message}")]
    Other {
        /// Error message
        message: String,
    },
}

impl ConfigError {
    /// Create a validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create an invalid value error
    pub fn invalid_value<K: Into<String>, M: Into<String>>(key: K, message: M) -> Self {
        Self::InvalidValue {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Create a generic error
    pub fn other<S: Into<String>>(message: S) -> Self {
        Self::Other {
            message: message.into(),
        }
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(error: serde_yaml::Error) -> Self {
        Self::Serialization {
            message: error.to_string(),
        }
    }
}

impl From<toml::ser::Error> for ConfigError {
    fn from(error: toml::ser::Error) -> Self {
        Self::Serialization {
            message: error.to_string(),
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization {
            message: error.to_string(),
        }
    }
}

impl From<config::ConfigError> for ConfigError {
    fn from(error: config::ConfigError) -> Self {
        Self::Other {
            message: error.to_string(),
        }
    }
}

impl From<ConfigError> for VericpError {
    fn from(error: ConfigError) -> Self {
        Self::config(error.to_string())
    }
}

/// Result type for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;
    use vericp_types::ErrorKind;

    #[test]
    fn test_error_display() {
        let error = ConfigError::invalid_value("io.window_size", "not aligned");
        assert_eq!(
            error.to_string(),
            "Invalid value for 'io.window_size': not aligned"
        );
    }

    #[test]
    fn test_converts_to_workspace_error() {
        let error: VericpError = ConfigError::validation("bad").into();
        assert_eq!(error.kind(), ErrorKind::Config);
        assert!(error.to_string().contains("bad"));
    }
}
