//! Errors raised while loading, validating or saving the monitor's config.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {}: {source}", path.display())]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config file is not valid TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("cannot encode config as TOML: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("cannot write config file {}: {source}", path.display())]
    WriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A value parsed but is out of range for its key.
    #[error("bad value for {key}: {message}")]
    ValidationError { key: String, message: String },

    /// An override variable was set to something unparsable.
    #[error("environment override {var} ignored: {message}")]
    EnvParseError { var: String, message: String },

    #[error("no value for {0}")]
    MissingRequired(String),
}

impl ConfigError {
    pub fn validation<K: Into<String>, M: Into<String>>(key: K, message: M) -> Self {
        Self::ValidationError {
            key: key.into(),
            message: message.into(),
        }
    }

    pub fn env_parse<V: Into<String>, M: Into<String>>(var: V, message: M) -> Self {
        Self::EnvParseError {
            var: var.into(),
            message: message.into(),
        }
    }
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
