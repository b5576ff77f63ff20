//! Configuration schema definitions.
//!
//! Every section has defaults, so an empty file (or no file) is a valid
//! configuration.

use super::error::{ConfigError, ConfigResult};
use crate::link::LinkOptions;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Link timing and buffering
    pub link: LinkConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Persisted link configurations
    pub settings: SettingsConfig,
}

impl Config {
    /// Reject values no link could run with.
    pub fn validate(&self) -> ConfigResult<()> {
        self.link.validate()
    }
}

/// `[link]` section, shared by every link a manager creates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Blocking read timeout in milliseconds
    pub read_timeout_ms: u64,
    /// Stalled write attempts tolerated before a write fails
    pub write_retry_limit: u32,
    /// How long DTR/RTS stay low during a reset, in milliseconds
    pub reset_pulse_ms: u64,
    /// Read buffer size in bytes
    pub read_chunk_size: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        let options = LinkOptions::default();
        Self {
            read_timeout_ms: options.read_timeout.as_millis() as u64,
            write_retry_limit: options.write_retry_limit,
            reset_pulse_ms: options.reset_pulse.as_millis() as u64,
            read_chunk_size: options.read_chunk_size,
        }
    }
}

impl LinkConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.read_timeout_ms == 0 {
            return Err(ConfigError::validation(
                "link.read_timeout_ms",
                "must be greater than zero",
            ));
        }
        if self.read_chunk_size == 0 {
            return Err(ConfigError::validation(
                "link.read_chunk_size",
                "must be greater than zero",
            ));
        }
        Ok(())
    }

    /// Options handed to every link.
    pub fn link_options(&self) -> LinkOptions {
        LinkOptions {
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            write_retry_limit: self.write_retry_limit,
            reset_pulse: Duration::from_millis(self.reset_pulse_ms),
            read_chunk_size: self.read_chunk_size,
        }
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset, e.g. "info" or
    /// "gcs_serial_link=debug"
    pub level: String,
    /// Output format
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line with colors
    #[default]
    Pretty,
    /// One line per event
    Compact,
    /// The default `tracing-subscriber` layout
    Full,
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "full" => Ok(Self::Full),
            other => Err(ConfigError::validation(
                "logging.format",
                format!("unknown format '{other}'"),
            )),
        }
    }
}

/// `[settings]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsConfig {
    /// Where link configurations are persisted. Defaults to `links.toml`
    /// in the platform data directory.
    pub path: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.link.read_timeout_ms, 50);
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert!(config.settings.path.is_none());
        assert_eq!(config.link.link_options(), LinkOptions::default());
    }

    #[test]
    fn test_config_serialization() {
        let toml_str = toml::to_string_pretty(&Config::default()).unwrap();
        assert!(toml_str.contains("[link]"));
        assert!(toml_str.contains("[logging]"));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let toml_str = r#"
            [link]
            read_timeout_ms = 100

            [logging]
            format = "compact"
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.link.read_timeout_ms, 100);
        assert_eq!(config.link.write_retry_limit, 8);
        assert_eq!(config.logging.format, LogFormat::Compact);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut config = Config::default();
        config.link.read_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!("FULL".parse::<LogFormat>().unwrap(), LogFormat::Full);
        assert!("json".parse::<LogFormat>().is_err());
    }
}
