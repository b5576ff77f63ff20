//! `tracing` subscriber setup.

use crate::config::{ConfigError, ConfigResult, LogFormat, LoggingConfig};
use tracing_subscriber::EnvFilter;

/// `RUST_LOG` when set, otherwise the configured level.
fn filter_for(level: &str) -> ConfigResult<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(level)
        .map_err(|e| ConfigError::validation("logging.level", e.to_string()))
}

/// Install the global subscriber, writing to stderr so stdout stays free for
/// link data. Fails if a subscriber is already installed.
pub fn init(config: &LoggingConfig) -> ConfigResult<()> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter_for(&config.level)?)
        .with_writer(std::io::stderr)
        .with_thread_names(true);

    let installed = match config.format {
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Full => builder.try_init(),
    };
    installed.map_err(|e| ConfigError::validation("logging", e.to_string()))
}
