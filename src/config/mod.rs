//! TOML configuration with environment variable overrides.
//!
//! # Configuration Resolution
//!
//! 1. `GCS_LINK_CONFIG` environment variable (explicit path)
//! 2. `./gcs-link.toml` (current directory)
//! 3. `gcs-link.toml` in the platform config directory
//! 4. Built-in defaults (no file required)
//!
//! # Environment Overrides
//!
//! Any value can be overridden with `GCS_LINK_<SECTION>_<KEY>`:
//! - `GCS_LINK_LINK_READ_TIMEOUT_MS=100`
//! - `GCS_LINK_LOGGING_LEVEL=debug`
//! - `GCS_LINK_SETTINGS_PATH=/tmp/links.toml`
//!
//! # Example
//!
//! ```rust,no_run
//! use gcs_serial_link::config::ConfigLoader;
//!
//! let loader = ConfigLoader::load()?;
//! let options = loader.config().link.link_options();
//! println!("read timeout: {:?}", options.read_timeout);
//! # Ok::<(), gcs_serial_link::config::ConfigError>(())
//! ```

mod error;
mod loader;
mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{
    get_default_config_dir, get_default_config_path, resolve_config_path, ConfigLoader,
};
pub use schema::{Config, LinkConfig, LogFormat, LoggingConfig, SettingsConfig};
