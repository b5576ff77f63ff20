//! Configuration loader with file resolution and environment override support.

use super::error::{ConfigError, ConfigResult};
use super::schema::Config;
use directories::ProjectDirs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

/// Environment variable prefix for overrides
const ENV_PREFIX: &str = "GCS_LINK";

/// Config file name
const CONFIG_FILE_NAME: &str = "gcs-link.toml";

/// Environment variable for explicit config path
const CONFIG_PATH_ENV: &str = "GCS_LINK_CONFIG";

/// File holding persisted link configurations
const SETTINGS_FILE_NAME: &str = "links.toml";

/// Configuration loader with resolution and override logic.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Resolved config file path (if any)
    pub config_path: Option<PathBuf>,
    /// The loaded configuration
    pub config: Config,
}

impl ConfigLoader {
    /// Load configuration using standard resolution order.
    ///
    /// Resolution priority (highest to lowest):
    /// 1. `GCS_LINK_CONFIG` environment variable (explicit path)
    /// 2. `./gcs-link.toml` (current directory)
    /// 3. `gcs-link.toml` in the platform config directory
    /// 4. Built-in defaults (no file required)
    ///
    /// Environment variables override values from the file.
    pub fn load() -> ConfigResult<Self> {
        let config_path = resolve_config_path();

        let mut config = if let Some(ref path) = config_path {
            debug!("Loading configuration from {}", path.display());
            load_from_file(path)?
        } else {
            debug!("No configuration file found, using defaults");
            Config::default()
        };

        apply_env_overrides(&mut config)?;
        config.validate()?;

        Ok(Self { config_path, config })
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut config = load_from_file(&path)?;
        apply_env_overrides(&mut config)?;
        config.validate()?;

        Ok(Self {
            config_path: Some(path),
            config,
        })
    }

    /// Defaults plus environment overrides, no file.
    pub fn with_defaults() -> ConfigResult<Self> {
        let mut config = Config::default();
        apply_env_overrides(&mut config)?;
        config.validate()?;

        Ok(Self {
            config_path: None,
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn into_config(self) -> Config {
        self.config
    }

    /// Save the current configuration to a specific file.
    pub fn save_to(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        save_to_file(&self.config, path.as_ref())
    }

    /// Where link configurations are persisted: `[settings] path` when set,
    /// otherwise `links.toml` in the platform data directory.
    pub fn settings_path(&self) -> ConfigResult<PathBuf> {
        if let Some(path) = &self.config.settings.path {
            return Ok(path.clone());
        }
        project_dirs()
            .map(|dirs| dirs.data_dir().join(SETTINGS_FILE_NAME))
            .ok_or_else(|| {
                ConfigError::MissingRequired(
                    "settings.path (no platform data directory available)".to_string(),
                )
            })
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("org", "gcs", "gcs-link")
}

/// Resolve the configuration file path using standard locations.
pub fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
        debug!("{} points at a missing file: {}", CONFIG_PATH_ENV, path.display());
    }

    let cwd_config = PathBuf::from(CONFIG_FILE_NAME);
    if cwd_config.exists() {
        return Some(cwd_config);
    }

    get_default_config_path().filter(|p| p.exists())
}

/// Platform config directory for this application.
pub fn get_default_config_dir() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().to_path_buf())
}

/// Default config file path, whether or not it exists.
pub fn get_default_config_path() -> Option<PathBuf> {
    get_default_config_dir().map(|d| d.join(CONFIG_FILE_NAME))
}

fn load_from_file(path: &Path) -> ConfigResult<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;

    toml::from_str(&content).map_err(ConfigError::ParseError)
}

fn save_to_file(config: &Config, path: &Path) -> ConfigResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError {
            path: path.to_path_buf(),
            source: e,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|e| ConfigError::WriteError {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Parse `GCS_LINK_<key>` if it is set.
fn env_value<T: FromStr>(key: &str) -> ConfigResult<Option<T>> {
    let var = format!("{ENV_PREFIX}_{key}");
    match std::env::var(&var) {
        Ok(val) => val
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::env_parse(var, format!("cannot parse {val:?}"))),
        Err(_) => Ok(None),
    }
}

/// Apply environment variable overrides to the configuration.
///
/// Variables follow the pattern `GCS_LINK_<SECTION>_<KEY>`, e.g.
/// `GCS_LINK_LINK_READ_TIMEOUT_MS=100` or `GCS_LINK_LOGGING_LEVEL=debug`.
fn apply_env_overrides(config: &mut Config) -> ConfigResult<()> {
    if let Some(v) = env_value("LINK_READ_TIMEOUT_MS")? {
        config.link.read_timeout_ms = v;
    }
    if let Some(v) = env_value("LINK_WRITE_RETRY_LIMIT")? {
        config.link.write_retry_limit = v;
    }
    if let Some(v) = env_value("LINK_RESET_PULSE_MS")? {
        config.link.reset_pulse_ms = v;
    }
    if let Some(v) = env_value("LINK_READ_CHUNK_SIZE")? {
        config.link.read_chunk_size = v;
    }

    if let Some(v) = env_value("LOGGING_LEVEL")? {
        config.logging.level = v;
    }
    if let Ok(val) = std::env::var(format!("{ENV_PREFIX}_LOGGING_FORMAT")) {
        config.logging.format = val.parse()?;
    }

    if let Some(v) = env_value::<PathBuf>("SETTINGS_PATH")? {
        config.settings.path = Some(v);
    }

    Ok(())
}
