//! Namespaced key/value settings store.
//!
//! Keys are `/`-separated paths (`LinkConfigurations/Link0/baud`). Values are
//! primitives only, so the store serialises to a flat TOML table.

use crate::error::{LinkError, LinkResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// A primitive stored value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Int(i64),
    Bool(bool),
    Str(String),
}

/// In-memory settings store with optional TOML persistence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SettingsStore {
    values: BTreeMap<String, SettingValue>,
}

/// Join a namespace root and a key.
pub fn settings_key(root: &str, key: &str) -> String {
    let root = root.trim_end_matches('/');
    if root.is_empty() {
        key.to_string()
    } else {
        format!("{root}/{key}")
    }
}

impl SettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a store from a TOML file. A missing file yields an empty store.
    pub fn load_from(path: impl AsRef<Path>) -> LinkResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("No settings file at {}, starting empty", path.display());
            return Ok(Self::new());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| LinkError::Settings(format!("read {}: {e}", path.display())))?;
        toml::from_str(&content)
            .map_err(|e| LinkError::Settings(format!("parse {}: {e}", path.display())))
    }

    /// Write the store to a TOML file, creating parent directories.
    pub fn save_to(&self, path: impl AsRef<Path>) -> LinkResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| LinkError::Settings(format!("create {}: {e}", parent.display())))?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| LinkError::Settings(format!("serialize: {e}")))?;
        std::fs::write(path, content)
            .map_err(|e| LinkError::Settings(format!("write {}: {e}", path.display())))
    }

    pub fn set_int(&mut self, key: impl Into<String>, value: i64) {
        self.values.insert(key.into(), SettingValue::Int(value));
    }

    pub fn set_str(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), SettingValue::Str(value.into()));
    }

    pub fn set_bool(&mut self, key: impl Into<String>, value: bool) {
        self.values.insert(key.into(), SettingValue::Bool(value));
    }

    /// Integer at `key`. Numeric strings are accepted as well.
    pub fn get_int(&self, key: &str) -> LinkResult<Option<i64>> {
        match self.values.get(key) {
            None => Ok(None),
            Some(SettingValue::Int(v)) => Ok(Some(*v)),
            Some(SettingValue::Str(s)) => s
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| LinkError::Settings(format!("'{key}' is not an integer: {s:?}"))),
            Some(SettingValue::Bool(_)) => {
                Err(LinkError::Settings(format!("'{key}' is not an integer")))
            }
        }
    }

    /// String at `key`. Integers are rendered in decimal.
    pub fn get_str(&self, key: &str) -> Option<String> {
        match self.values.get(key)? {
            SettingValue::Str(s) => Some(s.clone()),
            SettingValue::Int(v) => Some(v.to_string()),
            SettingValue::Bool(b) => Some(b.to_string()),
        }
    }

    /// Remove every key under `root`.
    pub fn remove_group(&mut self, root: &str) {
        let prefix = settings_key(root, "");
        self.values.retain(|k, _| !k.starts_with(&prefix));
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
