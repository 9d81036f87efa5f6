//! Persistent application configuration.
//!
//! A mutex-guarded map of dotted string keys to JSON values, backed by one
//! `config.json` file. The key store persists everything it owns through
//! this store. Loading is tolerant: a missing or corrupt file yields an
//! empty configuration and a warning, never an error.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde_json::{Map, Value};

use coffer_common::product;

/// Well-known configuration keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    Version,
    KeyStoreValue,
    KeyStoreSeed,
    KeyStoreSeedPhrase,
}

impl ConfigKey {
    pub fn as_str(self) -> &'static str {
        match self {
            ConfigKey::Version => "version",
            ConfigKey::KeyStoreValue => "key_store.value",
            ConfigKey::KeyStoreSeed => "key_store.seed",
            ConfigKey::KeyStoreSeedPhrase => "key_store.seed_phrase",
        }
    }
}

/// File-backed configuration store.
pub struct Config {
    file_path: PathBuf,
    state: Mutex<Map<String, Value>>,
}

impl Config {
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        let mut state = Map::new();
        state.insert(
            ConfigKey::Version.as_str().to_string(),
            Value::String(product::VERSION_STRING.to_string()),
        );
        Self {
            file_path: file_path.into(),
            state: Mutex::new(state),
        }
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    /// Load the backing file. Missing or unparseable content degrades to an
    /// empty configuration.
    pub fn load(&self) -> bool {
        let mut state = self.lock();
        *state = Map::new();

        let loaded = match std::fs::read(&self.file_path) {
            Ok(bytes) => match serde_json::from_slice::<Value>(&bytes) {
                Ok(Value::Object(map)) => {
                    *state = map;
                    true
                }
                Ok(_) | Err(_) => {
                    tracing::warn!(
                        "Failed to parse configuration file '{}'.",
                        self.file_path.display()
                    );
                    false
                }
            },
            Err(e) => {
                tracing::warn!(
                    "Failed to read configuration file '{}'. {}",
                    self.file_path.display(),
                    e
                );
                false
            }
        };

        state.insert(
            ConfigKey::Version.as_str().to_string(),
            Value::String(product::VERSION_STRING.to_string()),
        );
        loaded
    }

    /// Write the configuration to the backing file, creating parent
    /// directories as needed.
    pub fn save(&self) -> bool {
        let state = self.lock();
        Self::save_state(&self.file_path, &state)
    }

    pub fn get_string(&self, key: ConfigKey) -> Option<String> {
        self.lock()
            .get(key.as_str())
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    /// Set (or with `None` remove) a single key and save.
    pub fn set_string(&self, key: ConfigKey, value: Option<&str>) -> bool {
        self.set_many(&[(key, value)])
    }

    /// Apply several mutations under one lock and one save, so readers
    /// observe either the old state or the fully updated one.
    pub fn set_many(&self, entries: &[(ConfigKey, Option<&str>)]) -> bool {
        let mut state = self.lock();
        for (key, value) in entries {
            match value {
                Some(value) => {
                    state.insert(key.as_str().to_string(), Value::String((*value).to_string()));
                }
                None => {
                    state.remove(key.as_str());
                }
            }
        }
        Self::save_state(&self.file_path, &state)
    }

    fn save_state(file_path: &Path, state: &Map<String, Value>) -> bool {
        if let Some(parent) = file_path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::error!(
                    "Failed to create configuration directory '{}'. {}",
                    parent.display(),
                    e
                );
                return false;
            }
        }

        let json = match serde_json::to_string_pretty(&Value::Object(state.clone())) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!("Failed to serialize configuration. {}", e);
                return false;
            }
        };

        match std::fs::write(file_path, json) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(
                    "Failed to write configuration file '{}'. {}",
                    file_path.display(),
                    e
                );
                false
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Map<String, Value>> {
        self.state.lock().expect("configuration lock poisoned")
    }
}
