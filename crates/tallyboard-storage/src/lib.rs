//! Tallyboard persistence
//!
//! A small key/value store the dashboard uses to remember which sources were
//! chosen (the slot layout) and to echo back the filter declarations it ran
//! with. Values are opaque JSON; typed access goes through [`load_json`] and
//! [`save_json`].
//!
//! ```text
//! ┌───────────────┐  put(key, json)   ┌──────────────┐  write + rename   ┌──────────────────┐
//! │   Dashboard   │──────────────────►│ JsonFileStore│──────────────────►│ state.json       │
//! │               │◄──────────────────│  (cached)    │◄──────────────────│ {version,records}│
//! └───────────────┘  get(key)         └──────────────┘  read at open     └──────────────────┘
//! ```

pub mod record;

#[cfg(test)]
mod tests;

use anyhow::Context;
use chrono::Utc;
use parking_lot::RwLock;
use record::{StateFile, StoredRecord, FORMAT_VERSION};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Opaque key/value persistence.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> anyhow::Result<Option<serde_json::Value>>;

    fn put(&self, key: &str, value: serde_json::Value) -> anyhow::Result<()>;

    /// Returns whether the key existed.
    fn remove(&self, key: &str) -> anyhow::Result<bool>;
}

/// Read a typed value. A value that no longer matches `T` is reported as an
/// error rather than silently dropped.
pub fn load_json<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> anyhow::Result<Option<T>> {
    match store.get(key)? {
        Some(value) => {
            let typed = serde_json::from_value(value)
                .with_context(|| format!("stored value for '{key}' has an unexpected shape"))?;
            Ok(Some(typed))
        }
        None => Ok(None),
    }
}

pub fn save_json<T: Serialize + ?Sized>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> anyhow::Result<()> {
    store.put(key, serde_json::to_value(value)?)
}

// ============================================================================
// Storage Configuration
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to the JSON state file
    pub path: PathBuf,
    /// Pretty-print the file (handy when users edit it by hand)
    pub pretty: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./tallyboard-state.json"),
            pretty: true,
        }
    }
}

// ============================================================================
// File-backed store
// ============================================================================

/// Keeps the whole state file in memory and rewrites it on every change.
pub struct JsonFileStore {
    config: StorageConfig,
    state: RwLock<StateFile>,
}

impl JsonFileStore {
    pub fn new(config: StorageConfig) -> anyhow::Result<Self> {
        let state = if config.path.exists() {
            let contents = std::fs::read_to_string(&config.path)
                .with_context(|| format!("reading {}", config.path.display()))?;
            let state: StateFile = serde_json::from_str(&contents)
                .with_context(|| format!("parsing {}", config.path.display()))?;
            if state.version != FORMAT_VERSION {
                anyhow::bail!(
                    "{} has format version {}, expected {}",
                    config.path.display(),
                    state.version,
                    FORMAT_VERSION
                );
            }
            state
        } else {
            StateFile::default()
        };

        tracing::debug!(
            path = %config.path.display(),
            records = state.records.len(),
            "opened state file"
        );

        Ok(Self {
            config,
            state: RwLock::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    /// When each key was last written.
    pub fn saved_at(&self) -> BTreeMap<String, chrono::DateTime<Utc>> {
        self.state
            .read()
            .records
            .iter()
            .map(|(k, r)| (k.clone(), r.saved_at))
            .collect()
    }

    fn persist(&self, state: &StateFile) -> anyhow::Result<()> {
        let json = if self.config.pretty {
            serde_json::to_string_pretty(state)?
        } else {
            serde_json::to_string(state)?
        };

        if let Some(parent) = self.config.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        // Write beside the target, then rename over it.
        let tmp = self.config.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).with_context(|| format!("writing {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.config.path)
            .with_context(|| format!("replacing {}", self.config.path.display()))?;
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
        Ok(self.state.read().records.get(key).map(|r| r.value.clone()))
    }

    fn put(&self, key: &str, value: serde_json::Value) -> anyhow::Result<()> {
        let mut state = self.state.write();
        state.records.insert(
            key.to_string(),
            StoredRecord {
                saved_at: Utc::now(),
                value,
            },
        );
        self.persist(&state)
    }

    fn remove(&self, key: &str) -> anyhow::Result<bool> {
        let mut state = self.state.write();
        let existed = state.records.remove(key).is_some();
        if existed {
            self.persist(&state)?;
        }
        Ok(existed)
    }
}

// ============================================================================
// In-memory store
// ============================================================================

/// Non-persistent store for tests and throwaway sessions.
#[derive(Default)]
pub struct MemoryStore {
    values: RwLock<BTreeMap<String, serde_json::Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(&self) -> Vec<String> {
        self.values.read().keys().cloned().collect()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
        Ok(self.values.read().get(key).cloned())
    }

    fn put(&self, key: &str, value: serde_json::Value) -> anyhow::Result<()> {
        self.values.write().insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> anyhow::Result<bool> {
        Ok(self.values.write().remove(key).is_some())
    }
}

// ============================================================================
// Convenience Functions
// ============================================================================

/// Open (or create on first write) a state file at `path`.
pub fn open_store(path: impl Into<PathBuf>) -> anyhow::Result<JsonFileStore> {
    JsonFileStore::new(StorageConfig {
        path: path.into(),
        ..Default::default()
    })
}
