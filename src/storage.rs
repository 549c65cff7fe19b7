//! Durable key/value storage for client-state snapshots.
//!
//! Stores hold their persisted snapshot as a single JSON document under a
//! string key, the way a browser keeps state in local storage. Storage
//! failures (unwritable directory, full disk, corrupt file) never reach
//! the caller: reads degrade to "nothing stored" and writes to no-ops,
//! with a warning in the log.
//!
//! Snapshots are wrapped in a [`Versioned`] envelope. When a snapshot
//! written by an older release is read back, [`MigrationRegistry`]
//! upgrades it one version at a time before it is deserialized.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

/// Synchronous key/value storage.
pub trait KeyValueStorage: Send + Sync + fmt::Debug {
    /// Read the raw value stored under `key`.
    fn get_item(&self, key: &str) -> Option<String>;
    /// Store `value` under `key`.
    fn set_item(&self, key: &str, value: &str);
    /// Remove whatever is stored under `key`.
    fn remove_item(&self, key: &str);
}

/// Storage backed by one JSON file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Create a storage rooted at `dir`. The directory is created lazily
    /// on the first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '.' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{file}.json"))
    }
}

impl KeyValueStorage for FileStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(raw) => Some(raw),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                tracing::warn!(name: "storage.read_failed", key, error = %e, "Error reading from storage");
                None
            }
        }
    }

    fn set_item(&self, key: &str, value: &str) {
        if let Err(e) = fs::create_dir_all(&self.dir) {
            tracing::warn!(name: "storage.write_failed", key, error = %e, "Error creating storage directory");
            return;
        }
        let path = self.path_for(key);
        // Write then rename so a crash never leaves a half-written snapshot.
        let tmp = path.with_extension("json.tmp");
        let result = fs::write(&tmp, value).and_then(|()| fs::rename(&tmp, &path));
        if let Err(e) = result {
            tracing::warn!(name: "storage.write_failed", key, error = %e, "Error writing to storage");
        }
    }

    fn remove_item(&self, key: &str) {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(name: "storage.remove_failed", key, error = %e, "Error removing from storage");
            }
        }
    }
}

/// In-process storage, used in tests and when no data directory is set.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set_item(&self, key: &str, value: &str) {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
    }

    fn remove_item(&self, key: &str) {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}

/// Envelope written around every persisted snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Versioned<T> {
    pub state: T,
    pub version: u32,
}

/// Upgrade step from one schema version to the next.
pub type Migration = fn(Value) -> Value;

/// Schema upgrade functions keyed by the version they upgrade *from*.
#[derive(Debug, Clone)]
pub struct MigrationRegistry {
    current: u32,
    steps: HashMap<u32, Migration>,
}

impl MigrationRegistry {
    /// Registry for snapshots whose current schema version is `current`.
    #[must_use]
    pub fn new(current: u32) -> Self {
        Self {
            current,
            steps: HashMap::new(),
        }
    }

    /// Register the upgrade from `from` to `from + 1`.
    #[must_use]
    pub fn with_step(mut self, from: u32, step: Migration) -> Self {
        self.steps.insert(from, step);
        self
    }

    /// Version written by this build.
    #[must_use]
    pub fn current(&self) -> u32 {
        self.current
    }

    /// Bring `state` from `version` up to the current version.
    ///
    /// Returns `None` when the snapshot comes from a newer build or a
    /// step is missing, in which case the snapshot must be discarded.
    #[must_use]
    pub fn upgrade(&self, mut state: Value, mut version: u32) -> Option<Value> {
        if version > self.current {
            return None;
        }
        while version < self.current {
            let step = self.steps.get(&version)?;
            state = step(state);
            version += 1;
        }
        Some(state)
    }
}

/// Read and upgrade the snapshot stored under `key`.
///
/// Anything unreadable is treated as "no snapshot".
pub fn load_snapshot<T: DeserializeOwned>(
    storage: &dyn KeyValueStorage,
    key: &str,
    migrations: &MigrationRegistry,
) -> Option<T> {
    let raw = storage.get_item(key)?;
    let envelope: Versioned<Value> = match serde_json::from_str(&raw) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::warn!(name: "storage.snapshot_corrupt", key, error = %e, "Discarding unreadable snapshot");
            return None;
        }
    };
    let Some(state) = migrations.upgrade(envelope.state, envelope.version) else {
        tracing::warn!(
            name: "storage.snapshot_version",
            key,
            version = envelope.version,
            current = migrations.current(),
            "Discarding snapshot with unsupported version"
        );
        return None;
    };
    match serde_json::from_value(state) {
        Ok(state) => Some(state),
        Err(e) => {
            tracing::warn!(name: "storage.snapshot_corrupt", key, error = %e, "Discarding snapshot with invalid shape");
            None
        }
    }
}

/// Serialize `state` at `version` and store it under `key`.
pub fn save_snapshot<T: Serialize>(
    storage: &dyn KeyValueStorage,
    key: &str,
    version: u32,
    state: &T,
) {
    match serde_json::to_string(&Versioned { state, version }) {
        Ok(raw) => storage.set_item(key, &raw),
        Err(e) => {
            tracing::warn!(name: "storage.serialize_failed", key, error = %e, "Could not serialize snapshot");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_file_storage_roundtrip_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path().join("nested"));

        assert!(storage.get_item("auth-storage.user/1").is_none());
        storage.set_item("auth-storage.user/1", "{\"a\":1}");
        assert_eq!(
            storage.get_item("auth-storage.user/1").as_deref(),
            Some("{\"a\":1}")
        );

        storage.remove_item("auth-storage.user/1");
        assert!(storage.get_item("auth-storage.user/1").is_none());
        // Removing twice is fine.
        storage.remove_item("auth-storage.user/1");
    }

    #[test]
    fn test_file_storage_write_failure_is_silent() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "not a directory").unwrap();

        let storage = FileStorage::new(blocker.join("data"));
        storage.set_item("key", "value");
        assert!(storage.get_item("key").is_none());
    }

    #[test]
    fn test_migration_registry_steps_in_order() {
        let registry = MigrationRegistry::new(2)
            .with_step(0, |mut v| {
                v["added_in_1"] = json!(true);
                v
            })
            .with_step(1, |mut v| {
                v["added_in_2"] = json!(v["added_in_1"].clone());
                v
            });

        let upgraded = registry.upgrade(json!({}), 0).unwrap();
        assert_eq!(upgraded, json!({"added_in_1": true, "added_in_2": true}));

        assert!(registry.upgrade(json!({}), 3).is_none());
        assert!(MigrationRegistry::new(1).upgrade(json!({}), 0).is_none());
    }

    #[test]
    fn test_load_snapshot_discards_garbage() {
        let storage = MemoryStorage::new();
        storage.set_item("k", "not json");
        let loaded: Option<Value> = load_snapshot(&storage, "k", &MigrationRegistry::new(1));
        assert!(loaded.is_none());

        save_snapshot(&storage, "k", 1, &json!({"x": 5}));
        let loaded: Option<Value> = load_snapshot(&storage, "k", &MigrationRegistry::new(1));
        assert_eq!(loaded, Some(json!({"x": 5})));
    }
}
