//! Keyed value store
//!
//! Small persistence layer for state that should survive restarts, such as
//! the last value a `watch` session saw. Each consumer picks its own key so
//! independent views never share a global slot.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Entry map persisted by [`JsonFileStore`]
pub type Entries = BTreeMap<String, Value>;

/// String-keyed JSON storage
pub trait KeyedStore: Send + Sync {
    /// Look up a value
    fn get(&self, key: &str) -> Option<Value>;

    /// Insert or replace a value
    fn set(&self, key: &str, value: Value) -> Result<()>;

    /// Remove a value, returning it if present
    fn remove(&self, key: &str) -> Result<Option<Value>>;

    /// All keys, sorted
    fn keys(&self) -> Vec<String>;
}

/// Render entries as pretty JSON
pub fn serialize_entries(entries: &Entries) -> Result<String> {
    Ok(serde_json::to_string_pretty(entries)?)
}

/// Parse entries previously written by [`serialize_entries`]
///
/// The document must be a JSON object. Blank input is an empty store.
pub fn deserialize_entries(raw: &str) -> Result<Entries> {
    if raw.trim().is_empty() {
        return Ok(Entries::new());
    }
    Ok(serde_json::from_str(raw)?)
}

// ─────────────────────────────────────────────────────────────────
// In-memory
// ─────────────────────────────────────────────────────────────────

/// Volatile store
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<Entries>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyedStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.entries.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        self.entries.write().insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.entries.write().remove(key))
    }

    fn keys(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }
}

// ─────────────────────────────────────────────────────────────────
// JSON file
// ─────────────────────────────────────────────────────────────────

/// Store backed by a single JSON file, rewritten on every change
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: RwLock<Entries>,
}

impl JsonFileStore {
    /// Open the store at `path`
    ///
    /// A missing file is an empty store. A file that is not a JSON object
    /// fails with [`Error::StoreCorrupted`].
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = if path.exists() {
            let raw = std::fs::read_to_string(&path).map_err(|e| Error::IoRead {
                path: path.clone(),
                source: e,
            })?;
            deserialize_entries(&raw).map_err(|e| Error::StoreCorrupted {
                path: path.clone(),
                message: e.to_string(),
            })?
        } else {
            Entries::new()
        };

        debug!(path = %path.display(), entries = entries.len(), "Opened store");
        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    /// Open the store, starting empty if the file is corrupt
    ///
    /// The corrupt file is left in place and overwritten on the next change.
    pub fn open_or_empty(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        match Self::open(&path) {
            Err(Error::StoreCorrupted { message, .. }) => {
                warn!(path = %path.display(), error = %message, "Store file is corrupt, starting empty");
                Ok(Self {
                    path,
                    entries: RwLock::new(Entries::new()),
                })
            }
            other => other,
        }
    }

    /// Backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &Entries) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| Error::IoWrite {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
            }
        }

        let content = serialize_entries(entries)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, content).map_err(|e| Error::IoWrite {
            path: tmp.clone(),
            source: e,
        })?;
        std::fs::rename(&tmp, &self.path).map_err(|e| Error::IoWrite {
            path: self.path.clone(),
            source: e,
        })?;
        Ok(())
    }
}

impl KeyedStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.entries.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut entries = self.entries.write();
        entries.insert(key.to_string(), value);
        self.persist(&entries)
    }

    fn remove(&self, key: &str) -> Result<Option<Value>> {
        let mut entries = self.entries.write();
        let removed = entries.remove(key);
        if removed.is_some() {
            self.persist(&entries)?;
        }
        Ok(removed)
    }

    fn keys(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_deserialize_rejects_non_object() {
        assert!(deserialize_entries("[1, 2]").is_err());
        assert!(deserialize_entries("{not json").is_err());
        assert!(deserialize_entries("  ").unwrap().is_empty());
    }

    #[test]
    fn test_entries_keep_nested_values() {
        let mut entries = Entries::new();
        entries.insert("layout".into(), json!({"widgets": [{"id": "a", "w": 4}]}));
        entries.insert("last".into(), json!(null));

        let raw = serialize_entries(&entries).unwrap();
        assert_eq!(deserialize_entries(&raw).unwrap(), entries);
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::new();
        assert!(store.get("a").is_none());

        store.set("b", json!(2)).unwrap();
        store.set("a", json!(1)).unwrap();
        assert_eq!(store.keys(), vec!["a", "b"]);
        assert_eq!(store.remove("a").unwrap(), Some(json!(1)));
        assert_eq!(store.remove("a").unwrap(), None);
        assert_eq!(store.keys(), vec!["b"]);
    }

    #[test]
    fn test_file_store_persists_across_opens() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("store.json");

        let store = JsonFileStore::open(&path).unwrap();
        assert!(store.keys().is_empty());
        store.set("dashboard", json!({"count": 3})).unwrap();
        assert!(path.exists());

        let reopened = JsonFileStore::open(&path).unwrap();
        assert_eq!(reopened.get("dashboard"), Some(json!({"count": 3})));

        reopened.remove("dashboard").unwrap();
        let emptied = JsonFileStore::open(&path).unwrap();
        assert!(emptied.get("dashboard").is_none());
    }

    #[test]
    fn test_file_store_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, "{ broken").unwrap();

        let err = JsonFileStore::open(&path).unwrap_err();
        assert!(matches!(err, Error::StoreCorrupted { .. }));

        let store = JsonFileStore::open_or_empty(&path).unwrap();
        assert!(store.keys().is_empty());
        store.set("k", json!("v")).unwrap();
        assert_eq!(JsonFileStore::open(&path).unwrap().get("k"), Some(json!("v")));
    }
}
