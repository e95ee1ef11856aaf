//! Key-value persistence layer
//!
//! `set` only stages a value; nothing is durable until `save` returns.

use serde_json::{Map, Value};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Durable key-value document
pub trait KeyValueStore: Send {
    fn get(&self, key: &str) -> Option<&Value>;

    fn set(&mut self, key: &str, value: Value);

    fn remove(&mut self, key: &str) -> Option<Value>;

    fn exists(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Flush staged values to durable storage
    fn save(&mut self) -> Result<()>;

    /// All keys currently staged
    fn keys(&self) -> Vec<String>;
}

/// One pretty-printed JSON document per token
pub struct JsonFileStore {
    path: PathBuf,
    entries: Map<String, Value>,
}

impl JsonFileStore {
    /// Open the document at `path`, starting empty if it does not exist yet
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let entries = if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|e| {
                Error::Checkpoint(format!("Failed to read {}: {}", path.display(), e))
            })?;

            match serde_json::from_str::<Value>(&content) {
                Ok(Value::Object(map)) => map,
                Ok(_) => {
                    return Err(Error::Checkpoint(format!(
                        "{} is not a JSON object",
                        path.display()
                    )))
                }
                Err(e) => {
                    return Err(Error::Checkpoint(format!(
                        "Failed to parse {}: {}",
                        path.display(),
                        e
                    )))
                }
            }
        } else {
            info!("No state file at {}, starting fresh", path.display());
            Map::new()
        };

        debug!("Opened {} with {} keys", path.display(), entries.len());
        Ok(Self { path, entries })
    }

    fn write_atomically(&self, data: &[u8]) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let tmp_path = self.path.with_extension("json.tmp");
        {
            let mut file = std::fs::File::create(&tmp_path)?;
            file.write_all(data)?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp_path, &self.path)
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    fn set(&mut self, key: &str, value: Value) {
        self.entries.insert(key.to_string(), value);
    }

    fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.remove(key)
    }

    fn save(&mut self) -> Result<()> {
        let data = serde_json::to_vec_pretty(&self.entries)
            .map_err(|e| Error::Checkpoint(format!("Failed to serialize state: {}", e)))?;

        self.write_atomically(&data).map_err(|e| {
            Error::Checkpoint(format!("Failed to write {}: {}", self.path.display(), e))
        })?;

        debug!("Saved {} keys to {}", self.entries.len(), self.path.display());
        Ok(())
    }

    fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }
}

/// In-memory store that tracks what has been saved
///
/// Used by dry runs and tests.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: Map<String, Value>,
    persisted: Map<String, Value>,
    saves: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing document, treated as already persisted
    pub fn from_entries(entries: Map<String, Value>) -> Self {
        Self {
            persisted: entries.clone(),
            entries,
            saves: 0,
        }
    }

    /// Snapshot of the last saved state
    pub fn persisted(&self) -> &Map<String, Value> {
        &self.persisted
    }

    /// Number of successful saves
    pub fn save_count(&self) -> usize {
        self.saves
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    fn set(&mut self, key: &str, value: Value) {
        self.entries.insert(key.to_string(), value);
    }

    fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.remove(key)
    }

    fn save(&mut self) -> Result<()> {
        self.persisted = self.entries.clone();
        self.saves += 1;
        Ok(())
    }

    fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_open_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::open(dir.path().join("MEME.json")).unwrap();
        assert!(store.keys().is_empty());
    }

    #[test]
    fn test_values_survive_reopen_only_after_save() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state").join("MEME.json");

        let mut store = JsonFileStore::open(&path).unwrap();
        store.set("cycle", json!(3));
        assert!(!path.exists());

        store.save().unwrap();
        let reopened = JsonFileStore::open(&path).unwrap();
        assert_eq!(reopened.get("cycle"), Some(&json!(3)));
        assert!(reopened.exists("cycle"));
        assert!(!reopened.exists("pool_id"));
    }

    #[test]
    fn test_corrupt_file_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("MEME.json");
        std::fs::write(&path, "{ not json").unwrap();

        let result = JsonFileStore::open(&path);
        assert!(matches!(result, Err(Error::Checkpoint(_))));
    }

    #[test]
    fn test_non_object_document_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("MEME.json");
        std::fs::write(&path, "[1, 2, 3]").unwrap();

        assert!(matches!(JsonFileStore::open(&path), Err(Error::Checkpoint(_))));
    }

    #[test]
    fn test_memory_store_tracks_persisted_state() {
        let mut store = MemoryStore::new();
        store.set("cycle", json!(1));
        assert!(store.persisted().is_empty());

        store.save().unwrap();
        assert_eq!(store.persisted().get("cycle"), Some(&json!(1)));
        assert_eq!(store.save_count(), 1);

        store.remove("cycle");
        assert!(!store.exists("cycle"));
        assert!(store.persisted().contains_key("cycle"));
    }
}
