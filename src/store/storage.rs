use log::debug;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O failed on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("stored value is not valid JSON: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Persistent key-value records, one JSON value per key.
pub trait KeyValueStore: Send + Sync + 'static {
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<Value>, StorageError>> + Send;

    fn set(&self, key: &str, value: Value) -> impl Future<Output = Result<(), StorageError>> + Send;
}

/// In-process storage. Clones share the same records.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    records: Arc<Mutex<HashMap<String, Value>>>,
    reject_writes: Arc<AtomicBool>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following write fail until switched back.
    pub fn reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> HashMap<String, Value> {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Value>> {
        self.records
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl KeyValueStore for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        if self.reject_writes.load(Ordering::Relaxed) {
            return Err(StorageError::Unavailable(format!("write to '{key}' rejected")));
        }
        self.lock().insert(key.to_string(), value);
        Ok(())
    }
}

/// All records in a single JSON object on disk.
#[derive(Debug, Clone)]
pub struct JsonFileStorage {
    path: PathBuf,
}

impl JsonFileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<Map<String, Value>, StorageError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) if contents.trim().is_empty() => Ok(Map::new()),
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Map::new()),
            Err(source) => Err(StorageError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

impl KeyValueStore for JsonFileStorage {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.read_all().await?.remove(key))
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        let mut records = self.read_all().await?;
        records.insert(key.to_string(), value);

        let io_err = |source| StorageError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }

        let json = serde_json::to_string_pretty(&Value::Object(records))?;
        tokio::fs::write(&self.path, json).await.map_err(io_err)?;

        debug!("Stored '{key}' in {:?}", self.path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn memory_storage_shares_records_between_clones() {
        let storage = MemoryStorage::new();
        let other = storage.clone();

        storage.set("a", json!({"x": 1})).await.unwrap();

        assert_eq!(other.get("a").await.unwrap(), Some(json!({"x": 1})));
        assert_eq!(other.get("b").await.unwrap(), None);
    }

    #[tokio::test]
    async fn memory_storage_can_reject_writes() {
        let storage = MemoryStorage::new();
        storage.reject_writes(true);

        assert!(storage.set("a", json!(1)).await.is_err());
        assert!(storage.snapshot().is_empty());
    }

    #[tokio::test]
    async fn file_storage_keeps_other_keys() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonFileStorage::new(dir.path().join("sub").join("store.json"));

        assert_eq!(storage.get("audioSettings").await.unwrap(), None);

        storage.set("audioSettings", json!({"a": 1})).await.unwrap();
        storage.set("extensionGlobalState", json!({"enabled": false})).await.unwrap();

        let reopened = JsonFileStorage::new(storage.path());
        assert_eq!(reopened.get("audioSettings").await.unwrap(), Some(json!({"a": 1})));
        assert_eq!(
            reopened.get("extensionGlobalState").await.unwrap(),
            Some(json!({"enabled": false}))
        );
    }

    #[tokio::test]
    async fn corrupt_file_is_a_serde_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, "{ nope").unwrap();

        let storage = JsonFileStorage::new(&path);
        assert!(matches!(
            storage.get("audioSettings").await,
            Err(StorageError::Serde(_))
        ));
    }
}
