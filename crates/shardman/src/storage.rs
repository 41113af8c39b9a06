//! Operation store
//!
//! Key/value-with-lists store used for crash visibility of in-flight
//! operations (a map keyed by operation key) and for the bounded history of
//! completed operations (a most-recent-first list).

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info};

/// Storage error
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Operation store
#[async_trait]
pub trait OpStore: Send + Sync {
    /// Set `field` of map `map` to `value`
    async fn put_field(&self, map: &str, field: &str, value: String) -> Result<(), StorageError>;

    /// Remove `field` from map `map`
    async fn delete_field(&self, map: &str, field: &str) -> Result<(), StorageError>;

    /// All fields of map `map`
    async fn fields(&self, map: &str) -> Result<HashMap<String, String>, StorageError>;

    /// Prepend `value` to list `list`
    async fn push_front(&self, list: &str, value: String) -> Result<(), StorageError>;

    /// Keep only the first `len` entries of list `list`
    async fn trim(&self, list: &str, len: usize) -> Result<(), StorageError>;

    /// First `limit` entries of list `list`
    async fn list(&self, list: &str, limit: usize) -> Result<Vec<String>, StorageError>;
}

/// Store contents, shared by the in-memory and file-backed stores
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct OpDocument {
    #[serde(default)]
    maps: HashMap<String, HashMap<String, String>>,
    #[serde(default)]
    lists: HashMap<String, VecDeque<String>>,
}

impl OpDocument {
    fn put_field(&mut self, map: &str, field: &str, value: String) {
        self.maps
            .entry(map.to_string())
            .or_default()
            .insert(field.to_string(), value);
    }

    fn delete_field(&mut self, map: &str, field: &str) {
        if let Some(fields) = self.maps.get_mut(map) {
            fields.remove(field);
            if fields.is_empty() {
                self.maps.remove(map);
            }
        }
    }

    fn fields(&self, map: &str) -> HashMap<String, String> {
        self.maps.get(map).cloned().unwrap_or_default()
    }

    fn push_front(&mut self, list: &str, value: String) {
        self.lists.entry(list.to_string()).or_default().push_front(value);
    }

    fn trim(&mut self, list: &str, len: usize) {
        if let Some(entries) = self.lists.get_mut(list) {
            entries.truncate(len);
        }
    }

    fn list(&self, list: &str, limit: usize) -> Vec<String> {
        self.lists
            .get(list)
            .map(|entries| entries.iter().take(limit).cloned().collect())
            .unwrap_or_default()
    }
}

/// In-process store
#[derive(Debug, Default)]
pub struct MemoryOpStore {
    doc: parking_lot::Mutex<OpDocument>,
}

impl MemoryOpStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OpStore for MemoryOpStore {
    async fn put_field(&self, map: &str, field: &str, value: String) -> Result<(), StorageError> {
        self.doc.lock().put_field(map, field, value);
        Ok(())
    }

    async fn delete_field(&self, map: &str, field: &str) -> Result<(), StorageError> {
        self.doc.lock().delete_field(map, field);
        Ok(())
    }

    async fn fields(&self, map: &str) -> Result<HashMap<String, String>, StorageError> {
        Ok(self.doc.lock().fields(map))
    }

    async fn push_front(&self, list: &str, value: String) -> Result<(), StorageError> {
        self.doc.lock().push_front(list, value);
        Ok(())
    }

    async fn trim(&self, list: &str, len: usize) -> Result<(), StorageError> {
        self.doc.lock().trim(list, len);
        Ok(())
    }

    async fn list(&self, list: &str, limit: usize) -> Result<Vec<String>, StorageError> {
        Ok(self.doc.lock().list(list, limit))
    }
}

/// File-backed store.
///
/// The whole document is rewritten on every mutation, temp file first and
/// then renamed over the previous copy.
pub struct FileOpStore {
    /// Data directory
    data_dir: PathBuf,
    /// Store file path
    path: PathBuf,
    doc: AsyncMutex<OpDocument>,
}

impl FileOpStore {
    /// Open the store in `data_dir`, loading any existing contents
    pub async fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self, StorageError> {
        let data_dir = data_dir.as_ref().to_path_buf();
        let path = data_dir.join("operations.json");

        let doc = if fs::try_exists(&path).await? {
            let content = fs::read_to_string(&path).await?;
            let doc: OpDocument = serde_json::from_str(&content)
                .map_err(|e| StorageError::Serialization(e.to_string()))?;
            info!(
                "Loaded operation store {:?}: {} maps, {} lists",
                path,
                doc.maps.len(),
                doc.lists.len()
            );
            doc
        } else {
            info!("Operation store {:?} not found, starting empty", path);
            OpDocument::default()
        };

        Ok(Self {
            data_dir,
            path,
            doc: AsyncMutex::new(doc),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, doc: &OpDocument) -> Result<(), StorageError> {
        if !fs::try_exists(&self.data_dir).await? {
            fs::create_dir_all(&self.data_dir).await?;
            info!("Created data directory: {:?}", self.data_dir);
        }

        let temp_path = self.path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(doc)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        fs::write(&temp_path, &content).await?;
        fs::rename(&temp_path, &self.path).await?;
        debug!("Persisted operation store {:?}", self.path);
        Ok(())
    }

    async fn mutate<F>(&self, f: F) -> Result<(), StorageError>
    where
        F: FnOnce(&mut OpDocument) + Send,
    {
        let mut doc = self.doc.lock().await;
        let mut next = doc.clone();
        f(&mut next);
        self.persist(&next).await?;
        *doc = next;
        Ok(())
    }
}

#[async_trait]
impl OpStore for FileOpStore {
    async fn put_field(&self, map: &str, field: &str, value: String) -> Result<(), StorageError> {
        self.mutate(|doc| doc.put_field(map, field, value)).await
    }

    async fn delete_field(&self, map: &str, field: &str) -> Result<(), StorageError> {
        self.mutate(|doc| doc.delete_field(map, field)).await
    }

    async fn fields(&self, map: &str) -> Result<HashMap<String, String>, StorageError> {
        Ok(self.doc.lock().await.fields(map))
    }

    async fn push_front(&self, list: &str, value: String) -> Result<(), StorageError> {
        self.mutate(|doc| doc.push_front(list, value)).await
    }

    async fn trim(&self, list: &str, len: usize) -> Result<(), StorageError> {
        self.mutate(|doc| doc.trim(list, len)).await
    }

    async fn list(&self, list: &str, limit: usize) -> Result<Vec<String>, StorageError> {
        Ok(self.doc.lock().await.list(list, limit))
    }
}
