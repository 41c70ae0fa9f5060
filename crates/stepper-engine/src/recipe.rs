use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use stepper_common::ObserverEvent;
use stepper_common::event::now_millis;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("Storage document is invalid: {0}")]
    Format(#[from] serde_json::Error),
}

/// Persistent key-value storage for JSON values.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;
    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;
}

#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.entries.lock().await.insert(key.to_string(), value);
        Ok(())
    }
}

/// A single JSON object document on disk.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    async fn read_document(&self) -> Result<Map<String, Value>, StoreError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) if content.trim().is_empty() => Ok(Map::new()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Map::new()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let _held = self.lock.lock().await;
        Ok(self.read_document().await?.remove(key))
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let _held = self.lock.lock().await;
        let mut document = self.read_document().await?;
        document.insert(key.to_string(), value);
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(&document)?;
        tokio::fs::write(&self.path, content).await?;
        debug!(key, path = %self.path.display(), "Stored value");
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedRecipe {
    pub name: String,
    /// Milliseconds since the Unix epoch.
    pub saved_at: u64,
    pub events: Vec<ObserverEvent>,
}

/// Named recipes of recorded events on top of a key-value store.
#[derive(Clone)]
pub struct RecipeStore {
    store: Arc<dyn KeyValueStore>,
}

impl RecipeStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// `recipe:` followed by the lowercased name with each run of
    /// non-alphanumeric characters collapsed to `_`.
    pub fn key_for(name: &str) -> String {
        let mut slug = String::with_capacity(name.len());
        let mut gap = false;
        for c in name.trim().chars() {
            if c.is_alphanumeric() {
                if gap && !slug.is_empty() {
                    slug.push('_');
                }
                gap = false;
                slug.extend(c.to_lowercase());
            } else {
                gap = true;
            }
        }
        format!("recipe:{}", slug)
    }

    pub async fn save(
        &self,
        name: &str,
        events: Vec<ObserverEvent>,
    ) -> Result<RecordedRecipe, StoreError> {
        let recipe = RecordedRecipe {
            name: name.to_string(),
            saved_at: now_millis(),
            events,
        };
        self.store
            .set(&Self::key_for(name), serde_json::to_value(&recipe)?)
            .await?;
        Ok(recipe)
    }

    pub async fn load(&self, name: &str) -> Result<Option<RecordedRecipe>, StoreError> {
        match self.store.get(&Self::key_for(name)).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }
}
