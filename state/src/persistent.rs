//! Persistent storage backend using sled database

use async_trait::async_trait;
use rehydrate_core::{EntryVisitor, KvStorage, RehydrateError, RehydrateResult, StorageBackend};
use serde_json::Value;
use sled::{Db, Tree};
use std::path::Path;
use tracing::debug;

/// Durable backend; every namespace is a sled tree
#[derive(Clone)]
pub struct SledBackend {
    db: Db,
}

impl SledBackend {
    pub fn open<P: AsRef<Path>>(path: P) -> RehydrateResult<Self> {
        let db = sled::open(path).map_err(|e| RehydrateError::StorageError(e.to_string()))?;
        Ok(Self { db })
    }
    
    /// Database removed from disk when dropped
    pub fn temporary() -> RehydrateResult<Self> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|e| RehydrateError::StorageError(e.to_string()))?;
        Ok(Self { db })
    }
}

impl StorageBackend for SledBackend {
    type Storage = SledStorage;
    
    fn namespace(&self, name: &str) -> RehydrateResult<SledStorage> {
        let tree = self
            .db
            .open_tree(name)
            .map_err(|e| RehydrateError::NamespaceUnavailable(format!("{}: {}", name, e)))?;
        debug!("Opened sled namespace '{}' ({} entries)", name, tree.len());
        Ok(SledStorage {
            name: name.to_string(),
            tree,
        })
    }
}

/// One namespace of a [`SledBackend`], values stored as JSON bytes
#[derive(Clone)]
pub struct SledStorage {
    name: String,
    tree: Tree,
}

impl SledStorage {
    async fn flush(&self) -> RehydrateResult<()> {
        self.tree
            .flush_async()
            .await
            .map(|_| ())
            .map_err(|e| RehydrateError::StorageError(e.to_string()))
    }
}

fn decode(key: &str, bytes: &[u8]) -> RehydrateResult<Value> {
    serde_json::from_slice(bytes)
        .map_err(|e| RehydrateError::DeserializationError(format!("{}: {}", key, e)))
}

#[async_trait]
impl KvStorage for SledStorage {
    fn namespace(&self) -> &str {
        &self.name
    }
    
    async fn iterate(&self, visitor: &mut EntryVisitor<'_>) -> RehydrateResult<()> {
        for result in self.tree.iter() {
            let (key, bytes) = result.map_err(|e| RehydrateError::StorageError(e.to_string()))?;
            let key = String::from_utf8(key.to_vec())
                .map_err(|e| RehydrateError::DeserializationError(e.to_string()))?;
            let value = decode(&key, &bytes)?;
            visitor(key, value);
        }
        Ok(())
    }
    
    async fn get_item(&self, key: &str) -> RehydrateResult<Option<Value>> {
        match self
            .tree
            .get(key.as_bytes())
            .map_err(|e| RehydrateError::StorageError(e.to_string()))?
        {
            Some(bytes) => Ok(Some(decode(key, &bytes)?)),
            None => Ok(None),
        }
    }
    
    async fn set_item(&self, key: &str, value: Value) -> RehydrateResult<Value> {
        let bytes = serde_json::to_vec(&value)?;
        self.tree
            .insert(key.as_bytes(), bytes)
            .map_err(|e| RehydrateError::StorageError(e.to_string()))?;
        self.flush().await?;
        Ok(value)
    }
    
    async fn remove_item(&self, key: &str) -> RehydrateResult<()> {
        self.tree
            .remove(key.as_bytes())
            .map_err(|e| RehydrateError::StorageError(e.to_string()))?;
        self.flush().await
    }
    
    async fn clear(&self) -> RehydrateResult<()> {
        self.tree
            .clear()
            .map_err(|e| RehydrateError::StorageError(e.to_string()))?;
        self.flush().await
    }
    
    async fn len(&self) -> RehydrateResult<usize> {
        Ok(self.tree.len())
    }
}
