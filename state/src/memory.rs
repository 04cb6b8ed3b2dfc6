//! In-memory storage backend for testing and embedders that need no durability

use async_trait::async_trait;
use dashmap::DashMap;
use rehydrate_core::{EntryVisitor, KvStorage, RehydrateResult, StorageBackend};
use serde_json::Value;
use std::sync::Arc;

type Namespace = Arc<DashMap<String, Value>>;

/// Process-local backend holding any number of namespaces.
///
/// Cloning the backend shares its namespaces, and opening the same
/// namespace twice yields storages over the same entries.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    namespaces: Arc<DashMap<String, Namespace>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
    
    /// Names of every namespace opened so far
    pub fn namespaces(&self) -> Vec<String> {
        let mut names: Vec<String> = self.namespaces.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

impl StorageBackend for MemoryBackend {
    type Storage = MemoryStorage;
    
    fn namespace(&self, name: &str) -> RehydrateResult<MemoryStorage> {
        let data = self
            .namespaces
            .entry(name.to_string())
            .or_default()
            .value()
            .clone();
        Ok(MemoryStorage {
            name: name.to_string(),
            data,
        })
    }
}

/// One namespace of a [`MemoryBackend`]
#[derive(Clone)]
pub struct MemoryStorage {
    name: String,
    data: Namespace,
}

impl MemoryStorage {
    /// Standalone storage not attached to any backend
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            data: Arc::new(DashMap::new()),
        }
    }
    
    pub fn with_data(name: &str, data: Vec<(String, Value)>) -> Self {
        let storage = Self::new(name);
        for (key, value) in data {
            storage.data.insert(key, value);
        }
        storage
    }
    
    /// Synchronous read, handy for assertions
    pub fn peek(&self, key: &str) -> Option<Value> {
        self.data.get(key).map(|v| v.value().clone())
    }
    
    /// Current entries sorted by key
    pub fn entries(&self) -> Vec<(String, Value)> {
        let mut entries: Vec<(String, Value)> = self
            .data
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }
}

#[async_trait]
impl KvStorage for MemoryStorage {
    fn namespace(&self) -> &str {
        &self.name
    }
    
    async fn iterate(&self, visitor: &mut EntryVisitor<'_>) -> RehydrateResult<()> {
        // Copy out first so no shard lock is held while the visitor runs
        for (key, value) in self.entries() {
            visitor(key, value);
        }
        Ok(())
    }
    
    async fn get_item(&self, key: &str) -> RehydrateResult<Option<Value>> {
        Ok(self.peek(key))
    }
    
    async fn set_item(&self, key: &str, value: Value) -> RehydrateResult<Value> {
        self.data.insert(key.to_string(), value.clone());
        Ok(value)
    }
    
    async fn remove_item(&self, key: &str) -> RehydrateResult<()> {
        self.data.remove(key);
        Ok(())
    }
    
    async fn clear(&self) -> RehydrateResult<()> {
        self.data.clear();
        Ok(())
    }
    
    async fn len(&self) -> RehydrateResult<usize> {
        Ok(self.data.len())
    }
}
