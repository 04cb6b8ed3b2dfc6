//! Core traits defining rehydrate's collaborators
//! 
//! The engine talks to exactly two outside parties: an async key-value
//! storage backend and a state container that owns the live state tree.

use crate::types::*;
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;
use std::sync::Arc;

/// Result type for rehydrate operations
pub type RehydrateResult<T> = Result<T, crate::error::RehydrateError>;

/// Visitor invoked once per stored entry during iteration
pub type EntryVisitor<'a> = dyn FnMut(String, Value) + Send + 'a;

/// Async key-value storage scoped to one namespace
#[async_trait]
pub trait KvStorage: Send + Sync {
    /// Name of the namespace this storage is scoped to
    fn namespace(&self) -> &str;
    
    /// Visit every stored entry.
    ///
    /// Entries visited before an error was hit have already been handed to
    /// the visitor when the error is returned.
    async fn iterate(&self, visitor: &mut EntryVisitor<'_>) -> RehydrateResult<()>;
    
    /// Get a value by key, `None` when absent
    async fn get_item(&self, key: &str) -> RehydrateResult<Option<Value>>;
    
    /// Insert or replace a value, returning the stored value
    async fn set_item(&self, key: &str, value: Value) -> RehydrateResult<Value>;
    
    /// Delete a key. Deleting an absent key is not an error.
    async fn remove_item(&self, key: &str) -> RehydrateResult<()>;
    
    /// Remove every entry in the namespace
    async fn clear(&self) -> RehydrateResult<()>;
    
    /// Number of stored entries
    async fn len(&self) -> RehydrateResult<usize> {
        let mut count = 0usize;
        let mut visit = |_: String, _: Value| count += 1;
        self.iterate(&mut visit).await?;
        Ok(count)
    }
    
    /// Whether the namespace holds no entries
    async fn is_empty(&self) -> RehydrateResult<bool> {
        Ok(self.len().await? == 0)
    }
}

/// Factory that scopes storage to a named store
pub trait StorageBackend: Send + Sync {
    type Storage: KvStorage + 'static;
    
    /// Open (or create) the namespace `name`
    fn namespace(&self, name: &str) -> RehydrateResult<Self::Storage>;
}

/// Listener registered on a state container.
///
/// Called once per committed mutation, in commit order, with the mutation
/// and the state as it stands after the commit.
pub type MutationHandler =
    Arc<dyn Fn(Mutation, StateTree) -> BoxFuture<'static, RehydrateResult<()>> + Send + Sync>;

/// Container owning the live application state
pub trait StateContainer: Send + Sync {
    /// Owned copy of the current state
    fn state(&self) -> StateTree;
    
    /// Install a tree as the current state
    fn replace_state(&self, state: StateTree);
    
    /// Register a mutation listener
    fn subscribe(&self, handler: MutationHandler) -> SubscriptionId;
    
    /// Drop a previously registered listener
    fn unsubscribe(&self, id: SubscriptionId) -> bool;
}

#[async_trait]
impl<T: KvStorage + ?Sized> KvStorage for Arc<T> {
    fn namespace(&self) -> &str {
        (**self).namespace()
    }
    
    async fn iterate(&self, visitor: &mut EntryVisitor<'_>) -> RehydrateResult<()> {
        (**self).iterate(visitor).await
    }
    
    async fn get_item(&self, key: &str) -> RehydrateResult<Option<Value>> {
        (**self).get_item(key).await
    }
    
    async fn set_item(&self, key: &str, value: Value) -> RehydrateResult<Value> {
        (**self).set_item(key, value).await
    }
    
    async fn remove_item(&self, key: &str) -> RehydrateResult<()> {
        (**self).remove_item(key).await
    }
    
    async fn clear(&self) -> RehydrateResult<()> {
        (**self).clear().await
    }
    
    async fn len(&self) -> RehydrateResult<usize> {
        (**self).len().await
    }
}
