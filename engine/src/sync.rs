//! Sync engine: diff a new state against the previous snapshot and push the
//! difference to storage
//!
//! Diffing works per top-level key. A change anywhere below key `k` rewrites
//! `k`'s whole value; nothing below the top level is ever written on its own.

use futures::future::join_all;
use rehydrate_core::{is_truthy, KvStorage, RehydrateError, RehydrateResult, StateTree};
use rehydrate_state::Snapshot;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// A single storage operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum StorageOp {
    Write { key: String, value: Value },
    Remove { key: String },
}

impl StorageOp {
    pub fn key(&self) -> &str {
        match self {
            StorageOp::Write { key, .. } | StorageOp::Remove { key } => key,
        }
    }
}

/// Operations needed to bring storage from one tree to the next
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncPlan {
    pub ops: Vec<StorageOp>,
}

impl SyncPlan {
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
    
    pub fn len(&self) -> usize {
        self.ops.len()
    }
    
    pub fn writes(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.ops.iter().filter_map(|op| match op {
            StorageOp::Write { key, value } => Some((key.as_str(), value)),
            StorageOp::Remove { .. } => None,
        })
    }
    
    pub fn removals(&self) -> impl Iterator<Item = &str> {
        self.ops.iter().filter_map(|op| match op {
            StorageOp::Remove { key } => Some(key.as_str()),
            StorageOp::Write { .. } => None,
        })
    }
}

/// Counts of what a sync pushed to storage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub written: usize,
    pub removed: usize,
}

impl SyncReport {
    pub fn from_plan(plan: &SyncPlan) -> Self {
        let removed = plan.removals().count();
        Self {
            written: plan.len() - removed,
            removed,
        }
    }
    
    /// Nothing touched storage
    pub fn is_noop(&self) -> bool {
        self.written == 0 && self.removed == 0
    }
}

/// Plan the storage operations turning `previous` into `next`.
///
/// At most one operation per key:
/// - a key whose entry in `previous` has no equal entry in `next` is
///   rewritten when `next` holds a truthy value for it, removed otherwise;
/// - a key only `next` has is written, whatever its value.
pub fn plan_sync(previous: &StateTree, next: &StateTree) -> SyncPlan {
    let mut ops = Vec::new();
    
    for (key, old) in previous {
        match next.get(key) {
            Some(new) if new == old => {}
            Some(new) if is_truthy(new) => ops.push(StorageOp::Write {
                key: key.clone(),
                value: new.clone(),
            }),
            _ => ops.push(StorageOp::Remove { key: key.clone() }),
        }
    }
    
    for (key, value) in next {
        if !previous.contains_key(key) {
            ops.push(StorageOp::Write {
                key: key.clone(),
                value: value.clone(),
            });
        }
    }
    
    SyncPlan { ops }
}

/// Issue every operation of `plan` concurrently and wait for all of them.
///
/// Every operation is allowed to settle; the first failure in plan order is
/// then returned for the whole call.
pub async fn dispatch<S: KvStorage + ?Sized>(storage: &S, plan: &SyncPlan) -> RehydrateResult<SyncReport> {
    let results = join_all(plan.ops.iter().map(|op| apply(storage, op))).await;
    results.into_iter().collect::<RehydrateResult<Vec<()>>>()?;
    Ok(SyncReport::from_plan(plan))
}

async fn apply<S: KvStorage + ?Sized>(storage: &S, op: &StorageOp) -> RehydrateResult<()> {
    match op {
        StorageOp::Write { key, value } => {
            debug!("Writing '{}' to '{}'", key, storage.namespace());
            storage
                .set_item(key, value.clone())
                .await
                .map(|_| ())
                .map_err(|e| RehydrateError::WriteFailed {
                    key: key.clone(),
                    reason: e.to_string(),
                })
        }
        StorageOp::Remove { key } => {
            debug!("Removing '{}' from '{}'", key, storage.namespace());
            storage
                .remove_item(key)
                .await
                .map_err(|e| RehydrateError::RemoveFailed {
                    key: key.clone(),
                    reason: e.to_string(),
                })
        }
    }
}

/// Diff `next` against `previous` and push the difference to `storage`
pub async fn sync_state<S: KvStorage + ?Sized>(
    next: &StateTree,
    previous: &StateTree,
    storage: &S,
) -> RehydrateResult<SyncReport> {
    let plan = plan_sync(previous, next);
    if plan.is_empty() {
        return Ok(SyncReport::default());
    }
    dispatch(storage, &plan).await
}

/// Owner of the previous snapshot for one installed container.
///
/// Syncs are serialized: the snapshot lock is held from planning until every
/// operation has settled, so each sync diffs against the outcome of the one
/// before it. The snapshot only moves forward when every operation succeeded.
pub struct SyncEngine<S: KvStorage> {
    storage: Arc<S>,
    previous: Mutex<Snapshot>,
}

impl<S: KvStorage> SyncEngine<S> {
    pub fn new(storage: Arc<S>, seed: StateTree) -> Self {
        Self {
            storage,
            previous: Mutex::new(Snapshot::initial(seed)),
        }
    }
    
    /// Copy of the snapshot the next sync will diff against
    pub async fn snapshot(&self) -> Snapshot {
        self.previous.lock().await.clone()
    }
    
    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }
    
    /// Bring storage in line with `next`
    pub async fn sync(&self, next: StateTree) -> RehydrateResult<SyncReport> {
        let mut previous = self.previous.lock().await;
        
        let plan = plan_sync(&previous.tree, &next);
        if plan.is_empty() {
            debug!("No changes against snapshot v{}", previous.version);
            return Ok(SyncReport::default());
        }
        
        let report = dispatch(self.storage.as_ref(), &plan).await?;
        *previous = previous.succeed(next);
        
        info!(
            "Synced snapshot v{} to '{}': {} written, {} removed",
            previous.version,
            self.storage.namespace(),
            report.written,
            report.removed
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FlakyStorage;
    use rehydrate_core::tree_from_value;
    use rehydrate_state::MemoryStorage;
    use serde_json::json;
    
    fn tree(value: Value) -> StateTree {
        tree_from_value(value).unwrap()
    }
    
    #[test]
    fn test_plan_detects_new_changed_and_removed_keys() {
        let previous = tree(json!({ "keep": 1, "change": { "a": 1 }, "drop": "x" }));
        let next = tree(json!({ "keep": 1, "change": { "a": 2 }, "add": [1] }));
        
        let plan = plan_sync(&previous, &next);
        assert_eq!(
            plan.ops,
            vec![
                StorageOp::Write { key: "change".into(), value: json!({ "a": 2 }) },
                StorageOp::Remove { key: "drop".into() },
                StorageOp::Write { key: "add".into(), value: json!([1]) },
            ]
        );
        assert_eq!(SyncReport::from_plan(&plan), SyncReport { written: 2, removed: 1 });
    }
    
    #[test]
    fn test_plan_removes_keys_turned_falsy() {
        let previous = tree(json!({ "a": "x", "b": true, "c": 5, "d": [1] }));
        let next = tree(json!({ "a": "", "b": false, "c": 0, "d": null }));
        
        let plan = plan_sync(&previous, &next);
        let removed: Vec<&str> = plan.removals().collect();
        assert_eq!(removed, vec!["a", "b", "c", "d"]);
        assert_eq!(plan.writes().count(), 0);
    }
    
    #[test]
    fn test_plan_writes_new_falsy_keys() {
        let plan = plan_sync(&StateTree::new(), &tree(json!({ "flag": false })));
        assert_eq!(
            plan.ops,
            vec![StorageOp::Write { key: "flag".into(), value: json!(false) }]
        );
    }
    
    #[test]
    fn test_plan_ignores_key_order() {
        let previous = tree(json!({ "a": { "x": 1, "y": 2 }, "b": 1 }));
        let next = tree(json!({ "b": 1, "a": { "y": 2, "x": 1 } }));
        assert!(plan_sync(&previous, &next).is_empty());
    }
    
    #[test]
    fn test_plan_serializes_tagged_ops() {
        let plan = plan_sync(&tree(json!({ "gone": 1 })), &tree(json!({ "new": "v" })));
        assert_eq!(
            serde_json::to_value(&plan).unwrap(),
            json!({ "ops": [
                { "op": "remove", "key": "gone" },
                { "op": "write", "key": "new", "value": "v" }
            ] })
        );
    }
    
    #[tokio::test]
    async fn test_sync_state_writes_and_removes() {
        let storage = MemoryStorage::with_data("store", vec![("old".to_string(), json!("x"))]);
        let previous = tree(json!({ "old": "x" }));
        let next = tree(json!({ "foo": { "bar": "baz" }, "bar": "baz" }));
        
        let report = sync_state(&next, &previous, &storage).await.unwrap();
        assert_eq!(report, SyncReport { written: 2, removed: 1 });
        assert_eq!(storage.peek("foo"), Some(json!({ "bar": "baz" })));
        assert_eq!(storage.peek("bar"), Some(json!("baz")));
        assert_eq!(storage.peek("old"), None);
    }
    
    #[tokio::test]
    async fn test_engine_sync_is_idempotent() {
        let storage = Arc::new(MemoryStorage::new("store"));
        let engine = SyncEngine::new(storage.clone(), StateTree::new());
        let next = tree(json!({ "changed": "state" }));
        
        let first = engine.sync(next.clone()).await.unwrap();
        assert_eq!(first.written, 1);
        assert_eq!(engine.snapshot().await.tree, next);
        
        let second = engine.sync(next).await.unwrap();
        assert!(second.is_noop());
        assert_eq!(engine.snapshot().await.version, 1);
    }
    
    #[tokio::test]
    async fn test_failed_write_fails_sync_and_keeps_snapshot() {
        let storage = Arc::new(FlakyStorage::failing_on("bad"));
        let engine = SyncEngine::new(storage.clone(), StateTree::new());
        
        let err = engine
            .sync(tree(json!({ "good": 1, "bad": 2 })))
            .await
            .unwrap_err();
        assert!(matches!(err, RehydrateError::WriteFailed { ref key, .. } if key == "bad"));
        
        // The other write still settled
        assert_eq!(storage.inner().peek("good"), Some(json!(1)));
        // Snapshot did not advance, so the next sync re-plans both keys
        assert!(engine.snapshot().await.is_empty());
        
        storage.heal();
        let report = engine.sync(tree(json!({ "good": 1, "bad": 2 }))).await.unwrap();
        assert_eq!(report.written, 2);
        assert_eq!(storage.inner().peek("bad"), Some(json!(2)));
    }
    
    #[tokio::test]
    async fn test_dispatch_issues_ops_concurrently() {
        let storage = FlakyStorage::slow();
        storage.inner().set_item("old", json!("x")).await.unwrap();
        let previous = tree(json!({ "old": "x" }));
        let next = tree(json!({ "a": 1, "b": 2, "c": 3 }));
        
        let report = sync_state(&next, &previous, &storage).await.unwrap();
        assert_eq!(report, SyncReport { written: 3, removed: 1 });
        // Every op was started before the first one finished
        assert_eq!(storage.max_in_flight(), 4);
        assert_eq!(storage.inner().peek("old"), None);
    }
    
    #[tokio::test]
    async fn test_concurrent_syncs_are_serialized() {
        let storage = Arc::new(FlakyStorage::slow());
        let engine = SyncEngine::new(storage.clone(), StateTree::new());
        
        // The second sync must diff against the first one's outcome, so the
        // key added by the first is removed again by the second.
        let (first, second) = tokio::join!(
            engine.sync(tree(json!({ "temp": "x", "kept": 1 }))),
            engine.sync(tree(json!({ "kept": 2 }))),
        );
        assert_eq!(first.unwrap(), SyncReport { written: 2, removed: 0 });
        assert_eq!(second.unwrap(), SyncReport { written: 1, removed: 1 });
        
        assert_eq!(storage.inner().peek("temp"), None);
        assert_eq!(storage.inner().peek("kept"), Some(json!(2)));
        assert_eq!(engine.snapshot().await.version, 2);
    }
}
