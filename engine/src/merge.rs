//! Reconciler: fold a saved state into the container's initial state

use rehydrate_core::StateTree;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Sequence merge policy: `(original, saved) -> merged`
pub type ArrayMergeFn = dyn Fn(Vec<Value>, Vec<Value>) -> Vec<Value> + Send + Sync;

/// Shared handle to an [`ArrayMergeFn`]
pub type ArrayMerger = Arc<ArrayMergeFn>;

/// Default sequence policy: the saved sequence replaces the original wholesale
pub fn keep_saved(_original: Vec<Value>, saved: Vec<Value>) -> Vec<Value> {
    saved
}

/// How a saved state is folded into the initial state
#[derive(Clone)]
pub struct MergeOptions {
    /// Install the saved state verbatim, discarding the initial state
    pub overwrite: bool,
    /// Policy for sequences present on both sides
    pub array_merger: ArrayMerger,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            overwrite: false,
            array_merger: Arc::new(keep_saved),
        }
    }
}

impl fmt::Debug for MergeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MergeOptions")
            .field("overwrite", &self.overwrite)
            .finish_non_exhaustive()
    }
}

/// Outcome of reconciliation
#[derive(Debug, Clone, PartialEq)]
pub enum Reconciled {
    /// Nothing was persisted; the initial state stands and must not be reinstalled
    Unchanged(StateTree),
    /// The container state must be replaced with this tree
    Replaced(StateTree),
}

impl Reconciled {
    pub fn is_replaced(&self) -> bool {
        matches!(self, Reconciled::Replaced(_))
    }
    
    pub fn into_tree(self) -> StateTree {
        match self {
            Reconciled::Unchanged(tree) | Reconciled::Replaced(tree) => tree,
        }
    }
}

/// Decide the state to install given the initial and saved states.
///
/// Both trees are taken by value; subtrees of `initial` that the saved
/// state does not reach are moved into the result, never copied.
pub fn reconcile(initial: StateTree, saved: StateTree, options: &MergeOptions) -> Reconciled {
    if saved.is_empty() {
        return Reconciled::Unchanged(initial);
    }
    if options.overwrite {
        return Reconciled::Replaced(saved);
    }
    Reconciled::Replaced(merge_trees(initial, saved, options.array_merger.as_ref()))
}

/// Deep merge of two mappings, `source` winning at every leaf
pub fn merge_trees(mut target: StateTree, source: StateTree, array_merger: &ArrayMergeFn) -> StateTree {
    for (key, incoming) in source {
        match target.get_mut(&key) {
            Some(existing) if is_mergeable(&incoming) => {
                let current = existing.take();
                *existing = merge_values(current, incoming, array_merger);
            }
            _ => {
                target.insert(key, incoming);
            }
        }
    }
    target
}

/// Deep merge of two values, `source` winning on any type mismatch
pub fn merge_values(target: Value, source: Value, array_merger: &ArrayMergeFn) -> Value {
    match (target, source) {
        (Value::Array(original), Value::Array(saved)) => {
            Value::Array(array_merger(original, saved))
        }
        (Value::Object(original), Value::Object(saved)) => {
            Value::Object(merge_trees(original, saved, array_merger))
        }
        (_, source) => source,
    }
}

fn is_mergeable(value: &Value) -> bool {
    value.is_object() || value.is_array()
}
