//! State snapshot functionality

use rehydrate_core::StateTree;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Immutable copy of a state tree, the reference point for diffing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Bumped every time the snapshot is replaced
    pub version: u64,
    /// Captured tree
    pub tree: StateTree,
    /// Timestamp of snapshot creation
    pub timestamp: u64,
}

impl Snapshot {
    /// Create a new snapshot of a tree
    pub fn new(version: u64, tree: StateTree) -> Self {
        Self {
            version,
            tree,
            timestamp: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
        }
    }
    
    /// First snapshot, seeded at setup time
    pub fn initial(tree: StateTree) -> Self {
        Self::new(0, tree)
    }
    
    /// Successor snapshot replacing this one
    pub fn succeed(&self, tree: StateTree) -> Self {
        Self::new(self.version + 1, tree)
    }
    
    /// Value stored under a top-level key
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.tree.get(key)
    }
    
    /// Get the number of top-level keys
    pub fn len(&self) -> usize {
        self.tree.len()
    }
    
    /// Check if snapshot is empty
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::initial(StateTree::new())
    }
}
