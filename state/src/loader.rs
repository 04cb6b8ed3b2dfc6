//! Snapshot loader: read everything a namespace holds into a saved state

use rehydrate_core::{KvStorage, StateTree};
use serde_json::Value;
use tracing::{debug, warn};

/// Read every stored entry into a flat tree keyed by storage key.
///
/// Never fails. If iteration breaks part way, whatever was read so far is
/// returned, so a broken store cannot keep the container from starting.
pub async fn load_saved_state<S: KvStorage + ?Sized>(storage: &S) -> StateTree {
    let mut saved = StateTree::new();
    let mut visit = |key: String, value: Value| {
        saved.insert(key, value);
    };
    
    if let Err(e) = storage.iterate(&mut visit).await {
        warn!(
            "Reading saved state from '{}' failed, continuing with what was read: {}",
            storage.namespace(),
            e
        );
    }
    
    debug!(
        "Loaded {} saved entries from '{}'",
        saved.len(),
        storage.namespace()
    );
    saved
}
