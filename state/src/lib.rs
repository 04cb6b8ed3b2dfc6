//! Rehydrate State Management
//! 
//! Storage backends, dot-path helpers, snapshots and the saved-state loader.
//! Storage uses a flat key-value model: one entry per top-level state key.

pub mod memory;
pub mod persistent;
pub mod path;
pub mod snapshot;
pub mod loader;

pub use memory::*;
pub use persistent::*;
pub use path::{reduce, StatePath};
pub use snapshot::*;
pub use loader::*;
