//! Rehydrate Engine
//! 
//! Restores a persisted state tree into a state container on startup and
//! writes every later change back to an async key-value store.
//!
//! - [`merge`]: reconcile the saved state with the container's initial state
//! - [`sync`]: diff successive snapshots per top-level key and dispatch writes
//! - [`store`]: a minimal in-process state container
//! - [`plugin`]: the setup routine tying the pieces together

pub mod merge;
pub mod sync;
pub mod store;
pub mod plugin;

#[cfg(test)]
mod testing;

pub use merge::*;
pub use sync::*;
pub use store::*;
pub use plugin::*;
