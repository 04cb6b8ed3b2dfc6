//! Rehydrate Core Library
//! 
//! Core types, traits, and abstractions for keeping an application state tree
//! in sync with an async key-value store.
//! This crate provides the foundation for the storage and engine crates.

pub mod types;
pub mod traits;
pub mod error;
pub mod config;

pub use types::*;
pub use traits::*;
pub use error::*;
pub use config::*;
