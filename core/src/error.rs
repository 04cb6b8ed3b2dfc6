//! Error types for rehydrate

use thiserror::Error;

/// Main error type for rehydrate
#[derive(Error, Debug)]
pub enum RehydrateError {
    // ============ Storage Errors ============
    #[error("Storage error: {0}")]
    StorageError(String),
    
    #[error("Namespace unavailable: {0}")]
    NamespaceUnavailable(String),
    
    #[error("Write failed for key '{key}': {reason}")]
    WriteFailed { key: String, reason: String },
    
    #[error("Remove failed for key '{key}': {reason}")]
    RemoveFailed { key: String, reason: String },
    
    // ============ Encoding Errors ============
    #[error("Serialization failed: {0}")]
    SerializationError(String),
    
    #[error("Deserialization failed: {0}")]
    DeserializationError(String),
    
    // ============ Setup Errors ============
    #[error("Configuration error: {0}")]
    ConfigError(String),
    
    #[error("No async runtime available: {0}")]
    RuntimeUnavailable(String),
    
    // ============ General Errors ============
    #[error("Internal error: {0}")]
    Internal(String),
    
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<std::io::Error> for RehydrateError {
    fn from(err: std::io::Error) -> Self {
        RehydrateError::StorageError(err.to_string())
    }
}

impl From<serde_json::Error> for RehydrateError {
    fn from(err: serde_json::Error) -> Self {
        RehydrateError::SerializationError(err.to_string())
    }
}
