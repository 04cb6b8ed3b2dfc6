//! Configuration types for rehydrate

use crate::error::RehydrateError;
use crate::traits::RehydrateResult;
use serde::{Deserialize, Serialize};

/// Namespace used when no key is configured
pub const DEFAULT_NAMESPACE: &str = "store";

/// Data-only persistence options.
///
/// Function-valued options (reducer, filter, subscriber, array merger,
/// rehydrated callback) are not serializable and are set on the plugin
/// builder instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PersistConfig {
    /// Storage namespace; empty means [`DEFAULT_NAMESPACE`]
    pub key: String,
    
    /// Dot-paths to persist; `None` persists the entire state
    pub paths: Option<Vec<String>>,
    
    /// Start reading storage when the plugin is built rather than on install
    pub fetch_before_use: bool,
    
    /// Install saved state verbatim instead of merging
    pub overwrite: bool,
}

impl Default for PersistConfig {
    fn default() -> Self {
        Self {
            key: DEFAULT_NAMESPACE.to_string(),
            paths: None,
            fetch_before_use: false,
            overwrite: false,
        }
    }
}

impl PersistConfig {
    /// Parse from JSON, filling unspecified fields with defaults
    pub fn from_json(json: &str) -> RehydrateResult<Self> {
        serde_json::from_str(json).map_err(|e| RehydrateError::ConfigError(e.to_string()))
    }
    
    /// Serialize to pretty JSON
    pub fn to_json(&self) -> RehydrateResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
    
    /// Namespace the plugin opens
    pub fn namespace(&self) -> &str {
        if self.key.is_empty() {
            DEFAULT_NAMESPACE
        } else {
            &self.key
        }
    }
}
