//! Core types for rehydrate

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Application state: an ordered mapping from top-level keys to nested values.
///
/// Each top-level key is one storage entry; whatever lives below a key is
/// persisted and restored as a whole.
pub type StateTree = serde_json::Map<String, Value>;

/// Descriptor of a committed mutation, handed to filters and handlers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mutation {
    /// Mutation type, e.g. `"setUser"`
    pub kind: String,
    /// Arbitrary payload the mutation was committed with
    #[serde(default)]
    pub payload: Value,
}

impl Mutation {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            payload: Value::Null,
        }
    }
    
    pub fn with_payload(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }
}

impl fmt::Display for Mutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)
    }
}

/// Handle returned by a container subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriptionId(pub u64);

impl SubscriptionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
    
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub#{}", self.0)
    }
}

/// Loose truthiness of a stored value.
///
/// `null`, `false`, zero and the empty string are falsy. Sequences and
/// mappings are truthy even when empty.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Convert a JSON value into a state tree, if it is a mapping
pub fn tree_from_value(value: Value) -> Option<StateTree> {
    match value {
        Value::Object(map) => Some(map),
        _ => None,
    }
}
