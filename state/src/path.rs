//! Dot-path addressing into a state tree and the default path reducer

use rehydrate_core::{is_truthy, StateTree};
use serde_json::{Map, Value};
use std::fmt;

/// A parsed dot-delimited path such as `"foo.bar"`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StatePath {
    segments: Vec<String>,
}

impl StatePath {
    pub fn parse(path: &str) -> Self {
        Self {
            segments: path.split('.').map(str::to_string).collect(),
        }
    }
    
    pub fn segments(&self) -> &[String] {
        &self.segments
    }
    
    /// Top-level key this path lives under
    pub fn root(&self) -> &str {
        &self.segments[0]
    }
    
    /// Look up the value at this path
    pub fn get<'a>(&self, tree: &'a StateTree) -> Option<&'a Value> {
        let (first, rest) = self.segments.split_first()?;
        rest.iter()
            .try_fold(tree.get(first)?, |node, segment| step(node, segment))
    }
    
    /// Write `value` at this path, creating missing intermediate mappings.
    ///
    /// Returns `false` when an intermediate node exists but cannot hold
    /// children; the tree is left untouched in that case.
    pub fn set(&self, tree: &mut StateTree, value: Value) -> bool {
        let Some((leaf, parents)) = self.segments.split_last() else {
            return false;
        };
        match ensure_parents(tree, parents) {
            Some(parent) => {
                parent.insert(leaf.clone(), value);
                true
            }
            None => false,
        }
    }
    
    /// Create the mappings leading up to the leaf without writing the leaf
    pub fn touch(&self, tree: &mut StateTree) -> bool {
        let parents = &self.segments[..self.segments.len() - 1];
        ensure_parents(tree, parents).is_some()
    }
}

impl From<&str> for StatePath {
    fn from(path: &str) -> Self {
        Self::parse(path)
    }
}

impl fmt::Display for StatePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

fn step<'a>(node: &'a Value, segment: &str) -> Option<&'a Value> {
    match node {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

fn ensure_parents<'a>(
    tree: &'a mut StateTree,
    parents: &[String],
) -> Option<&'a mut Map<String, Value>> {
    let mut current = tree;
    for segment in parents {
        let child = current
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        // Falsy scalars are overwritten, truthy ones block the write
        if !is_truthy(child) {
            *child = Value::Object(Map::new());
        }
        current = child.as_object_mut()?;
    }
    Some(current)
}

/// Value at `path`, `None` when any segment is missing
pub fn get<'a>(tree: &'a StateTree, path: &str) -> Option<&'a Value> {
    StatePath::parse(path).get(tree)
}

/// Write `value` at `path`, auto-creating intermediate mappings
pub fn set(tree: &mut StateTree, path: &str, value: Value) -> bool {
    StatePath::parse(path).set(tree, value)
}

/// Default reducer: keep only the configured paths.
///
/// `None` passes the whole state through. With a list, a fresh tree is built
/// from each path's value; absent or `null` values are not written, though
/// the mappings leading to them still are.
pub fn reduce(state: &StateTree, paths: Option<&[String]>) -> StateTree {
    let Some(paths) = paths else {
        return state.clone();
    };
    
    let mut reduced = StateTree::new();
    for raw in paths {
        let path = StatePath::parse(raw);
        match path.get(state) {
            Some(value) if !value.is_null() => {
                path.set(&mut reduced, value.clone());
            }
            _ => {
                path.touch(&mut reduced);
            }
        }
    }
    reduced
}
