use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// A rooted, acyclic tree of objects, arrays and scalar leaves.
///
/// Owned JSON values cannot form cycles, so the only shape constraints left
/// to check are the root kind and nesting depth (see [`crate::validate_shape`]).
pub type StateTree = serde_json::Value;

/// An immutable, filtered copy of state captured at one point in history.
pub type Snapshot = StateTree;

/// Undo stack, current snapshot and redo stack.
///
/// `undo` is ordered oldest to newest, `redo` newest to oldest, so the next
/// snapshot to restore is `undo.last()` or `redo.front()` respectively.
/// This is also the persisted layout.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryState {
    pub undo: Vec<Snapshot>,
    pub current: Option<Snapshot>,
    pub redo: VecDeque<Snapshot>,
}

impl HistoryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when nothing has been saved.
    pub fn is_empty(&self) -> bool {
        self.undo.is_empty() && self.current.is_none() && self.redo.is_empty()
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.current = None;
        self.redo.clear();
    }
}

/// Location of a node inside a [`StateTree`]. The root is the empty path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Path(Vec<String>);

impl Path {
    /// The root path.
    pub fn root() -> Self {
        Self::default()
    }

    /// Build a path from its keys.
    pub fn from_keys<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        Self(keys.into_iter().map(Into::into).collect())
    }

    /// Parse a dotted path (`a.b.0`). An empty string or `$` is the root.
    pub fn parse(dotted: &str) -> Self {
        if dotted.is_empty() || dotted == "$" {
            return Self::root();
        }
        Self::from_keys(dotted.split('.'))
    }

    /// Path of `key` beneath this path.
    pub fn child(&self, key: impl Into<String>) -> Self {
        let mut keys = self.0.clone();
        keys.push(key.into());
        Self(keys)
    }

    /// Path of the containing node, `None` at the root.
    pub fn parent(&self) -> Option<Self> {
        let (_, rest) = self.0.split_last()?;
        Some(Self(rest.to_vec()))
    }

    /// Final key of this path, `None` at the root.
    pub fn last(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    pub fn keys(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Look up the node at this path.
    pub fn resolve<'a>(&self, tree: &'a StateTree) -> Option<&'a StateTree> {
        let mut node = tree;
        for key in &self.0 {
            node = match node {
                StateTree::Object(map) => map.get(key)?,
                StateTree::Array(items) => items.get(key.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(node)
    }

    /// Mutable lookup of the node at this path.
    pub fn resolve_mut<'a>(&self, tree: &'a mut StateTree) -> Option<&'a mut StateTree> {
        let mut node = tree;
        for key in &self.0 {
            node = match node {
                StateTree::Object(map) => map.get_mut(key)?,
                StateTree::Array(items) => items.get_mut(key.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(node)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("$");
        }
        f.write_str(&self.0.join("."))
    }
}

impl<K: Into<String>> FromIterator<K> for Path {
    fn from_iter<I: IntoIterator<Item = K>>(iter: I) -> Self {
        Self::from_keys(iter)
    }
}
