//! Filtered deep copy of a state tree.

use rewind_common::{Path, StateTree};
use serde_json::Map;

/// Deep-copy `tree`, omitting every key for which `exclude` returns true.
///
/// `exclude` receives the child value, its key, and the path of the
/// *containing* node; callers build the full path with `path.child(key)`.
/// Excluded object keys are absent from the output. Array elements are
/// tested with their decimal index as key; an excluded element leaves a
/// `null` hole so every later element keeps its index, and restoring with
/// [`crate::merge_snapshot`] under the same predicate leaves the live
/// element in place. Excluded subtrees are never visited.
pub fn copy_filtered<F>(tree: &StateTree, mut exclude: F) -> StateTree
where
    F: FnMut(&StateTree, &str, &Path) -> bool,
{
    copy_node(tree, &Path::root(), &mut exclude)
}

fn copy_node<F>(node: &StateTree, path: &Path, exclude: &mut F) -> StateTree
where
    F: FnMut(&StateTree, &str, &Path) -> bool,
{
    match node {
        StateTree::Object(map) => {
            let mut out = Map::new();
            for (key, value) in map {
                if exclude(value, key, path) {
                    continue;
                }
                let copied = copy_node(value, &path.child(key.as_str()), exclude);
                out.insert(key.clone(), copied);
            }
            StateTree::Object(out)
        }
        StateTree::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for (i, value) in items.iter().enumerate() {
                let key = i.to_string();
                if exclude(value, &key, path) {
                    out.push(StateTree::Null);
                    continue;
                }
                out.push(copy_node(value, &path.child(key), exclude));
            }
            StateTree::Array(out)
        }
        scalar => scalar.clone(),
    }
}
