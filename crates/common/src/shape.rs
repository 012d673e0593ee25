use crate::types::{Path, StateTree};
use serde::Serialize;

/// Maximum nesting depth accepted for a state tree.
///
/// Deeper trees are rejected as malformed; this is where a cyclic model
/// surfaces once it has been flattened into an owned tree. A snapshot sits
/// two levels down in the persisted record, and the whole record must stay
/// under serde_json's recursion limit of 128 to decode.
pub const MAX_DEPTH: usize = 120;

/// Errors describing a state value that cannot enter history.
#[derive(Debug, thiserror::Error)]
pub enum ShapeError {
    #[error("invalid state shape at {path}: {reason}")]
    InvalidStateShape { path: Path, reason: String },
}

impl ShapeError {
    pub fn invalid(path: Path, reason: impl Into<String>) -> Self {
        Self::InvalidStateShape {
            path,
            reason: reason.into(),
        }
    }
}

/// Convert any serializable value into a [`StateTree`].
///
/// Fails for values with no JSON form (non-string map keys, serializer
/// errors) and for trees that do not pass [`validate_shape`].
pub fn to_state_tree<T: Serialize + ?Sized>(value: &T) -> Result<StateTree, ShapeError> {
    let tree = serde_json::to_value(value)
        .map_err(|e| ShapeError::invalid(Path::root(), e.to_string()))?;
    validate_shape(&tree)?;
    Ok(tree)
}

/// Check that a tree may be snapshotted: object root, bounded depth.
pub fn validate_shape(tree: &StateTree) -> Result<(), ShapeError> {
    if !tree.is_object() {
        return Err(ShapeError::invalid(
            Path::root(),
            format!("root must be an object, found {}", kind(tree)),
        ));
    }
    check_depth(tree, &Path::root())
}

fn check_depth(node: &StateTree, path: &Path) -> Result<(), ShapeError> {
    if path.len() > MAX_DEPTH {
        return Err(ShapeError::invalid(
            path.clone(),
            format!("nesting deeper than {MAX_DEPTH} levels"),
        ));
    }
    match node {
        StateTree::Object(map) => {
            for (key, child) in map {
                check_depth(child, &path.child(key.as_str()))?;
            }
        }
        StateTree::Array(items) => {
            for (i, child) in items.iter().enumerate() {
                check_depth(child, &path.child(i.to_string()))?;
            }
        }
        _ => {}
    }
    Ok(())
}

fn kind(tree: &StateTree) -> &'static str {
    match tree {
        StateTree::Null => "null",
        StateTree::Bool(_) => "boolean",
        StateTree::Number(_) => "number",
        StateTree::String(_) => "string",
        StateTree::Array(_) => "array",
        StateTree::Object(_) => "object",
    }
}
