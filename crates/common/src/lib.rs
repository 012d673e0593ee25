//! Shared types for the rewind history engine.
//!
//! # Invariants
//! - A `StateTree` entering history has an object root and bounded depth.
//! - Paths are sequences of string keys; array indices are decimal strings.

mod shape;
mod types;

pub use shape::{MAX_DEPTH, ShapeError, to_state_tree, validate_shape};
pub use types::{HistoryState, Path, Snapshot, StateTree};
