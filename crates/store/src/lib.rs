//! State container: named operations over a live state tree, derived fields,
//! and autosaved undo/redo history.
//!
//! # Invariants
//! - All state mutations flow through dispatched operations.
//! - Every accepted operation not excluded by configuration is saved to
//!   history before `dispatch` returns.
//! - Undo and redo merge snapshots into live state; excluded and derived
//!   fields keep their live values.

pub mod config;
pub mod model;
pub mod store;

pub use config::{ConfigError, UndoConfig, UndoSettings};
pub use model::{ActionError, Model};
pub use store::{REDO, RESET, SAVE, Store, StoreError, UNDO};
