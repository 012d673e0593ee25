//! History store: undo stack, current snapshot, redo stack.
//!
//! # Invariants
//! - No snapshot contains a derived field, the `_computeds` root key, or a
//!   path excluded by the caller at save time.
//! - `save` clears the redo stack; `reset` clears both stacks.
//! - Every state change is written to the key-value store before returning.
//! - Unreadable persisted history is treated as no history.

mod history;

pub use history::{COMPUTEDS_KEY, DEFAULT_HISTORY_KEY, HistoryError, HistoryStore};
