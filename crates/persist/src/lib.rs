//! Persistence: key-value text stores and the history record codec.
//!
//! # Invariants
//! - History is stored as one text blob under one key.
//! - A record decodes only if its schema version and checksum match.
//! - File-backed writes are atomic (temp file + rename).

mod file;
mod kv;
mod record;

pub use file::FileStore;
pub use kv::{KeyValueStore, KvError, MemoryStore};
pub use record::{HISTORY_SCHEMA_VERSION, RecordError, decode, encode};
