//! Text encoding of a [`HistoryState`].
//!
//! ```text
//! {
//!   "schema_version": 1,
//!   "undo": [ ...oldest to newest... ],
//!   "current": { ... } | null,
//!   "redo": [ ...newest to oldest... ],
//!   "sha256": "<hex digest of the compact undo/current/redo payload>"
//! }
//! ```

use rewind_common::{HistoryState, Snapshot};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::VecDeque;

/// Current persisted record version.
pub const HISTORY_SCHEMA_VERSION: u32 = 1;

/// Errors decoding a persisted history record.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("schema version mismatch: record has v{file_version}, expected v{expected_version}")]
    SchemaMismatch {
        file_version: u32,
        expected_version: u32,
    },
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },
}

#[derive(Serialize)]
struct Payload<'a> {
    undo: &'a [Snapshot],
    current: Option<&'a Snapshot>,
    redo: &'a VecDeque<Snapshot>,
}

#[derive(Serialize)]
struct RecordOut<'a> {
    schema_version: u32,
    #[serde(flatten)]
    payload: Payload<'a>,
    sha256: String,
}

#[derive(Deserialize)]
struct RecordIn {
    schema_version: u32,
    undo: Vec<Snapshot>,
    current: Option<Snapshot>,
    redo: VecDeque<Snapshot>,
    sha256: String,
}

/// Encode a history state as a single text blob.
pub fn encode(state: &HistoryState) -> Result<String, serde_json::Error> {
    let payload = payload_of(state);
    let sha256 = checksum(&payload)?;
    serde_json::to_string(&RecordOut {
        schema_version: HISTORY_SCHEMA_VERSION,
        payload,
        sha256,
    })
}

/// Decode a blob written by [`encode`].
pub fn decode(text: &str) -> Result<HistoryState, RecordError> {
    let record: RecordIn = serde_json::from_str(text)?;
    if record.schema_version != HISTORY_SCHEMA_VERSION {
        return Err(RecordError::SchemaMismatch {
            file_version: record.schema_version,
            expected_version: HISTORY_SCHEMA_VERSION,
        });
    }
    let state = HistoryState {
        undo: record.undo,
        current: record.current,
        redo: record.redo,
    };
    let actual = checksum(&payload_of(&state))?;
    if actual != record.sha256 {
        return Err(RecordError::ChecksumMismatch {
            expected: record.sha256,
            actual,
        });
    }
    Ok(state)
}

fn payload_of(state: &HistoryState) -> Payload<'_> {
    Payload {
        undo: &state.undo,
        current: state.current.as_ref(),
        redo: &state.redo,
    }
}

fn checksum(payload: &Payload<'_>) -> Result<String, serde_json::Error> {
    let bytes = serde_json::to_vec(payload)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}
