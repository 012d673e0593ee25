use rewind_common::{HistoryState, Path, ShapeError, Snapshot, StateTree, validate_shape};
use rewind_persist::{KeyValueStore, KvError, decode, encode};
use rewind_tree::{ComputedRegistry, copy_filtered, find_computed_paths, merge_snapshot};
use std::collections::BTreeSet;

/// Key the history record is stored under unless another is given.
pub const DEFAULT_HISTORY_KEY: &str = "rewind.history";

/// Reserved root key for derived-field metadata. Never enters a snapshot.
pub const COMPUTEDS_KEY: &str = "_computeds";

/// Errors from history operations.
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error(transparent)]
    InvalidStateShape(#[from] ShapeError),
    /// The in-memory history was updated but could not be written out.
    #[error("history not persisted: {0}")]
    PersistenceWriteFailure(#[source] KvError),
    #[error("failed to encode history: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Undo/redo history of filtered snapshots, mirrored to a key-value store.
///
/// The derived-field paths are detected on the first save or reset and
/// reused for the lifetime of the store (or until [`HistoryStore::erase`] /
/// [`HistoryStore::invalidate_computed`]).
pub struct HistoryStore<S> {
    kv: S,
    key: String,
    state: HistoryState,
    computed: Option<BTreeSet<Path>>,
}

impl<S: KeyValueStore> HistoryStore<S> {
    /// Open the history stored under [`DEFAULT_HISTORY_KEY`].
    pub fn open(kv: S) -> Self {
        Self::open_at(kv, DEFAULT_HISTORY_KEY)
    }

    /// Open the history stored under `key`, starting empty if there is none
    /// or it cannot be decoded.
    pub fn open_at(kv: S, key: impl Into<String>) -> Self {
        let key = key.into();
        let state = match kv.get(&key) {
            None => {
                tracing::debug!(key = %key, "no persisted history");
                HistoryState::new()
            }
            Some(text) => match decode(&text) {
                Ok(state) => {
                    tracing::info!(
                        key = %key,
                        undo = state.undo.len(),
                        redo = state.redo.len(),
                        "rehydrated history"
                    );
                    state
                }
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "corrupt persisted history, starting empty");
                    HistoryState::new()
                }
            },
        };
        Self {
            kv,
            key,
            state,
            computed: None,
        }
    }

    /// Record `raw` as the new current snapshot.
    ///
    /// The previous current snapshot moves onto the undo stack and the redo
    /// stack is discarded.
    pub fn save<F>(
        &mut self,
        raw: &StateTree,
        registry: &ComputedRegistry,
        exclude_keys: F,
    ) -> Result<(), HistoryError>
    where
        F: Fn(&str, &Path) -> bool,
    {
        let snap = self.snapshot(raw, registry, exclude_keys)?;
        if let Some(prev) = self.state.current.take() {
            self.state.undo.push(prev);
        }
        self.state.current = Some(snap);
        self.state.redo.clear();
        tracing::debug!(undo = self.state.undo.len(), "saved snapshot");
        self.persist()
    }

    /// Collapse history to a single baseline snapshot of `raw`.
    pub fn reset<F>(
        &mut self,
        raw: &StateTree,
        registry: &ComputedRegistry,
        exclude_keys: F,
    ) -> Result<(), HistoryError>
    where
        F: Fn(&str, &Path) -> bool,
    {
        let snap = self.snapshot(raw, registry, exclude_keys)?;
        self.state.undo.clear();
        self.state.redo.clear();
        self.state.current = Some(snap);
        tracing::info!("history reset");
        self.persist()
    }

    /// Step back one snapshot. Returns the snapshot to merge into live
    /// state, or `None` (without touching storage) if there is nothing to undo.
    pub fn undo(&mut self) -> Result<Option<Snapshot>, HistoryError> {
        let Some(restored) = self.state.undo.pop() else {
            tracing::debug!("nothing to undo");
            return Ok(None);
        };
        if let Some(prev) = self.state.current.replace(restored.clone()) {
            self.state.redo.push_front(prev);
        }
        tracing::debug!(
            undo = self.state.undo.len(),
            redo = self.state.redo.len(),
            "undo"
        );
        self.persist()?;
        Ok(Some(restored))
    }

    /// Step forward one snapshot. Mirror of [`HistoryStore::undo`].
    pub fn redo(&mut self) -> Result<Option<Snapshot>, HistoryError> {
        let Some(restored) = self.state.redo.pop_front() else {
            tracing::debug!("nothing to redo");
            return Ok(None);
        };
        if let Some(prev) = self.state.current.replace(restored.clone()) {
            self.state.undo.push(prev);
        }
        tracing::debug!(
            undo = self.state.undo.len(),
            redo = self.state.redo.len(),
            "redo"
        );
        self.persist()?;
        Ok(Some(restored))
    }

    /// Drop all history, the derived-field cache, and the persisted record.
    pub fn erase(&mut self) {
        self.state.clear();
        self.computed = None;
        self.kv.remove(&self.key);
        tracing::info!(key = %self.key, "history erased");
    }

    /// Forget the cached derived-field paths; the next save detects them again.
    pub fn invalidate_computed(&mut self) {
        self.computed = None;
    }

    pub fn state(&self) -> &HistoryState {
        &self.state
    }

    pub fn current(&self) -> Option<&Snapshot> {
        self.state.current.as_ref()
    }

    /// Number of snapshots that can be undone.
    pub fn undo_count(&self) -> usize {
        self.state.undo.len()
    }

    /// Number of snapshots that can be redone.
    pub fn redo_count(&self) -> usize {
        self.state.redo.len()
    }

    pub fn can_undo(&self) -> bool {
        !self.state.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.state.redo.is_empty()
    }

    /// Derived-field paths detected so far, if any save has run.
    pub fn computed_paths(&self) -> Option<&BTreeSet<Path>> {
        self.computed.as_ref()
    }

    /// Key the history record is stored under.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn kv(&self) -> &S {
        &self.kv
    }

    /// Give back the underlying key-value store.
    pub fn into_inner(self) -> S {
        self.kv
    }

    /// Merge `snapshot` into `live`, leaving every path a save would have
    /// left out of the snapshot at its live value.
    pub fn restore_into<F>(
        &self,
        live: &mut StateTree,
        snapshot: &Snapshot,
        registry: &ComputedRegistry,
        exclude_keys: F,
    ) where
        F: Fn(&str, &Path) -> bool,
    {
        let computed = self.computed.as_ref();
        merge_snapshot(live, snapshot, |_, key, path| {
            excluded(computed, registry, &exclude_keys, key, path)
        });
    }

    fn snapshot<F>(
        &mut self,
        raw: &StateTree,
        registry: &ComputedRegistry,
        exclude_keys: F,
    ) -> Result<Snapshot, HistoryError>
    where
        F: Fn(&str, &Path) -> bool,
    {
        validate_shape(raw)?;
        let computed = match self.computed.take() {
            Some(paths) => paths,
            None => find_computed_paths(raw, registry)?,
        };
        let snap = copy_filtered(raw, |_, key, path| {
            excluded(Some(&computed), registry, &exclude_keys, key, path)
        });
        self.computed = Some(computed);
        Ok(snap)
    }

    fn persist(&mut self) -> Result<(), HistoryError> {
        let text = encode(&self.state)?;
        self.kv
            .set(&self.key, &text)
            .map_err(HistoryError::PersistenceWriteFailure)
    }
}

/// Cached paths cover what existed at detection time; the registry's
/// patterns also catch derived fields on nodes added since.
fn excluded<F>(
    computed: Option<&BTreeSet<Path>>,
    registry: &ComputedRegistry,
    exclude_keys: &F,
    key: &str,
    path: &Path,
) -> bool
where
    F: Fn(&str, &Path) -> bool,
{
    (path.is_root() && key == COMPUTEDS_KEY)
        || registry.is_computed(path, key)
        || computed.is_some_and(|paths| paths.contains(&path.child(key)))
        || exclude_keys(key, path)
}
