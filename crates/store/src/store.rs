use crate::config::UndoConfig;
use crate::model::{ActionError, ActionFn, Model};
use rewind_common::{Snapshot, StateTree};
use rewind_history::{HistoryError, HistoryStore};
use rewind_persist::KeyValueStore;
use rewind_tree::ComputedRegistry;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;

/// Built-in operation: save the live state to history.
pub const SAVE: &str = "undo/save";
/// Built-in operation: collapse history to the live state.
pub const RESET: &str = "undo/reset";
/// Built-in operation: restore the previous snapshot.
pub const UNDO: &str = "undo/undo";
/// Built-in operation: restore the next snapshot.
pub const REDO: &str = "undo/redo";

/// Errors from dispatching an operation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("unknown action: {0}")]
    UnknownAction(String),
    #[error("action {name} failed: {source}")]
    Action {
        name: String,
        #[source]
        source: ActionError,
    },
    #[error(transparent)]
    History(#[from] HistoryError),
}

/// Live application state with undo/redo.
///
/// Wraps a [`Model`] and a [`HistoryStore`]. Every dispatched model
/// operation is followed, in the same call, by a save of the resulting
/// state unless the configuration excludes that operation.
pub struct Store<S> {
    state: StateTree,
    actions: BTreeMap<String, ActionFn>,
    computed: ComputedRegistry,
    history: HistoryStore<S>,
    config: UndoConfig,
}

impl<S: KeyValueStore> Store<S> {
    /// Create a store starting from the model's initial state.
    ///
    /// Nothing is saved yet; call [`Store::save`] or [`Store::reset`] to
    /// establish a baseline, or [`Store::restore_current`] to resume a
    /// rehydrated history.
    pub fn new(model: Model, history: HistoryStore<S>, config: UndoConfig) -> Self {
        let Model {
            initial,
            actions,
            computed,
        } = model;
        let mut state = initial;
        computed.apply(&mut state);
        Self {
            state,
            actions,
            computed,
            history,
            config,
        }
    }

    /// Run a named operation.
    ///
    /// The built-in names [`SAVE`], [`RESET`], [`UNDO`] and [`REDO`] map to
    /// the history operations and never autosave.
    pub fn dispatch(&mut self, name: &str, params: &StateTree) -> Result<(), StoreError> {
        match name {
            SAVE => return self.save(),
            RESET => return self.reset(),
            UNDO => return self.undo().map(|_| ()),
            REDO => return self.redo().map(|_| ()),
            _ => {}
        }

        let action = self
            .actions
            .get(name)
            .ok_or_else(|| StoreError::UnknownAction(name.to_string()))?;
        let mut next = self.state.clone();
        action(&mut next, params).map_err(|source| StoreError::Action {
            name: name.to_string(),
            source,
        })?;
        self.computed.apply(&mut next);
        self.state = next;

        if (self.config.exclude_operations)(name) {
            tracing::debug!(action = name, "autosave skipped");
            return Ok(());
        }
        tracing::debug!(action = name, "autosave");
        self.save()
    }

    /// Save the live state as the new current snapshot.
    pub fn save(&mut self) -> Result<(), StoreError> {
        self.history
            .save(&self.state, &self.computed, &*self.config.exclude_keys)?;
        Ok(())
    }

    /// Collapse history to the live state.
    pub fn reset(&mut self) -> Result<(), StoreError> {
        self.history
            .reset(&self.state, &self.computed, &*self.config.exclude_keys)?;
        Ok(())
    }

    /// Undo one step. Returns whether anything was restored.
    pub fn undo(&mut self) -> Result<bool, StoreError> {
        let result = self.history.undo();
        self.apply_restore(result)
    }

    /// Redo one step. Returns whether anything was restored.
    pub fn redo(&mut self) -> Result<bool, StoreError> {
        let result = self.history.redo();
        self.apply_restore(result)
    }

    /// Merge the history's current snapshot into live state, if there is one.
    pub fn restore_current(&mut self) -> bool {
        let Some(current) = self.history.current().cloned() else {
            return false;
        };
        self.merge(&current);
        true
    }

    /// Drop all history, including its persisted copy. Live state is kept.
    pub fn erase_history(&mut self) {
        self.history.erase();
    }

    pub fn state(&self) -> &StateTree {
        &self.state
    }

    /// Deserialize the live state into a typed value.
    pub fn state_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.state)
    }

    pub fn history(&self) -> &HistoryStore<S> {
        &self.history
    }

    pub fn config(&self) -> &UndoConfig {
        &self.config
    }

    fn apply_restore(
        &mut self,
        result: Result<Option<Snapshot>, HistoryError>,
    ) -> Result<bool, StoreError> {
        match result {
            Ok(Some(snapshot)) => {
                self.merge(&snapshot);
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(HistoryError::PersistenceWriteFailure(e)) => {
                // The history moved in memory; keep live state in step with it.
                self.restore_current();
                Err(HistoryError::PersistenceWriteFailure(e).into())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn merge(&mut self, snapshot: &Snapshot) {
        self.history.restore_into(
            &mut self.state,
            snapshot,
            &self.computed,
            &*self.config.exclude_keys,
        );
        self.computed.apply(&mut self.state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UndoSettings;
    use rewind_common::Path;
    use rewind_persist::{FileStore, KvError, MemoryStore};
    use rewind_tree::ComputedField;
    use serde_json::{Value, json};

    fn bump(state: &mut StateTree, key: &str, by: i64) {
        state[key] = json!(state[key].as_i64().unwrap_or(0) + by);
    }

    fn counter_model() -> Model {
        Model::new(json!({"count": 0})).action("increment", |state, _| {
            bump(state, "count", 1);
            Ok(())
        })
    }

    fn view_model() -> Model {
        Model::new(json!({"count": 0, "view": 7}))
            .action("increment", |state, _| {
                bump(state, "count", 1);
                Ok(())
            })
            .action("doubleView", |state, _| {
                state["view"] = json!(state["view"].as_i64().unwrap_or(0) * 2);
                Ok(())
            })
            .computed(ComputedField::root("countSquared", |state| {
                let n = state["count"].as_i64().unwrap_or(0);
                json!(n * n)
            }))
    }

    fn view_config() -> UndoConfig {
        UndoConfig::new()
            .exclude_keys(|key, _| key == "view")
            .exclude_operations(|name| name.starts_with("doubleView"))
    }

    /// A store with an initial saved baseline.
    fn started<S: KeyValueStore>(model: Model, kv: S, config: UndoConfig) -> Store<S> {
        let mut store = Store::new(model, HistoryStore::open(kv), config);
        store.dispatch(SAVE, &Value::Null).unwrap();
        store
    }

    fn count<S: KeyValueStore>(store: &Store<S>) -> i64 {
        store.state()["count"].as_i64().unwrap()
    }

    #[test]
    fn save_an_action() {
        let mut store = started(counter_model(), MemoryStore::new(), UndoConfig::new());
        store.dispatch("increment", &Value::Null).unwrap();
        assert_eq!(store.history().undo_count(), 1);
        assert_eq!(store.history().current(), Some(&json!({"count": 1})));
    }

    #[test]
    fn undo_restores_previous_value() {
        let mut store = started(counter_model(), MemoryStore::new(), UndoConfig::new());
        store.dispatch("increment", &Value::Null).unwrap();
        assert!(store.undo().unwrap());
        assert_eq!(count(&store), 0);
        assert_eq!(store.history().current(), Some(&json!({"count": 0})));
    }

    #[test]
    fn undo_two_actions() {
        let mut store = started(counter_model(), MemoryStore::new(), UndoConfig::new());
        store.dispatch("increment", &Value::Null).unwrap();
        store.dispatch("increment", &Value::Null).unwrap();
        store.dispatch(UNDO, &Value::Null).unwrap();
        store.dispatch(UNDO, &Value::Null).unwrap();
        assert_eq!(count(&store), 0);
        assert!(!store.history().can_undo());
    }

    #[test]
    fn redo_after_undo() {
        let mut store = started(counter_model(), MemoryStore::new(), UndoConfig::new());
        store.dispatch("increment", &Value::Null).unwrap();
        store.undo().unwrap();
        assert!(store.redo().unwrap());
        assert_eq!(count(&store), 1);
        assert_eq!(store.history().current(), Some(&json!({"count": 1})));
    }

    #[test]
    fn undo_twice_then_redo() {
        let mut store = started(counter_model(), MemoryStore::new(), UndoConfig::new());
        for _ in 0..3 {
            store.dispatch("increment", &Value::Null).unwrap();
        }
        assert_eq!(count(&store), 3);
        store.undo().unwrap();
        store.undo().unwrap();
        assert_eq!(count(&store), 1);
        store.dispatch(REDO, &Value::Null).unwrap();
        assert_eq!(count(&store), 2);
        assert_eq!(store.history().undo_count(), 2);
        assert_eq!(store.history().redo_count(), 1);
    }

    #[test]
    fn undo_and_redo_on_empty_history() {
        let mut store = Store::new(
            counter_model(),
            HistoryStore::open(MemoryStore::new()),
            UndoConfig::new(),
        );
        assert!(!store.undo().unwrap());
        assert!(!store.redo().unwrap());
        assert_eq!(count(&store), 0);
    }

    #[test]
    fn reset_clears_history() {
        let mut store = started(counter_model(), MemoryStore::new(), UndoConfig::new());
        store.dispatch("increment", &Value::Null).unwrap();
        store.dispatch("increment", &Value::Null).unwrap();
        store.dispatch(RESET, &Value::Null).unwrap();
        assert_eq!(count(&store), 2);
        assert_eq!(store.history().undo_count(), 0);
        assert_eq!(store.history().redo_count(), 0);
        assert_eq!(store.history().current(), Some(&json!({"count": 2})));

        store.dispatch("increment", &Value::Null).unwrap();
        assert_eq!(count(&store), 3);
        store.undo().unwrap();
        assert_eq!(count(&store), 2);
        assert!(!store.undo().unwrap());
    }

    #[test]
    fn views_are_not_saved() {
        let store = started(view_model(), MemoryStore::new(), view_config());
        let current = store.history().current().unwrap();
        assert!(current.get("view").is_none());
        assert!(current.get("countSquared").is_none());
        assert_eq!(current, &json!({"count": 0}));
    }

    #[test]
    fn views_survive_undo() {
        let mut store = started(view_model(), MemoryStore::new(), view_config());
        store.dispatch("increment", &Value::Null).unwrap();
        store.dispatch("doubleView", &Value::Null).unwrap();
        assert_eq!(store.state()["view"], json!(14));

        store.undo().unwrap();
        assert_eq!(count(&store), 0);
        assert_eq!(store.state()["view"], json!(14));
    }

    #[test]
    fn view_actions_are_not_saved() {
        let mut store = started(view_model(), MemoryStore::new(), view_config());
        store.dispatch("doubleView", &Value::Null).unwrap();
        assert_eq!(store.history().undo_count(), 0);
        assert_eq!(store.state()["view"], json!(14));
    }

    #[test]
    fn computed_values_are_derived_not_saved() {
        let mut store = started(view_model(), MemoryStore::new(), view_config());
        assert_eq!(store.state()["countSquared"], json!(0));
        store.dispatch("increment", &Value::Null).unwrap();
        store.dispatch("increment", &Value::Null).unwrap();
        assert_eq!(store.state()["countSquared"], json!(4));
        assert!(store.history().current().unwrap().get("countSquared").is_none());

        store.undo().unwrap();
        assert_eq!(store.state()["countSquared"], json!(1));
        assert!(
            store
                .history()
                .computed_paths()
                .unwrap()
                .contains(&Path::parse("countSquared"))
        );
    }

    #[test]
    fn excluded_value_untouched_by_any_sequence() {
        let mut store = started(view_model(), MemoryStore::new(), view_config());
        store.dispatch("doubleView", &Value::Null).unwrap();
        for op in ["increment", "increment", UNDO, REDO, UNDO, UNDO, REDO, SAVE, UNDO] {
            store.dispatch(op, &Value::Null).unwrap();
            assert_eq!(store.state()["view"], json!(14), "after {op}");
        }
    }

    #[test]
    fn nested_excluded_paths_survive_restore() {
        let model = Model::new(json!({"todos": [{"title": "a", "editing": false}]})).action(
            "rename",
            |state, params| {
                let title = params
                    .as_str()
                    .ok_or_else(|| ActionError::InvalidParams("expected a title".into()))?;
                state["todos"][0]["title"] = json!(title);
                state["todos"][0]["editing"] = json!(true);
                Ok(())
            },
        );
        let config = UndoSettings {
            exclude_keys: vec!["todos.*.editing".into()],
            ..UndoSettings::default()
        }
        .to_config();
        let mut store = started(model, MemoryStore::new(), config);
        store.dispatch("rename", &json!("b")).unwrap();
        store.undo().unwrap();
        assert_eq!(
            store.state(),
            &json!({"todos": [{"title": "a", "editing": true}]})
        );
    }

    #[test]
    fn derived_fields_on_added_elements_not_saved() {
        let model = Model::new(json!({"lines": [{"qty": 2}]}))
            .action("add", |state, params| {
                let qty = params
                    .as_i64()
                    .ok_or_else(|| ActionError::InvalidParams("expected a quantity".into()))?;
                if let Some(lines) = state["lines"].as_array_mut() {
                    lines.push(json!({ "qty": qty }));
                }
                Ok(())
            })
            .computed(ComputedField::new("lines.*", "total", |line| {
                json!(line["qty"].as_i64().unwrap_or(0) * 10)
            }));
        let mut store = started(model, MemoryStore::new(), UndoConfig::new());
        store.dispatch("add", &json!(3)).unwrap();

        assert_eq!(store.state()["lines"][1]["total"], json!(30));
        assert_eq!(
            store.history().current(),
            Some(&json!({"lines": [{"qty": 2}, {"qty": 3}]}))
        );
        store.undo().unwrap();
        assert_eq!(store.state(), &json!({"lines": [{"qty": 2, "total": 20}]}));
    }

    fn xs_model() -> Model {
        Model::new(json!({"xs": [1, 2, 3]}))
            .action("bump", |state, _| {
                state["xs"][0] = json!(state["xs"][0].as_i64().unwrap_or(0) + 1);
                state["xs"][2] = json!(state["xs"][2].as_i64().unwrap_or(0) + 1);
                Ok(())
            })
            .action("poke", |state, params| {
                state["xs"][1] = params.clone();
                Ok(())
            })
    }

    fn second_xs() -> UndoConfig {
        UndoConfig::new().exclude_keys(|key, path| key == "1" && *path == Path::parse("xs"))
    }

    #[test]
    fn excluded_array_element_keeps_its_slot() {
        let mut store = started(xs_model(), MemoryStore::new(), second_xs());
        store.dispatch("bump", &Value::Null).unwrap();
        assert_eq!(store.history().current(), Some(&json!({"xs": [2, null, 4]})));

        store.undo().unwrap();
        assert_eq!(store.state(), &json!({"xs": [1, 2, 3]}));
    }

    #[test]
    fn excluded_array_element_untouched_by_undo_redo() {
        let mut store = started(xs_model(), MemoryStore::new(), second_xs());
        store.dispatch("bump", &Value::Null).unwrap();
        store.dispatch("poke", &json!(20)).unwrap();
        for op in [UNDO, UNDO, REDO, REDO, UNDO] {
            store.dispatch(op, &Value::Null).unwrap();
            assert_eq!(store.state()["xs"][1], json!(20), "after {op}");
        }
        assert_eq!(store.state(), &json!({"xs": [2, 20, 4]}));
    }

    #[test]
    fn unknown_action_rejected() {
        let mut store = started(counter_model(), MemoryStore::new(), UndoConfig::new());
        let err = store.dispatch("decrement", &Value::Null).unwrap_err();
        assert!(matches!(err, StoreError::UnknownAction(name) if name == "decrement"));
    }

    #[test]
    fn failing_action_leaves_state_and_history() {
        let model = counter_model().action("explode", |state, _| {
            bump(state, "count", 100);
            Err(ActionError::Rejected("boom".into()))
        });
        let mut store = started(model, MemoryStore::new(), UndoConfig::new());
        let err = store.dispatch("explode", &Value::Null).unwrap_err();
        assert!(matches!(err, StoreError::Action { .. }));
        assert_eq!(count(&store), 0);
        assert_eq!(store.history().undo_count(), 0);
    }

    #[test]
    fn write_failure_keeps_live_state_in_step() {
        let model = counter_model().action("grow", |state, _| {
            state["blob"] = json!("x".repeat(400));
            Ok(())
        });
        let mut store = started(model, MemoryStore::with_quota(400), UndoConfig::new());
        store.dispatch("increment", &Value::Null).unwrap();

        let err = store.dispatch("grow", &Value::Null).unwrap_err();
        assert!(matches!(
            err,
            StoreError::History(HistoryError::PersistenceWriteFailure(KvError::QuotaExceeded { .. }))
        ));
        assert_eq!(store.history().undo_count(), 2);

        // The redo stack now carries the oversized snapshot, so this write
        // fails too, but live state still follows the in-memory history.
        let err = store.undo().unwrap_err();
        assert!(matches!(
            err,
            StoreError::History(HistoryError::PersistenceWriteFailure(_))
        ));
        assert_eq!(store.history().current(), Some(&json!({"count": 1})));
        assert_eq!(count(&store), 1);
    }

    #[test]
    fn typed_state_view() {
        #[derive(serde::Deserialize)]
        struct Counter {
            count: i64,
        }
        let mut store = started(counter_model(), MemoryStore::new(), UndoConfig::new());
        store.dispatch("increment", &Value::Null).unwrap();
        assert_eq!(store.state_as::<Counter>().unwrap().count, 1);
    }

    #[test]
    fn history_resumes_from_file_store() {
        let tmp = tempfile::tempdir().unwrap();
        {
            let kv = FileStore::open(tmp.path()).unwrap();
            let mut store = started(counter_model(), kv, UndoConfig::new());
            store.dispatch("increment", &Value::Null).unwrap();
            store.dispatch("increment", &Value::Null).unwrap();
        }

        let kv = FileStore::open(tmp.path()).unwrap();
        let mut store = Store::new(counter_model(), HistoryStore::open(kv), UndoConfig::new());
        assert!(store.restore_current());
        assert_eq!(count(&store), 2);
        store.undo().unwrap();
        assert_eq!(count(&store), 1);
    }

    #[test]
    fn erase_history_keeps_live_state() {
        let mut store = started(counter_model(), MemoryStore::new(), UndoConfig::new());
        store.dispatch("increment", &Value::Null).unwrap();
        store.erase_history();
        assert_eq!(count(&store), 1);
        assert!(store.history().state().is_empty());
        assert!(!store.undo().unwrap());
    }
}
