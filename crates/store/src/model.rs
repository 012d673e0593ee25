use rewind_common::{ShapeError, StateTree, to_state_tree};
use rewind_tree::{ComputedField, ComputedRegistry};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Errors raised by a model's own operations.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("invalid params: {0}")]
    InvalidParams(String),
    #[error("{0}")]
    Rejected(String),
}

pub(crate) type ActionFn = Box<dyn Fn(&mut StateTree, &StateTree) -> Result<(), ActionError>>;

/// Definition of an application state: initial tree, named operations and
/// derived fields.
///
/// An operation receives the live state and its params and mutates the
/// state in place. It runs against a working copy, so a failing operation
/// leaves the live state untouched.
pub struct Model {
    pub(crate) initial: StateTree,
    pub(crate) actions: BTreeMap<String, ActionFn>,
    pub(crate) computed: ComputedRegistry,
}

impl Model {
    /// Create a model with the given initial state and no operations.
    pub fn new(initial: StateTree) -> Self {
        Self {
            initial,
            actions: BTreeMap::new(),
            computed: ComputedRegistry::new(),
        }
    }

    /// Create a model whose initial state is the serialized form of `value`.
    pub fn from_serializable<T: Serialize + ?Sized>(value: &T) -> Result<Self, ShapeError> {
        Ok(Self::new(to_state_tree(value)?))
    }

    /// Register a named operation.
    pub fn action<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut StateTree, &StateTree) -> Result<(), ActionError> + 'static,
    {
        self.actions.insert(name.into(), Box::new(f));
        self
    }

    /// Register a derived field.
    pub fn computed(mut self, field: ComputedField) -> Self {
        self.computed.register(field);
        self
    }

    pub fn initial(&self) -> &StateTree {
        &self.initial
    }

    pub fn has_action(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    /// Names of the registered operations, sorted.
    pub fn action_names(&self) -> impl Iterator<Item = &str> {
        self.actions.keys().map(String::as_str)
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("initial", &self.initial)
            .field("actions", &self.actions.keys().collect::<Vec<_>>())
            .field("computed", &self.computed)
            .finish()
    }
}
