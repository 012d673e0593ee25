//! Exclusion configuration for autosave and snapshots.
//!
//! Settings file (YAML):
//! ```text
//! history_key: rewind.history
//! exclude_keys:
//!   - view            # this key at any depth
//!   - todos.*.editing # exactly this path, '*' matches any key or index
//! exclude_operations:
//!   - view/           # operation name prefix
//! ```

use rewind_common::Path;
use rewind_history::DEFAULT_HISTORY_KEY;
use rewind_tree::PathPattern;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Errors loading settings.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

type KeyFilter = Box<dyn Fn(&str, &Path) -> bool>;
type OperationFilter = Box<dyn Fn(&str) -> bool>;

/// What stays out of history.
///
/// `exclude_keys(key, parent_path)` keeps a field out of every snapshot, so
/// undo and redo never touch it. `exclude_operations(name)` stops an
/// operation from triggering autosave. Both default to excluding nothing.
pub struct UndoConfig {
    pub exclude_keys: KeyFilter,
    pub exclude_operations: OperationFilter,
}

impl UndoConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exclude_keys(mut self, f: impl Fn(&str, &Path) -> bool + 'static) -> Self {
        self.exclude_keys = Box::new(f);
        self
    }

    pub fn exclude_operations(mut self, f: impl Fn(&str) -> bool + 'static) -> Self {
        self.exclude_operations = Box::new(f);
        self
    }
}

impl Default for UndoConfig {
    fn default() -> Self {
        Self {
            exclude_keys: Box::new(|_, _| false),
            exclude_operations: Box::new(|_| false),
        }
    }
}

impl fmt::Debug for UndoConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UndoConfig").finish_non_exhaustive()
    }
}

/// Declarative form of [`UndoConfig`], loadable from YAML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UndoSettings {
    /// Key the history record is stored under.
    pub history_key: String,
    /// Bare key names (excluded at any depth) or dotted path patterns.
    pub exclude_keys: Vec<String>,
    /// Operation name prefixes that do not autosave.
    pub exclude_operations: Vec<String>,
}

impl Default for UndoSettings {
    fn default() -> Self {
        Self {
            history_key: DEFAULT_HISTORY_KEY.to_string(),
            exclude_keys: Vec::new(),
            exclude_operations: Vec::new(),
        }
    }
}

impl UndoSettings {
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Read settings from a YAML file.
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&text)
    }

    /// Build the predicates these settings describe.
    pub fn to_config(&self) -> UndoConfig {
        let mut names = Vec::new();
        let mut patterns = Vec::new();
        for entry in &self.exclude_keys {
            if entry.contains('.') || entry == "*" {
                patterns.push(PathPattern::parse(entry));
            } else {
                names.push(entry.clone());
            }
        }
        let prefixes = self.exclude_operations.clone();

        UndoConfig::new()
            .exclude_keys(move |key, path| {
                names.iter().any(|n| n == key) || {
                    let full = path.child(key);
                    patterns.iter().any(|p| p.matches(&full))
                }
            })
            .exclude_operations(move |name| prefixes.iter().any(|p| name.starts_with(p.as_str())))
    }
}
