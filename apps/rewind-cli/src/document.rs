//! The editable document: a JSON object with `replace`, `set` and `remove`
//! operations addressed by dotted paths.

use rewind_common::{Path, StateTree};
use rewind_store::{ActionError, Model};
use serde_json::{Map, Value};

pub const REPLACE: &str = "replace";
pub const SET: &str = "set";
pub const REMOVE: &str = "remove";

/// Model for a free-form document starting from `initial`.
pub fn document_model(initial: StateTree) -> Model {
    Model::new(initial)
        .action(REPLACE, |state, params| {
            if !params.is_object() {
                return Err(ActionError::InvalidParams("document must be a JSON object".into()));
            }
            *state = params.clone();
            Ok(())
        })
        .action(SET, |state, params| {
            let path = path_param(params)?;
            let value = params.get("value").cloned().unwrap_or(Value::Null);
            set_at(state, &path, value)
        })
        .action(REMOVE, |state, params| {
            let path = path_param(params)?;
            remove_at(state, &path)
        })
}

/// Parse a command-line value: JSON if it parses, otherwise a plain string.
pub fn parse_value(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

fn path_param(params: &Value) -> Result<Path, ActionError> {
    let dotted = params
        .get("path")
        .and_then(Value::as_str)
        .ok_or_else(|| ActionError::InvalidParams("missing \"path\"".into()))?;
    let path = Path::parse(dotted);
    if path.is_root() {
        return Err(ActionError::InvalidParams(
            "path must name a field; use replace for the whole document".into(),
        ));
    }
    Ok(path)
}

fn set_at(state: &mut StateTree, path: &Path, value: Value) -> Result<(), ActionError> {
    let Some((last, parents)) = path.keys().split_last() else {
        return Err(ActionError::InvalidParams("empty path".into()));
    };
    let mut node = state;
    for key in parents {
        node = match node {
            Value::Object(map) => map
                .entry(key.clone())
                .or_insert_with(|| Value::Object(Map::new())),
            Value::Array(items) => {
                let i = index(key, items.len())
                    .ok_or_else(|| ActionError::Rejected(format!("no element {key} in {path}")))?;
                &mut items[i]
            }
            _ => return Err(ActionError::Rejected(format!("{key} in {path} is not a container"))),
        };
    }
    match node {
        Value::Object(map) => {
            map.insert(last.clone(), value);
            Ok(())
        }
        Value::Array(items) => match index(last, items.len() + 1) {
            Some(i) if i == items.len() => {
                items.push(value);
                Ok(())
            }
            Some(i) => {
                items[i] = value;
                Ok(())
            }
            None => Err(ActionError::Rejected(format!("no element {last} in {path}"))),
        },
        _ => Err(ActionError::Rejected(format!("parent of {path} is not a container"))),
    }
}

fn remove_at(state: &mut StateTree, path: &Path) -> Result<(), ActionError> {
    let missing = || ActionError::Rejected(format!("{path} does not exist"));
    let parent = path.parent().ok_or_else(missing)?;
    let last = path.last().ok_or_else(missing)?;
    match parent.resolve_mut(state) {
        Some(Value::Object(map)) => map.remove(last).map(|_| ()).ok_or_else(missing),
        Some(Value::Array(items)) => {
            let i = index(last, items.len()).ok_or_else(missing)?;
            items.remove(i);
            Ok(())
        }
        _ => Err(missing()),
    }
}

/// `key` as an index below `len`.
fn index(key: &str, len: usize) -> Option<usize> {
    key.parse::<usize>().ok().filter(|&i| i < len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn set_creates_intermediate_objects() {
        let mut doc = json!({});
        set_at(&mut doc, &Path::parse("a.b.c"), json!(1)).unwrap();
        assert_eq!(doc, json!({"a": {"b": {"c": 1}}}));
    }

    #[test]
    fn set_into_arrays() {
        let mut doc = json!({"xs": [1, 2]});
        set_at(&mut doc, &Path::parse("xs.0"), json!(9)).unwrap();
        set_at(&mut doc, &Path::parse("xs.2"), json!(3)).unwrap();
        assert_eq!(doc, json!({"xs": [9, 2, 3]}));
        assert!(set_at(&mut doc, &Path::parse("xs.7"), json!(0)).is_err());
    }

    #[test]
    fn set_through_scalar_fails() {
        let mut doc = json!({"a": 1});
        assert!(set_at(&mut doc, &Path::parse("a.b"), json!(0)).is_err());
    }

    #[test]
    fn remove_fields_and_elements() {
        let mut doc = json!({"a": {"b": 1, "c": 2}, "xs": [1, 2, 3]});
        remove_at(&mut doc, &Path::parse("a.b")).unwrap();
        remove_at(&mut doc, &Path::parse("xs.1")).unwrap();
        assert_eq!(doc, json!({"a": {"c": 2}, "xs": [1, 3]}));
        assert!(remove_at(&mut doc, &Path::parse("a.zzz")).is_err());
    }

    #[test]
    fn parse_value_falls_back_to_string() {
        assert_eq!(parse_value("42"), json!(42));
        assert_eq!(parse_value("{\"a\":true}"), json!({"a": true}));
        assert_eq!(parse_value("hello"), json!("hello"));
    }
}
