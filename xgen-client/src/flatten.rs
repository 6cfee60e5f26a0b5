//! Nested JSON → flat telemetry.
//!
//! Inverter replies look like `{"grid": {"v": 230, "w": 100}, "pv": [...]}`.
//! Observers subscribe by dotted key (`grid.v`), so every reply is flattened
//! before dispatch. List elements are addressed by their zero-based index.

use serde_json::{Map, Value};
use std::collections::HashMap;

/// Separator used between path segments.
pub const KEY_SEPARATOR: &str = ".";

/// One decoded reply, keyed by dotted path. Ownership goes to the observer.
pub type Telemetry = HashMap<String, Value>;

/// Flattens a JSON object using the default `.` separator.
pub fn flatten(object: &Map<String, Value>) -> Telemetry {
    flatten_with_separator(object, None, KEY_SEPARATOR)
}

/// Flattens a JSON object below an optional parent key.
///
/// `{"a": [10, {"b": 1}]}` becomes `{"a.0": 10, "a.1.b": 1}`. Empty objects
/// and empty lists contribute no keys.
pub fn flatten_with_separator(
    object: &Map<String, Value>,
    parent_key: Option<&str>,
    separator: &str,
) -> Telemetry {
    let mut items = Telemetry::with_capacity(object.len());
    for (key, value) in object {
        let path = join(parent_key, key, separator);
        collect(value, path, separator, &mut items);
    }
    items
}

fn collect(value: &Value, path: String, separator: &str, items: &mut Telemetry) {
    match value {
        Value::Object(children) => {
            for (key, child) in children {
                collect(child, join(Some(&path), key, separator), separator, items);
            }
        }
        Value::Array(elements) => {
            for (index, element) in elements.iter().enumerate() {
                let key = index.to_string();
                collect(element, join(Some(&path), &key, separator), separator, items);
            }
        }
        scalar => {
            items.insert(path, scalar.clone());
        }
    }
}

fn join(parent_key: Option<&str>, key: &str, separator: &str) -> String {
    match parent_key {
        Some(parent) if !parent.is_empty() => format!("{parent}{separator}{key}"),
        _ => key.to_string(),
    }
}
