//! Untyped row representation shared by both stores

use serde_json::{Map, Value};

/// A row keyed by column name.
///
/// Local rows use camelCase keys, cloud rows snake_case keys; the
/// [`SchemaMapper`](crate::sync::SchemaMapper) translates between them.
pub type Row = Map<String, Value>;

/// Read a column as non-empty text.
pub fn text_field<'a>(row: &'a Row, key: &str) -> Option<&'a str> {
    match row.get(key) {
        Some(Value::String(value)) if !value.trim().is_empty() => Some(value.as_str()),
        _ => None,
    }
}

/// Read the `id` column, accepting numeric ids from loosely typed sources.
pub fn row_id(row: &Row) -> Option<String> {
    match row.get("id") {
        Some(Value::String(value)) if !value.trim().is_empty() => Some(value.clone()),
        Some(Value::Number(value)) => Some(value.to_string()),
        _ => None,
    }
}
