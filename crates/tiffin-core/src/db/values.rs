//! Conversions between libSQL values and JSON rows

use libsql::{Rows, Value as SqlValue};
use serde_json::{Number, Value};

use crate::error::Result;
use crate::models::Row;

/// Bind optional text, storing `NULL` when absent.
pub fn text_or_null(value: Option<&str>) -> SqlValue {
    value.map_or(SqlValue::Null, |text| SqlValue::Text(text.to_string()))
}

/// Read a text column; `NULL` and non-text values yield `None`.
pub fn value_to_text(value: SqlValue) -> Option<String> {
    match value {
        SqlValue::Text(text) => Some(text),
        _ => None,
    }
}

/// Convert a JSON value into a bindable parameter.
pub fn json_to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(flag) => SqlValue::Integer(i64::from(*flag)),
        Value::Number(number) => number.as_i64().map_or_else(
            || number.as_f64().map_or(SqlValue::Null, SqlValue::Real),
            SqlValue::Integer,
        ),
        Value::String(text) => SqlValue::Text(text.clone()),
        Value::Array(_) | Value::Object(_) => SqlValue::Text(value.to_string()),
    }
}

/// Convert a stored value into JSON.
pub fn sql_to_json(value: SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(number) => Value::Number(number.into()),
        SqlValue::Real(number) => Number::from_f64(number).map_or(Value::Null, Value::Number),
        SqlValue::Text(text) => Value::String(text),
        SqlValue::Blob(bytes) => Value::String(String::from_utf8_lossy(&bytes).into_owned()),
    }
}

/// Drain a result set into rows keyed by column name.
pub async fn collect_rows(mut rows: Rows) -> Result<Vec<Row>> {
    let count = rows.column_count();
    let names: Vec<String> = (0..count)
        .map(|index| rows.column_name(index).unwrap_or_default().to_string())
        .collect();

    let mut collected = Vec::new();
    while let Some(row) = rows.next().await? {
        let mut record = Row::new();
        for (index, name) in (0..count).zip(&names) {
            record.insert(name.clone(), sql_to_json(row.get_value(index)?));
        }
        collected.push(record);
    }
    Ok(collected)
}
