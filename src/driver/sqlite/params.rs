use rusqlite::types::Value;

use crate::types::RowValues;

/// Convert a portable value into the value rusqlite binds.
#[must_use]
pub fn row_value_to_sqlite_value(value: &RowValues) -> Value {
    match value {
        RowValues::Int(i) => Value::Integer(*i),
        RowValues::Float(f) => Value::Real(*f),
        RowValues::Text(s) => Value::Text(s.clone()),
        RowValues::Bool(b) => Value::Integer(i64::from(*b)),
        RowValues::Timestamp(dt) => Value::Text(dt.format("%F %T%.f").to_string()),
        RowValues::Guid(g) => Value::Text(g.hyphenated().to_string()),
        RowValues::Null => Value::Null,
        RowValues::JSON(jval) => Value::Text(jval.to_string()),
        RowValues::Blob(bytes) => Value::Blob(bytes.clone()),
    }
}

/// SQLite has five storage classes; each maps onto one `RowValues` variant.
#[must_use]
pub fn sqlite_value_to_row_value(value: Value) -> RowValues {
    match value {
        Value::Null => RowValues::Null,
        Value::Integer(i) => RowValues::Int(i),
        Value::Real(f) => RowValues::Float(f),
        Value::Text(s) => RowValues::Text(s),
        Value::Blob(b) => RowValues::Blob(b),
    }
}

/// Parameters keyed by the placeholder text that names them in SQL (`@0Command3`).
pub(crate) type NamedValues = Vec<(String, Value)>;

pub(crate) fn named_values(params: &[crate::parameter::Parameter]) -> NamedValues {
    params
        .iter()
        .map(|p| (p.placeholder(), row_value_to_sqlite_value(&p.value())))
        .collect()
}
