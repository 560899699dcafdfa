//! Conversion between model values and SQLite storage values
//!
//! Booleans are stored as integers, timestamps as RFC 3339 text and uuids as
//! text. Reads are guided by the declared field type so typed models
//! round-trip.

use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};
use strata_core::model::{FieldType, Value};

/// Borrowing adapter binding a `Value` as a statement parameter
pub struct SqlValue<'a>(pub &'a Value);

impl ToSql for SqlValue<'_> {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self.0 {
            Value::Null => ToSqlOutput::Borrowed(ValueRef::Null),
            Value::Integer(i) => ToSqlOutput::Borrowed(ValueRef::Integer(*i)),
            Value::Real(f) => ToSqlOutput::Borrowed(ValueRef::Real(*f)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
            Value::Bool(b) => ToSqlOutput::Borrowed(ValueRef::Integer(i64::from(*b))),
        })
    }
}

/// Read a column value, using the declared type where the storage class is ambiguous
pub fn from_sql(raw: ValueRef<'_>, field_type: Option<&FieldType>) -> Value {
    match raw {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => match field_type {
            Some(FieldType::Boolean) => Value::Bool(i != 0),
            Some(FieldType::Real) | Some(FieldType::Decimal { .. }) => Value::Real(i as f64),
            _ => Value::Integer(i),
        },
        ValueRef::Real(f) => Value::Real(f),
        ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Blob(b.to_vec()),
    }
}

/// Normalise a value about to be written into a column of `field_type`
pub fn to_storage(value: &Value, field_type: &FieldType) -> Value {
    match (field_type, value) {
        (FieldType::Timestamp, Value::Text(s)) => chrono::DateTime::parse_from_rfc3339(s)
            .map(|ts| Value::Text(ts.with_timezone(&chrono::Utc).to_rfc3339()))
            .unwrap_or_else(|_| value.clone()),
        (FieldType::Uuid, Value::Text(s)) => uuid::Uuid::parse_str(s)
            .map(|u| Value::Text(u.hyphenated().to_string()))
            .unwrap_or_else(|_| value.clone()),
        _ => value.clone(),
    }
}
