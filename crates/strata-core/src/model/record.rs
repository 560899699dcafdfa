//! In-memory records keyed by column name

use crate::errors::{Result, StrataError};
use crate::model::Value;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;

/// A row of named values.
///
/// Records are the untyped currency of the persistence engine; typed models
/// cross into and out of them through serde.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    values: BTreeMap<String, Value>,
}

static NULL: Value = Value::Null;

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(field, value);
        self
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(field.into(), value.into());
    }

    /// Value of a field, `Null` when the field was never set
    pub fn get(&self, field: &str) -> &Value {
        self.values.get(field).unwrap_or(&NULL)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.values.contains_key(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Values of the given fields, in the given order
    pub fn key(&self, fields: &[String]) -> Vec<Value> {
        fields.iter().map(|f| self.get(f).clone()).collect()
    }

    /// Build a record from any serializable struct.
    ///
    /// # Errors
    ///
    /// `Serialization` if the model does not serialize to a JSON object.
    pub fn from_model<T: Serialize>(model: &T) -> Result<Self> {
        let json = serde_json::to_value(model).map_err(|e| StrataError::Serialization {
            message: e.to_string(),
        })?;
        match json {
            serde_json::Value::Object(map) => Ok(Self {
                values: map
                    .into_iter()
                    .map(|(k, v)| (k, Value::from_json(v)))
                    .collect(),
            }),
            other => Err(StrataError::Serialization {
                message: format!("model must serialize to an object, got {}", other),
            }),
        }
    }

    /// Deserialize the record into a typed model
    pub fn to_model<T: DeserializeOwned>(&self) -> Result<T> {
        let map: serde_json::Map<String, serde_json::Value> = self
            .values
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect();
        serde_json::from_value(serde_json::Value::Object(map)).map_err(|e| {
            StrataError::Serialization {
                message: e.to_string(),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Order {
        id: Option<i64>,
        customer: String,
        paid: bool,
    }

    #[test]
    fn test_model_round_trip() {
        let order = Order {
            id: None,
            customer: "ada".to_string(),
            paid: true,
        };
        let record = Record::from_model(&order).unwrap();
        assert!(record.get("id").is_null());
        assert_eq!(record.get("customer"), &Value::Text("ada".to_string()));

        let back: Order = record.with("id", 5).to_model().unwrap();
        assert_eq!(back.id, Some(5));
    }

    #[test]
    fn test_non_object_model_is_rejected() {
        let err = Record::from_model(&42).unwrap_err();
        assert!(matches!(err, StrataError::Serialization { .. }));
    }

    #[test]
    fn test_key_preserves_field_order() {
        let record = Record::new().with("b", 2).with("a", 1);
        let key = record.key(&["b".to_string(), "a".to_string(), "c".to_string()]);
        assert_eq!(key, vec![Value::Integer(2), Value::Integer(1), Value::Null]);
    }
}
