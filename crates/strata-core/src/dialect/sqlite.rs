use super::{DdlHelper, Probe};
use crate::model::FieldType;
use crate::schema::ObjectKind;

#[derive(Debug, Clone, Copy, Default)]
pub struct Sqlite;

impl DdlHelper for Sqlite {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn type_name(&self, ty: &FieldType) -> String {
        match ty {
            FieldType::Integer | FieldType::BigInt | FieldType::Boolean => "INTEGER",
            FieldType::Real => "REAL",
            FieldType::Decimal { .. } => "NUMERIC",
            FieldType::Text(_) | FieldType::Timestamp | FieldType::Uuid => "TEXT",
            FieldType::Blob => "BLOB",
        }
        .to_string()
    }

    fn identity_clause(&self) -> &'static str {
        "AUTOINCREMENT"
    }

    // AUTOINCREMENT is only accepted on an INTEGER PRIMARY KEY column.
    fn identity_is_primary_key(&self) -> bool {
        true
    }

    fn existence_probe(&self, kind: ObjectKind, name: &str) -> Probe {
        Probe {
            sql: "SELECT 1 FROM sqlite_master WHERE type = ?1 AND name = ?2".to_string(),
            params: vec![kind.as_str().to_string(), name.to_string()],
        }
    }

    fn column_probe(&self, table: &str, column: &str) -> Probe {
        Probe {
            sql: "SELECT 1 FROM pragma_table_info(?1) WHERE name = ?2".to_string(),
            params: vec![table.to_string(), column.to_string()],
        }
    }
}
