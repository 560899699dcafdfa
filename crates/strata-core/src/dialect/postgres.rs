use super::{DdlHelper, Probe};
use crate::model::FieldType;
use crate::schema::ObjectKind;

#[derive(Debug, Clone, Copy, Default)]
pub struct Postgres;

impl DdlHelper for Postgres {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn type_name(&self, ty: &FieldType) -> String {
        match ty {
            FieldType::Integer => "INTEGER".to_string(),
            FieldType::BigInt => "BIGINT".to_string(),
            FieldType::Real => "DOUBLE PRECISION".to_string(),
            FieldType::Decimal { precision, scale } => format!("NUMERIC({},{})", precision, scale),
            FieldType::Text(Some(n)) => format!("VARCHAR({})", n),
            FieldType::Text(None) => "TEXT".to_string(),
            FieldType::Boolean => "BOOLEAN".to_string(),
            FieldType::Blob => "BYTEA".to_string(),
            FieldType::Timestamp => "TIMESTAMPTZ".to_string(),
            FieldType::Uuid => "UUID".to_string(),
        }
    }

    fn identity_clause(&self) -> &'static str {
        "GENERATED BY DEFAULT AS IDENTITY"
    }

    fn placeholder(&self, index: usize) -> String {
        format!("${}", index)
    }

    fn add_column(&self, table: &str, column_definition: &str) -> String {
        format!(
            "ALTER TABLE {} ADD COLUMN IF NOT EXISTS {}",
            self.quote(table),
            column_definition
        )
    }

    fn drop_column(&self, table: &str, column: &str) -> String {
        format!(
            "ALTER TABLE {} DROP COLUMN IF EXISTS {}",
            self.quote(table),
            self.quote(column)
        )
    }

    fn existence_probe(&self, kind: ObjectKind, name: &str) -> Probe {
        let sql = match kind {
            ObjectKind::Table => {
                "SELECT 1 FROM information_schema.tables \
                 WHERE table_schema = current_schema() AND table_name = $1 \
                 AND table_type = 'BASE TABLE'"
            }
            ObjectKind::View => {
                "SELECT 1 FROM information_schema.views \
                 WHERE table_schema = current_schema() AND table_name = $1"
            }
        };
        Probe {
            sql: sql.to_string(),
            params: vec![name.to_string()],
        }
    }

    fn column_probe(&self, table: &str, column: &str) -> Probe {
        Probe {
            sql: "SELECT 1 FROM information_schema.columns \
                  WHERE table_schema = current_schema() AND table_name = $1 AND column_name = $2"
                .to_string(),
            params: vec![table.to_string(), column.to_string()],
        }
    }
}
