use super::{DdlHelper, Probe};
use crate::model::FieldType;
use crate::schema::ObjectKind;

#[derive(Debug, Clone, Copy, Default)]
pub struct Mysql;

impl DdlHelper for Mysql {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn type_name(&self, ty: &FieldType) -> String {
        match ty {
            FieldType::Integer => "INT".to_string(),
            FieldType::BigInt => "BIGINT".to_string(),
            FieldType::Real => "DOUBLE".to_string(),
            FieldType::Decimal { precision, scale } => format!("DECIMAL({},{})", precision, scale),
            FieldType::Text(Some(n)) => format!("VARCHAR({})", n),
            FieldType::Text(None) => "TEXT".to_string(),
            FieldType::Boolean => "TINYINT(1)".to_string(),
            FieldType::Blob => "BLOB".to_string(),
            FieldType::Timestamp => "DATETIME(6)".to_string(),
            FieldType::Uuid => "CHAR(36)".to_string(),
        }
    }

    fn quote_chars(&self) -> (char, char) {
        ('`', '`')
    }

    fn identity_clause(&self) -> &'static str {
        "AUTO_INCREMENT"
    }

    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn existence_probe(&self, kind: ObjectKind, name: &str) -> Probe {
        let table_type = match kind {
            ObjectKind::Table => "BASE TABLE",
            ObjectKind::View => "VIEW",
        };
        Probe {
            sql: "SELECT 1 FROM information_schema.tables \
                  WHERE table_schema = DATABASE() AND table_name = ? AND table_type = ?"
                .to_string(),
            params: vec![name.to_string(), table_type.to_string()],
        }
    }

    fn column_probe(&self, table: &str, column: &str) -> Probe {
        Probe {
            sql: "SELECT 1 FROM information_schema.columns \
                  WHERE table_schema = DATABASE() AND table_name = ? AND column_name = ?"
                .to_string(),
            params: vec![table.to_string(), column.to_string()],
        }
    }
}
