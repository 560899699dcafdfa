//! Column definitions

use crate::dialect::DdlHelper;
use crate::errors::StrataError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Engine-neutral column type.
///
/// Written in descriptors as a short string: `integer`, `bigint`, `real`,
/// `decimal(10,2)`, `text`, `text(80)`, `boolean`, `blob`, `timestamp`, `uuid`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FieldType {
    Integer,
    BigInt,
    Real,
    Decimal { precision: u8, scale: u8 },
    Text(Option<u32>),
    Boolean,
    Blob,
    Timestamp,
    Uuid,
}

impl FromStr for FieldType {
    type Err = StrataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || StrataError::InvalidFieldType {
            spec: s.to_string(),
        };
        let spec = s.trim().to_ascii_lowercase();
        let (head, args) = match spec.find('(') {
            Some(open) => {
                let inner = spec[open + 1..].strip_suffix(')').ok_or_else(invalid)?;
                let args = inner
                    .split(',')
                    .map(|a| a.trim().parse::<u32>().map_err(|_| invalid()))
                    .collect::<Result<Vec<_>, _>>()?;
                (spec[..open].trim().to_string(), args)
            }
            None => (spec.clone(), Vec::new()),
        };

        let ty = match (head.as_str(), args.as_slice()) {
            ("integer" | "int", []) => FieldType::Integer,
            ("bigint", []) => FieldType::BigInt,
            ("real" | "float" | "double", []) => FieldType::Real,
            ("decimal" | "numeric", [p, s]) => FieldType::Decimal {
                precision: u8::try_from(*p).map_err(|_| invalid())?,
                scale: u8::try_from(*s).map_err(|_| invalid())?,
            },
            ("text" | "varchar" | "string", []) => FieldType::Text(None),
            ("text" | "varchar" | "string", [n]) => FieldType::Text(Some(*n)),
            ("boolean" | "bool", []) => FieldType::Boolean,
            ("blob" | "bytes", []) => FieldType::Blob,
            ("timestamp" | "datetime", []) => FieldType::Timestamp,
            ("uuid", []) => FieldType::Uuid,
            _ => return Err(invalid()),
        };
        Ok(ty)
    }
}

impl TryFrom<String> for FieldType {
    type Error = StrataError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FieldType> for String {
    fn from(ty: FieldType) -> Self {
        ty.to_string()
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Integer => write!(f, "integer"),
            FieldType::BigInt => write!(f, "bigint"),
            FieldType::Real => write!(f, "real"),
            FieldType::Decimal { precision, scale } => write!(f, "decimal({},{})", precision, scale),
            FieldType::Text(None) => write!(f, "text"),
            FieldType::Text(Some(n)) => write!(f, "text({})", n),
            FieldType::Boolean => write!(f, "boolean"),
            FieldType::Blob => write!(f, "blob"),
            FieldType::Timestamp => write!(f, "timestamp"),
            FieldType::Uuid => write!(f, "uuid"),
        }
    }
}

/// A column of a table
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub field_type: FieldType,
    pub nullable: bool,
    /// Value assigned by the database on insert (identity / autoincrement)
    pub generated: bool,
    /// Raw SQL default expression
    pub default: Option<String>,
}

impl Field {
    /// Create a nullable, client-assigned column
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            nullable: true,
            generated: false,
            default: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Mark as database-generated. Generated columns are never nullable.
    pub fn generated(mut self) -> Self {
        self.generated = true;
        self.nullable = false;
        self
    }

    pub fn with_default(mut self, expr: impl Into<String>) -> Self {
        self.default = Some(expr.into());
        self
    }

    /// Render the column definition used inside CREATE TABLE and ADD COLUMN.
    ///
    /// `inline_primary_key` is set when the engine requires the identity
    /// column to carry the primary key itself (SQLite `AUTOINCREMENT`).
    pub fn definition(&self, helper: &dyn DdlHelper, inline_primary_key: bool) -> String {
        let mut sql = format!(
            "{} {}",
            helper.quote(&self.name),
            helper.type_name(&self.field_type)
        );
        if inline_primary_key {
            sql.push_str(" PRIMARY KEY");
        }
        if self.generated {
            sql.push(' ');
            sql.push_str(helper.identity_clause());
        }
        if !self.nullable && !inline_primary_key {
            sql.push_str(" NOT NULL");
        }
        if let Some(default) = &self.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(default);
        }
        sql
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{Postgres, Sqlite};

    #[test]
    fn test_parse_field_types() {
        assert_eq!("integer".parse::<FieldType>().unwrap(), FieldType::Integer);
        assert_eq!(
            "TEXT(80)".parse::<FieldType>().unwrap(),
            FieldType::Text(Some(80))
        );
        assert_eq!(
            "decimal(10, 2)".parse::<FieldType>().unwrap(),
            FieldType::Decimal {
                precision: 10,
                scale: 2
            }
        );
    }

    #[test]
    fn test_parse_rejects_unknown_and_malformed() {
        assert!("money".parse::<FieldType>().is_err());
        assert!("decimal(10".parse::<FieldType>().is_err());
        assert!("integer(4)".parse::<FieldType>().is_err());
    }

    #[test]
    fn test_display_parses_back() {
        let ty = FieldType::Decimal {
            precision: 12,
            scale: 4,
        };
        assert_eq!(ty.to_string().parse::<FieldType>().unwrap(), ty);
    }

    #[test]
    fn test_definition_not_null_with_default() {
        let field = Field::new("status", FieldType::Text(Some(10)))
            .not_null()
            .with_default("'open'");
        assert_eq!(
            field.definition(&Postgres, false),
            r#""status" VARCHAR(10) NOT NULL DEFAULT 'open'"#
        );
    }

    #[test]
    fn test_definition_sqlite_identity_primary_key() {
        let field = Field::new("id", FieldType::Integer).generated();
        assert_eq!(
            field.definition(&Sqlite, true),
            r#""id" INTEGER PRIMARY KEY AUTOINCREMENT"#
        );
    }
}
