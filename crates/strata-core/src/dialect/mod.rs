//! Per-engine DDL helpers
//!
//! A `DdlHelper` supplies everything the schema engine needs to know about a
//! SQL dialect: the type map, identifier quoting, identity columns, safe
//! column alteration and the catalog queries used to probe for objects.

mod mysql;
mod postgres;
mod sqlite;

pub use mysql::Mysql;
pub use postgres::Postgres;
pub use sqlite::Sqlite;

use crate::model::FieldType;
use crate::schema::ObjectKind;
use std::fmt;

/// A parameterised catalog query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Probe {
    pub sql: String,
    pub params: Vec<String>,
}

pub trait DdlHelper: fmt::Debug + Send + Sync {
    /// Dialect name as used in configuration (`sqlite`, `postgres`, `mysql`)
    fn name(&self) -> &'static str;

    /// Storage type for a column type
    fn type_name(&self, ty: &FieldType) -> String;

    /// Opening and closing identifier quote characters
    fn quote_chars(&self) -> (char, char) {
        ('"', '"')
    }

    /// Quote an identifier, doubling any embedded closing quote
    fn quote(&self, ident: &str) -> String {
        let (open, close) = self.quote_chars();
        let escaped = ident.replace(close, &format!("{}{}", close, close));
        format!("{}{}{}", open, escaped, close)
    }

    /// Clause appended to a database-generated column
    fn identity_clause(&self) -> &'static str;

    /// True when the identity clause is only legal on the primary key column
    /// itself, so a single-column generated key is declared inline.
    fn identity_is_primary_key(&self) -> bool {
        false
    }

    /// Bind parameter placeholder for the 1-based `index`
    fn placeholder(&self, index: usize) -> String {
        format!("?{}", index)
    }

    /// `column_definition` is the rendered output of `Field::definition`
    fn add_column(&self, table: &str, column_definition: &str) -> String {
        format!("ALTER TABLE {} ADD COLUMN {}", self.quote(table), column_definition)
    }

    fn drop_column(&self, table: &str, column: &str) -> String {
        format!(
            "ALTER TABLE {} DROP COLUMN {}",
            self.quote(table),
            self.quote(column)
        )
    }

    /// Query returning a row when `name` physically exists as `kind`
    fn existence_probe(&self, kind: ObjectKind, name: &str) -> Probe;

    /// Query returning a row when `table` has a column named `column`
    fn column_probe(&self, table: &str, column: &str) -> Probe;
}

/// Look up a helper by its configuration name
pub fn helper_for(name: &str) -> Option<Box<dyn DdlHelper>> {
    match name.to_ascii_lowercase().as_str() {
        "sqlite" => Some(Box::new(Sqlite)),
        "postgres" | "postgresql" => Some(Box::new(Postgres)),
        "mysql" => Some(Box::new(Mysql)),
        _ => None,
    }
}
