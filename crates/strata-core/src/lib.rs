//! Strata Core - schema model and dependency graph
//!
//! This crate holds everything that does not touch a database connection:
//! - Relational model: values, records, fields and key constraints
//! - Schema objects with their dependency graph and topological ordering
//! - Per-engine DDL helpers (SQLite, PostgreSQL, MySQL)
//! - Declarative schema and module descriptors
//! - The error facility and structured logging shared by all crates

pub mod dialect;
pub mod errors;
pub mod logging_facility;
pub mod model;
pub mod schema;

// Used by the logging macros through `$crate`
pub use strata_core_types;

// Re-export commonly used types
pub use dialect::{helper_for, DdlHelper};
pub use errors::{ExError, ExErrorKind, Failure, Result, StrataError};
pub use model::{Action, Constraint, Field, FieldType, Record, ReferentialAction, Value};
pub use schema::{ModuleDefinition, ObjectKind, SchemaDefinition, SchemaGraph, SchemaObject};
