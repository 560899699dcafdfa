//! Strata Store - SQLite execution of schema definitions and module persistence
//!
//! Provides:
//! - Connection handling and TOML/env configuration
//! - Object catalog recording every object created through a schema
//! - Dependency-ordered schema execution, drop and drift verification
//! - Master-detail modules saved and loaded in a single transaction

pub mod catalog;
pub mod config;
pub mod convert;
pub mod db;
pub mod errors;
pub mod persist;
pub mod schema;

// Re-export key types
pub use config::{DatabaseConfig, StoreConfig};
pub use db::Database;
pub use errors::Result;
pub use persist::{KeyFilter, Module, RowId, SaveHooks, SavePhase, SaveSummary, Table};
pub use schema::{ExecuteReport, Schema, VerifyIssue};
