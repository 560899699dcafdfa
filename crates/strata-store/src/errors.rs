//! Error handling for strata-store
//!
//! Wraps strata-core ExError with store-specific helpers. Driver messages are
//! kept verbatim and prefixed with the failing phase.

use strata_core::errors::{ExError, ExErrorKind, Failure};

/// Result type alias using ExError
pub type Result<T> = std::result::Result<T, ExError>;

/// Create a database error from rusqlite::Error
pub fn from_rusqlite(err: rusqlite::Error) -> ExError {
    ExError::new(ExErrorKind::Persistence)
        .with_op("sqlite")
        .with_message(err.to_string())
}

/// Connection could not be opened or configured
pub fn connection_error(target: &str, err: rusqlite::Error) -> ExError {
    ExError::new(ExErrorKind::ConnectionFailure)
        .with_op("connect")
        .with_failure(Failure::Connect)
        .with_object(target.to_string())
        .with_message(err.to_string())
}

/// A DDL statement failed for `object`
pub fn ddl_error(object: &str, sql: &str, err: rusqlite::Error) -> ExError {
    ExError::new(ExErrorKind::DdlFailure)
        .with_op("ddl")
        .with_failure(Failure::Ddl)
        .with_object(object.to_string())
        .with_sql(sql.to_string())
        .with_message(err.to_string())
}

/// A DML statement failed during `failure` (load, insert, update, delete)
pub fn dml_error(failure: Failure, table: &str, sql: &str, err: rusqlite::Error) -> ExError {
    ExError::new(ExErrorKind::Persistence)
        .with_op("dml")
        .with_failure(failure)
        .with_object(table.to_string())
        .with_sql(sql.to_string())
        .with_message(err.to_string())
}

/// Create a configuration error
pub fn config_error(reason: impl Into<String>) -> ExError {
    ExError::new(ExErrorKind::Config)
        .with_op("config")
        .with_message(reason.into())
}

/// Create an IO error
pub fn io_error(operation: &str, err: std::io::Error) -> ExError {
    ExError::new(ExErrorKind::Io)
        .with_op(operation.to_string())
        .with_message(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ddl_error_carries_context() {
        let err = ddl_error(
            "orders",
            "CREATE TABLE orders",
            rusqlite::Error::InvalidQuery,
        );
        assert_eq!(err.kind(), ExErrorKind::DdlFailure);
        assert_eq!(err.object(), Some("orders"));
        assert_eq!(err.sql(), Some("CREATE TABLE orders"));
        assert!(err
            .to_string()
            .contains("Failed to execute DDL statement"));
    }

    #[test]
    fn test_dml_error_prefixes_phase() {
        let err = dml_error(
            Failure::Insert,
            "orders",
            "INSERT",
            rusqlite::Error::QueryReturnedNoRows,
        );
        assert_eq!(err.failure(), Some(Failure::Insert));
        assert!(err.to_string().contains("Failed to insert records"));
    }
}
