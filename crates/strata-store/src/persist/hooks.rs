//! Save hooks
//!
//! `before_save` runs inside the save transaction, after it has begun and
//! before any statement; it may write through the transaction and its error
//! aborts the save. `after_save` runs once the transaction has committed.

use crate::errors::Result;
use crate::persist::SaveSummary;
use rusqlite::Transaction;
use strata_core::errors::{ExError, ExErrorKind, Failure};

pub trait SaveHooks: Send + Sync {
    /// # Errors
    ///
    /// Any error rolls the save back.
    fn before_save(&self, _tx: &Transaction<'_>) -> Result<()> {
        Ok(())
    }

    fn after_save(&self, _summary: &SaveSummary) {}
}

/// Does nothing (module default)
pub struct NoopSaveHooks;

impl SaveHooks for NoopSaveHooks {}

/// Refuses every save (for tests that verify rollback)
pub struct RejectSaveHooks;

impl SaveHooks for RejectSaveHooks {
    fn before_save(&self, _tx: &Transaction<'_>) -> Result<()> {
        Err(ExError::new(ExErrorKind::Persistence)
            .with_op("before_save")
            .with_failure(Failure::Save)
            .with_message("save rejected by hook"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_noop_allows_and_reject_denies() {
        let mut conn = Connection::open_in_memory().unwrap();
        let tx = conn.transaction().unwrap();

        assert!(NoopSaveHooks.before_save(&tx).is_ok());
        let err = RejectSaveHooks.before_save(&tx).unwrap_err();
        assert_eq!(err.failure(), Some(Failure::Save));
    }
}
