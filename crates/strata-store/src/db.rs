//! Database connection management
//!
//! `Database` pairs a SQLite connection with the DDL helper describing its
//! dialect. All I/O is synchronous; a transaction holds the exclusive borrow
//! of the connection, so only one can be active at a time.

use crate::config::DatabaseConfig;
use crate::errors::{connection_error, from_rusqlite, Result};
use rusqlite::{Connection, Transaction};
use std::time::Duration;
use strata_core::dialect::{DdlHelper, Sqlite};

#[derive(Debug)]
pub struct Database {
    conn: Connection,
    helper: Box<dyn DdlHelper>,
}

impl Database {
    /// Open and configure the database described by `config`
    pub fn connect(config: &DatabaseConfig) -> Result<Self> {
        let target = config.path.display().to_string();
        let conn = if config.is_in_memory() {
            Connection::open_in_memory()
        } else {
            Connection::open(&config.path)
        }
        .map_err(|e| connection_error(&target, e))?;

        let db = Self::with_helper(conn, Box::new(Sqlite));
        db.configure(config)
            .map_err(|e| e.with_object(target))?;
        tracing::debug!(path = %config.path.display(), "database connected");
        Ok(db)
    }

    /// In-memory database with foreign keys enforced
    pub fn open_in_memory() -> Result<Self> {
        Self::connect(&DatabaseConfig::in_memory())
    }

    /// Wrap an already open connection
    pub fn with_helper(conn: Connection, helper: Box<dyn DdlHelper>) -> Self {
        Self { conn, helper }
    }

    /// Apply connection pragmas
    pub fn configure(&self, config: &DatabaseConfig) -> Result<()> {
        self.conn
            .pragma_update(None, "foreign_keys", config.foreign_keys)
            .map_err(from_rusqlite)?;

        if let Some(mode) = &config.journal_mode {
            // journal_mode reports the mode in effect; in-memory databases keep "memory"
            let _: String = self
                .conn
                .pragma_update_and_check(None, "journal_mode", mode, |row| row.get(0))
                .map_err(from_rusqlite)?;
        }

        self.conn
            .busy_timeout(Duration::from_millis(config.busy_timeout_ms))
            .map_err(from_rusqlite)?;
        Ok(())
    }

    /// Close the connection, surfacing any error the driver reports
    pub fn disconnect(self) -> Result<()> {
        self.conn.close().map_err(|(_, e)| from_rusqlite(e))
    }

    pub fn helper(&self) -> &dyn DdlHelper {
        self.helper.as_ref()
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    /// Begin a transaction. Dropping it without commit rolls back.
    pub fn transaction(&mut self) -> Result<Transaction<'_>> {
        self.conn.transaction().map_err(from_rusqlite)
    }

    /// Begin a transaction and hand out the helper alongside it
    pub fn begin(&mut self) -> Result<(Transaction<'_>, &dyn DdlHelper)> {
        let helper = self.helper.as_ref();
        let tx = self.conn.transaction().map_err(from_rusqlite)?;
        Ok((tx, helper))
    }
}
