//! Persisted registry of created schema objects
//!
//! The catalog table holds one row per registered object. Rows are written
//! and removed on the caller's connection or transaction, so the DDL that
//! creates or drops an object and its catalog row commit together.

use crate::errors::{from_rusqlite, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use strata_core::dialect::DdlHelper;
use strata_core::errors::{ExError, ExErrorKind};
use strata_core::schema::{ObjectKind, RegisteredObject};

pub const CATALOG_TABLE: &str = "strata_catalog";
pub const INFO_TABLE: &str = "strata_info";

/// A catalog row together with the schema that registered it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub object: RegisteredObject,
    pub schema_id: String,
}

/// The info row describing an executed schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaInfo {
    pub schema_id: String,
    pub version: i64,
    pub description: String,
}

/// Create the catalog and info tables if they do not exist
pub fn ensure_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {CATALOG_TABLE} (
            name TEXT PRIMARY KEY,
            unique_id TEXT NOT NULL UNIQUE,
            object_type TEXT NOT NULL,
            ddl TEXT NOT NULL,
            ddl_checksum TEXT NOT NULL,
            created_at TEXT NOT NULL,
            schema_id TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS {INFO_TABLE} (
            schema_id TEXT PRIMARY KEY,
            version INTEGER NOT NULL,
            description TEXT NOT NULL
        );"
    ))
    .map_err(from_rusqlite)
}

/// Catalog row as stored, before the typed columns are parsed
struct RawEntry {
    name: String,
    unique_id: String,
    object_type: String,
    ddl: String,
    ddl_checksum: String,
    created_at: String,
    schema_id: String,
}

fn raw_from_row(row: &Row<'_>) -> rusqlite::Result<RawEntry> {
    Ok(RawEntry {
        name: row.get(0)?,
        unique_id: row.get(1)?,
        object_type: row.get(2)?,
        ddl: row.get(3)?,
        ddl_checksum: row.get(4)?,
        created_at: row.get(5)?,
        schema_id: row.get(6)?,
    })
}

fn read_error(name: &str, message: String) -> ExError {
    ExError::new(ExErrorKind::Persistence)
        .with_op("catalog_read")
        .with_object(name.to_string())
        .with_message(message)
}

fn finish(raw: RawEntry) -> Result<CatalogEntry> {
    let kind = ObjectKind::parse(&raw.object_type).ok_or_else(|| {
        read_error(&raw.name, format!("Unknown object type '{}'", raw.object_type))
    })?;
    let created_at = DateTime::parse_from_rfc3339(&raw.created_at)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| {
            read_error(
                &raw.name,
                format!("Invalid created_at '{}': {}", raw.created_at, e),
            )
        })?;
    Ok(CatalogEntry {
        object: RegisteredObject {
            name: raw.name,
            unique_id: raw.unique_id,
            kind,
            ddl: raw.ddl,
            ddl_checksum: raw.ddl_checksum,
            created_at,
        },
        schema_id: raw.schema_id,
    })
}

const SELECT_COLUMNS: &str =
    "name, unique_id, object_type, ddl, ddl_checksum, created_at, schema_id";

/// Look up the catalog row for `name`
pub fn lookup(conn: &Connection, name: &str) -> Result<Option<CatalogEntry>> {
    let raw = conn
        .query_row(
            &format!("SELECT {SELECT_COLUMNS} FROM {CATALOG_TABLE} WHERE name = ?1"),
            [name],
            raw_from_row,
        )
        .optional()
        .map_err(from_rusqlite)?;
    raw.map(finish).transpose()
}

/// All catalog rows, optionally restricted to one schema, ordered by creation
pub fn list(conn: &Connection, schema_id: Option<&str>) -> Result<Vec<CatalogEntry>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {SELECT_COLUMNS} FROM {CATALOG_TABLE}
             WHERE ?1 IS NULL OR schema_id = ?1
             ORDER BY created_at, rowid"
        ))
        .map_err(from_rusqlite)?;
    let rows = stmt
        .query_map([schema_id], raw_from_row)
        .map_err(from_rusqlite)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(from_rusqlite)?;
    rows.into_iter().map(finish).collect()
}

/// Insert the catalog row for a newly created or adopted object
pub fn register(conn: &Connection, object: &RegisteredObject, schema_id: &str) -> Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO {CATALOG_TABLE}
             (name, unique_id, object_type, ddl, ddl_checksum, created_at, schema_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
        ),
        params![
            object.name,
            object.unique_id,
            object.kind.as_str(),
            object.ddl,
            object.ddl_checksum,
            object.created_at.to_rfc3339(),
            schema_id,
        ],
    )
    .map_err(from_rusqlite)?;
    Ok(())
}

/// Replace the registered DDL text after an alteration
pub fn update_ddl(conn: &Connection, name: &str, ddl: &str, checksum: &str) -> Result<()> {
    conn.execute(
        &format!("UPDATE {CATALOG_TABLE} SET ddl = ?1, ddl_checksum = ?2 WHERE name = ?3"),
        params![ddl, checksum, name],
    )
    .map_err(from_rusqlite)?;
    Ok(())
}

/// Remove the catalog row for `name`; returns whether a row existed
pub fn unregister(conn: &Connection, name: &str) -> Result<bool> {
    let removed = conn
        .execute(&format!("DELETE FROM {CATALOG_TABLE} WHERE name = ?1"), [name])
        .map_err(from_rusqlite)?;
    Ok(removed > 0)
}

pub fn upsert_info(conn: &Connection, info: &SchemaInfo) -> Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO {INFO_TABLE} (schema_id, version, description) VALUES (?1, ?2, ?3)
             ON CONFLICT(schema_id) DO UPDATE SET
                version = excluded.version,
                description = excluded.description"
        ),
        params![info.schema_id, info.version, info.description],
    )
    .map_err(from_rusqlite)?;
    Ok(())
}

pub fn info(conn: &Connection, schema_id: &str) -> Result<Option<SchemaInfo>> {
    conn.query_row(
        &format!("SELECT schema_id, version, description FROM {INFO_TABLE} WHERE schema_id = ?1"),
        [schema_id],
        |row| {
            Ok(SchemaInfo {
                schema_id: row.get(0)?,
                version: row.get(1)?,
                description: row.get(2)?,
            })
        },
    )
    .optional()
    .map_err(from_rusqlite)
}

pub fn delete_info(conn: &Connection, schema_id: &str) -> Result<()> {
    conn.execute(
        &format!("DELETE FROM {INFO_TABLE} WHERE schema_id = ?1"),
        [schema_id],
    )
    .map_err(from_rusqlite)?;
    Ok(())
}

/// Run the helper's existence probe for a physical object
pub fn physically_exists(
    conn: &Connection,
    helper: &dyn DdlHelper,
    kind: ObjectKind,
    name: &str,
) -> Result<bool> {
    let probe = helper.existence_probe(kind, name);
    run_probe(conn, &probe.sql, &probe.params)
}

/// Run the helper's column probe
pub fn column_exists(
    conn: &Connection,
    helper: &dyn DdlHelper,
    table: &str,
    column: &str,
) -> Result<bool> {
    let probe = helper.column_probe(table, column);
    run_probe(conn, &probe.sql, &probe.params)
}

fn run_probe(conn: &Connection, sql: &str, params: &[String]) -> Result<bool> {
    conn.query_row(sql, rusqlite::params_from_iter(params.iter()), |_| Ok(()))
        .optional()
        .map(|found| found.is_some())
        .map_err(from_rusqlite)
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::dialect::Sqlite;

    fn entry(name: &str) -> RegisteredObject {
        RegisteredObject {
            name: name.to_string(),
            unique_id: uuid::Uuid::now_v7().to_string(),
            kind: ObjectKind::Table,
            ddl: format!("CREATE TABLE \"{}\" (a INTEGER)", name),
            ddl_checksum: "abc".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_register_lookup_unregister() {
        let conn = Connection::open_in_memory().unwrap();
        ensure_tables(&conn).unwrap();

        let orders = entry("orders");
        register(&conn, &orders, "shop").unwrap();

        let found = lookup(&conn, "orders").unwrap().unwrap();
        assert_eq!(found.object.unique_id, orders.unique_id);
        assert_eq!(found.object.kind, ObjectKind::Table);
        assert_eq!(found.schema_id, "shop");

        assert!(unregister(&conn, "orders").unwrap());
        assert!(!unregister(&conn, "orders").unwrap());
        assert!(lookup(&conn, "orders").unwrap().is_none());
    }

    #[test]
    fn test_list_filters_by_schema() {
        let conn = Connection::open_in_memory().unwrap();
        ensure_tables(&conn).unwrap();
        register(&conn, &entry("a"), "one").unwrap();
        register(&conn, &entry("b"), "two").unwrap();

        assert_eq!(list(&conn, None).unwrap().len(), 2);
        let one = list(&conn, Some("one")).unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].object.name, "a");
    }

    #[test]
    fn test_info_upsert() {
        let conn = Connection::open_in_memory().unwrap();
        ensure_tables(&conn).unwrap();
        let mut info_row = SchemaInfo {
            schema_id: "shop".to_string(),
            version: 1,
            description: "first".to_string(),
        };
        upsert_info(&conn, &info_row).unwrap();
        info_row.version = 2;
        upsert_info(&conn, &info_row).unwrap();

        assert_eq!(info(&conn, "shop").unwrap(), Some(info_row));
        delete_info(&conn, "shop").unwrap();
        assert!(info(&conn, "shop").unwrap().is_none());
    }

    #[test]
    fn test_probes() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (a INTEGER)").unwrap();

        assert!(physically_exists(&conn, &Sqlite, ObjectKind::Table, "t").unwrap());
        assert!(!physically_exists(&conn, &Sqlite, ObjectKind::View, "t").unwrap());
        assert!(column_exists(&conn, &Sqlite, "t", "a").unwrap());
        assert!(!column_exists(&conn, &Sqlite, "t", "b").unwrap());
    }
}
