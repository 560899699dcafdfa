//! In-memory table with pending changes
//!
//! A `Table` holds the rows of one database table together with the
//! inserts, updates and deletes recorded since the last successful save.
//! Rows are addressed by a [`RowId`] that stays stable for the lifetime of
//! the in-memory row, independent of any database key.

use crate::convert::{from_sql, to_storage, SqlValue};
use crate::errors::{dml_error, Result};
use rusqlite::{params_from_iter, Connection};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use strata_core::dialect::DdlHelper;
use strata_core::errors::{ExError, Failure, StrataError};
use strata_core::model::{Field, FieldType, Record, Value};
use strata_core::schema::{ObjectKind, SchemaObject};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowId(u64);

impl RowId {
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for RowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Field -> candidate values. Fields combine with AND, values with OR.
pub type KeyFilter = BTreeMap<String, Vec<Value>>;

#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    id: RowId,
    record: Record,
    master: Option<RowId>,
}

impl Row {
    pub fn id(&self) -> RowId {
        self.id
    }

    pub fn record(&self) -> &Record {
        &self.record
    }

    /// The master row this row belongs to, for detail tables
    pub fn master(&self) -> Option<RowId> {
        self.master
    }

    pub fn get(&self, field: &str) -> &Value {
        self.record.get(field)
    }
}

#[derive(Debug, Clone)]
pub struct Table {
    name: String,
    fields: Vec<Field>,
    key_fields: Vec<String>,
    level: usize,
    master: Option<String>,
    /// (detail field, master field)
    master_key_fields: Vec<(String, String)>,
    details: Vec<String>,
    rows: Vec<Row>,
    next_row: u64,
    pending_inserts: Vec<RowId>,
    pending_updates: Vec<RowId>,
    /// Key records of persisted rows removed from memory
    pending_deletes: Vec<Record>,
}

impl Table {
    /// # Errors
    ///
    /// `MissingPrimaryKey` when `key_fields` is empty, `UnknownField` when a
    /// key field is not one of `fields`.
    pub fn new(name: impl Into<String>, fields: Vec<Field>, key_fields: &[&str]) -> Result<Self> {
        let name = name.into();
        if key_fields.is_empty() {
            return Err(StrataError::MissingPrimaryKey { table: name }.into());
        }
        for key in key_fields {
            if !fields.iter().any(|f| f.name == *key) {
                return Err(StrataError::UnknownField {
                    table: name,
                    field: key.to_string(),
                }
                .into());
            }
        }
        Ok(Self {
            name,
            fields,
            key_fields: key_fields.iter().map(|k| k.to_string()).collect(),
            level: 0,
            master: None,
            master_key_fields: Vec::new(),
            details: Vec::new(),
            rows: Vec::new(),
            next_row: 1,
            pending_inserts: Vec::new(),
            pending_updates: Vec::new(),
            pending_deletes: Vec::new(),
        })
    }

    /// Take the columns and primary key of a table definition
    pub fn from_object(object: &SchemaObject) -> Result<Self> {
        if object.kind() != ObjectKind::Table {
            return Err(StrataError::InvalidDescriptor {
                reason: format!("view {} cannot hold rows", object.sql_name()),
            }
            .into());
        }
        let current = object.with_alterations_applied();
        let keys = current.key_fields();
        let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
        Self::new(current.sql_name(), current.fields().to_vec(), &keys)
    }

    // ----- shape -----

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn key_fields(&self) -> &[String] {
        &self.key_fields
    }

    /// Depth in the module hierarchy; 0 without a master
    pub fn level(&self) -> usize {
        self.level
    }

    pub fn master(&self) -> Option<&str> {
        self.master.as_deref()
    }

    pub fn master_key_fields(&self) -> &[(String, String)] {
        &self.master_key_fields
    }

    pub fn details(&self) -> &[String] {
        &self.details
    }

    pub(crate) fn set_master(
        &mut self,
        master: &str,
        level: usize,
        keys: Vec<(String, String)>,
    ) {
        self.master = Some(master.to_string());
        self.level = level;
        self.master_key_fields = keys;
    }

    pub(crate) fn push_detail(&mut self, name: &str) {
        if !self.details.iter().any(|d| d == name) {
            self.details.push(name.to_string());
        }
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field_type(name).is_some()
    }

    fn field_type(&self, name: &str) -> Option<&FieldType> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| &f.field_type)
    }

    // ----- rows -----

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn row(&self, id: RowId) -> Option<&Row> {
        self.rows.iter().find(|r| r.id == id)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row whose primary key equals `key`, in key field order
    pub fn find(&self, key: &[Value]) -> Option<&Row> {
        self.rows
            .iter()
            .find(|r| r.record.key(&self.key_fields) == key)
    }

    /// Rows linked to `master` in the master table
    pub fn linked_rows(&self, master: RowId) -> Vec<RowId> {
        self.rows
            .iter()
            .filter(|r| r.master == Some(master))
            .map(|r| r.id)
            .collect()
    }

    pub fn add(&mut self, record: Record) -> Result<RowId> {
        self.add_row(record, None)
    }

    pub(crate) fn add_row(&mut self, record: Record, master: Option<RowId>) -> Result<RowId> {
        self.check_fields(&record)?;
        let id = self.push_row(record, master);
        self.pending_inserts.push(id);
        Ok(id)
    }

    /// Add a typed row; the model serializes to a map of column values
    pub fn add_model<T: Serialize>(&mut self, model: &T) -> Result<RowId> {
        let record = Record::from_model(model)?;
        self.add(record)
    }

    /// Every row as a typed model
    pub fn models<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        self.rows
            .iter()
            .map(|r| r.record.to_model().map_err(ExError::from))
            .collect()
    }

    /// Change one column of a row
    pub fn set(&mut self, row: RowId, field: &str, value: impl Into<Value>) -> Result<()> {
        if !self.has_field(field) {
            return Err(self.unknown_field(field));
        }
        self.row_mut(row)?.record.set(field, value);
        self.mark_updated(row);
        Ok(())
    }

    /// Overwrite the columns present in `changes`
    pub fn update(&mut self, row: RowId, changes: Record) -> Result<()> {
        self.check_fields(&changes)?;
        let target = self.row_mut(row)?;
        for (field, value) in changes.iter() {
            target.record.set(field.clone(), value.clone());
        }
        self.mark_updated(row);
        Ok(())
    }

    /// Remove a row. A row that was never saved simply disappears; a
    /// persisted row is queued for deletion by key.
    pub fn delete(&mut self, row: RowId) -> Result<Record> {
        let position = self
            .rows
            .iter()
            .position(|r| r.id == row)
            .ok_or_else(|| self.unknown_row(row))?;
        let removed = self.rows.remove(position);

        match self.pending_inserts.iter().position(|id| *id == row) {
            Some(i) => {
                self.pending_inserts.remove(i);
            }
            None => {
                let mut key = Record::new();
                for field in &self.key_fields {
                    key.set(field.clone(), removed.record.get(field).clone());
                }
                self.pending_deletes.push(key);
            }
        }
        self.pending_updates.retain(|id| *id != row);
        Ok(removed.record)
    }

    // ----- pending changes -----

    pub fn pending_inserts(&self) -> &[RowId] {
        &self.pending_inserts
    }

    pub fn pending_updates(&self) -> &[RowId] {
        &self.pending_updates
    }

    pub fn pending_deletes(&self) -> &[Record] {
        &self.pending_deletes
    }

    pub fn has_pending(&self) -> bool {
        !(self.pending_inserts.is_empty()
            && self.pending_updates.is_empty()
            && self.pending_deletes.is_empty())
    }

    pub fn clear_pending(&mut self) {
        self.pending_inserts.clear();
        self.pending_updates.clear();
        self.pending_deletes.clear();
    }

    /// Forget every row and pending change
    pub fn clear(&mut self) {
        self.rows.clear();
        self.clear_pending();
    }

    // ----- persistence -----

    /// Delete every queued key. Returns the number of rows removed.
    pub fn execute_deletes(&self, conn: &Connection, helper: &dyn DdlHelper) -> Result<usize> {
        if self.pending_deletes.is_empty() {
            return Ok(0);
        }
        let sql = format!(
            "DELETE FROM {} WHERE {}",
            helper.quote(&self.name),
            self.key_clause(helper, 1)
        );
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| dml_error(Failure::Delete, &self.name, &sql, e))?;
        let mut count = 0;
        for key in &self.pending_deletes {
            let values = self.storage_values(key, &self.key_fields);
            count += stmt
                .execute(params_from_iter(values.iter().map(SqlValue)))
                .map_err(|e| dml_error(Failure::Delete, &self.name, &sql, e))?;
        }
        Ok(count)
    }

    /// Write the non-key columns of every updated row, matched by key.
    /// Returns the number of rows the database changed.
    pub fn execute_updates(&self, conn: &Connection, helper: &dyn DdlHelper) -> Result<usize> {
        let mut count = 0;
        for id in &self.pending_updates {
            let row = match self.row(*id) {
                Some(row) => row,
                None => continue,
            };
            let columns: Vec<&Field> = self
                .fields
                .iter()
                .filter(|f| !self.key_fields.contains(&f.name) && row.record.contains(&f.name))
                .collect();
            if columns.is_empty() {
                continue;
            }

            let assignments: Vec<String> = columns
                .iter()
                .enumerate()
                .map(|(i, f)| format!("{} = {}", helper.quote(&f.name), helper.placeholder(i + 1)))
                .collect();
            let sql = format!(
                "UPDATE {} SET {} WHERE {}",
                helper.quote(&self.name),
                assignments.join(", "),
                self.key_clause(helper, columns.len() + 1)
            );
            let mut values: Vec<Value> = columns
                .iter()
                .map(|f| to_storage(row.record.get(&f.name), &f.field_type))
                .collect();
            values.extend(self.storage_values(&row.record, &self.key_fields));

            count += conn
                .execute(&sql, params_from_iter(values.iter().map(SqlValue)))
                .map_err(|e| dml_error(Failure::Update, &self.name, &sql, e))?;
        }
        Ok(count)
    }

    /// Insert every new row. A generated key left unset is read back right
    /// after its row's insert and stored in the row.
    pub fn execute_inserts(&mut self, conn: &Connection, helper: &dyn DdlHelper) -> Result<usize> {
        let generated = self
            .fields
            .iter()
            .find(|f| f.generated)
            .map(|f| f.name.clone());
        let pending = self.pending_inserts.clone();

        for id in &pending {
            let position = match self.rows.iter().position(|r| r.id == *id) {
                Some(p) => p,
                None => continue,
            };
            let (sql, values) = self.insert_statement(&self.rows[position].record, helper);
            conn.execute(&sql, params_from_iter(values.iter().map(SqlValue)))
                .map_err(|e| dml_error(Failure::Insert, &self.name, &sql, e))?;

            if let Some(field) = &generated {
                let record = &mut self.rows[position].record;
                if record.get(field).is_null() {
                    record.set(field.clone(), Value::Integer(conn.last_insert_rowid()));
                }
            }
        }
        Ok(pending.len())
    }

    /// Replace the rows with those matching `filter`; an empty filter loads
    /// the whole table. Pending changes are discarded.
    pub fn load(
        &mut self,
        conn: &Connection,
        helper: &dyn DdlHelper,
        filter: &KeyFilter,
    ) -> Result<usize> {
        for field in filter.keys() {
            if !self.has_field(field) {
                return Err(self.unknown_field(field));
            }
        }
        self.clear();
        if filter.values().any(Vec::is_empty) {
            return Ok(0);
        }

        let columns: Vec<String> = self.fields.iter().map(|f| helper.quote(&f.name)).collect();
        let mut sql = format!("SELECT {} FROM {}", columns.join(", "), helper.quote(&self.name));
        let mut params: Vec<Value> = Vec::new();
        let mut clauses = Vec::new();
        for (field, candidates) in filter {
            let field_type = self.field_type(field).cloned().unwrap_or(FieldType::Text(None));
            let mut placeholders = Vec::with_capacity(candidates.len());
            for value in candidates {
                params.push(to_storage(value, &field_type));
                placeholders.push(helper.placeholder(params.len()));
            }
            clauses.push(format!("{} IN ({})", helper.quote(field), placeholders.join(", ")));
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        let order: Vec<String> = self.key_fields.iter().map(|k| helper.quote(k)).collect();
        sql.push_str(" ORDER BY ");
        sql.push_str(&order.join(", "));

        let load_err = |e| dml_error(Failure::Load, &self.name, &sql, e);
        let mut stmt = conn.prepare(&sql).map_err(load_err)?;
        let mut rows = stmt
            .query(params_from_iter(params.iter().map(SqlValue)))
            .map_err(load_err)?;
        let mut loaded = Vec::new();
        while let Some(row) = rows.next().map_err(load_err)? {
            let mut record = Record::new();
            for (i, field) in self.fields.iter().enumerate() {
                let raw = row.get_ref(i).map_err(load_err)?;
                record.set(field.name.clone(), from_sql(raw, Some(&field.field_type)));
            }
            loaded.push(record);
        }
        drop(rows);
        drop(stmt);

        let count = loaded.len();
        for record in loaded {
            self.push_row(record, None);
        }
        Ok(count)
    }

    /// Link every row to its master row; rows without a master are dropped
    pub(crate) fn link_rows<F>(&mut self, mut resolve: F)
    where
        F: FnMut(&Record) -> Option<RowId>,
    {
        for row in &mut self.rows {
            row.master = resolve(&row.record);
        }
        self.rows.retain(|r| r.master.is_some());
    }

    /// Copy master key values into a detail row before it is inserted
    pub(crate) fn assign(&mut self, row: RowId, values: Vec<(String, Value)>) -> Result<()> {
        let target = self.row_mut(row)?;
        for (field, value) in values {
            target.record.set(field, value);
        }
        Ok(())
    }

    // ----- internals -----

    fn push_row(&mut self, record: Record, master: Option<RowId>) -> RowId {
        let id = RowId(self.next_row);
        self.next_row += 1;
        self.rows.push(Row { id, record, master });
        id
    }

    fn row_mut(&mut self, id: RowId) -> Result<&mut Row> {
        match self.rows.iter().position(|r| r.id == id) {
            Some(i) => Ok(&mut self.rows[i]),
            None => Err(self.unknown_row(id)),
        }
    }

    fn mark_updated(&mut self, row: RowId) {
        if !self.pending_inserts.contains(&row) && !self.pending_updates.contains(&row) {
            self.pending_updates.push(row);
        }
    }

    fn check_fields(&self, record: &Record) -> Result<()> {
        match record.iter().find(|(name, _)| !self.has_field(name)) {
            Some((name, _)) => Err(self.unknown_field(name)),
            None => Ok(()),
        }
    }

    fn unknown_field(&self, field: &str) -> ExError {
        StrataError::UnknownField {
            table: self.name.clone(),
            field: field.to_string(),
        }
        .into()
    }

    fn unknown_row(&self, row: RowId) -> ExError {
        StrataError::UnknownRow {
            table: self.name.clone(),
            row: row.get(),
        }
        .into()
    }

    fn key_clause(&self, helper: &dyn DdlHelper, first_placeholder: usize) -> String {
        self.key_fields
            .iter()
            .enumerate()
            .map(|(i, k)| format!("{} = {}", helper.quote(k), helper.placeholder(first_placeholder + i)))
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    fn storage_values(&self, record: &Record, fields: &[String]) -> Vec<Value> {
        fields
            .iter()
            .map(|f| match self.field_type(f) {
                Some(ty) => to_storage(record.get(f), ty),
                None => record.get(f).clone(),
            })
            .collect()
    }

    /// Columns present in the record, leaving out an unset generated key
    fn insert_statement(&self, record: &Record, helper: &dyn DdlHelper) -> (String, Vec<Value>) {
        let columns: Vec<&Field> = self
            .fields
            .iter()
            .filter(|f| record.contains(&f.name) && !(f.generated && record.get(&f.name).is_null()))
            .collect();
        if columns.is_empty() {
            return (
                format!("INSERT INTO {} DEFAULT VALUES", helper.quote(&self.name)),
                Vec::new(),
            );
        }
        let names: Vec<String> = columns.iter().map(|f| helper.quote(&f.name)).collect();
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| helper.placeholder(i)).collect();
        let values = columns
            .iter()
            .map(|f| to_storage(record.get(&f.name), &f.field_type))
            .collect();
        (
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                helper.quote(&self.name),
                names.join(", "),
                placeholders.join(", ")
            ),
            values,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::dialect::Sqlite;

    fn orders() -> Table {
        Table::new(
            "orders",
            vec![
                Field::new("id", FieldType::Integer).generated(),
                Field::new("customer", FieldType::Text(None)).not_null(),
                Field::new("paid", FieldType::Boolean),
            ],
            &["id"],
        )
        .unwrap()
    }

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE orders (id INTEGER PRIMARY KEY AUTOINCREMENT, customer TEXT NOT NULL, paid INTEGER)",
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_missing_primary_key_rejected() {
        let err = Table::new("t", vec![Field::new("a", FieldType::Integer)], &[]).unwrap_err();
        assert_eq!(err.code(), "ERR_MISSING_PRIMARY_KEY");
    }

    #[test]
    fn test_unknown_field_rejected_on_add() {
        let mut table = orders();
        let err = table.add(Record::new().with("nope", 1)).unwrap_err();
        assert_eq!(err.code(), "ERR_NOT_FOUND");
        assert!(table.is_empty());
    }

    #[test]
    fn test_insert_reads_back_generated_key() {
        let conn = setup();
        let mut table = orders();
        let a = table.add(Record::new().with("customer", "ada")).unwrap();
        let b = table.add(Record::new().with("customer", "bob")).unwrap();

        assert_eq!(table.execute_inserts(&conn, &Sqlite).unwrap(), 2);

        assert_eq!(table.row(a).unwrap().get("id"), &Value::Integer(1));
        assert_eq!(table.row(b).unwrap().get("id"), &Value::Integer(2));
    }

    #[test]
    fn test_delete_of_unsaved_row_leaves_no_pending_delete() {
        let mut table = orders();
        let row = table.add(Record::new().with("customer", "ada")).unwrap();
        table.delete(row).unwrap();

        assert!(!table.has_pending());
    }

    #[test]
    fn test_update_then_load_with_filter() {
        let conn = setup();
        let mut table = orders();
        table.add(Record::new().with("customer", "ada")).unwrap();
        table.add(Record::new().with("customer", "bob")).unwrap();
        table.execute_inserts(&conn, &Sqlite).unwrap();
        table.clear_pending();

        let bob = table.find(&[Value::Integer(2)]).unwrap().id();
        table.set(bob, "paid", true).unwrap();
        assert_eq!(table.pending_updates(), &[bob]);
        assert_eq!(table.execute_updates(&conn, &Sqlite).unwrap(), 1);

        let mut filter = KeyFilter::new();
        filter.insert("paid".to_string(), vec![Value::Bool(true)]);
        assert_eq!(table.load(&conn, &Sqlite, &filter).unwrap(), 1);
        assert_eq!(table.rows()[0].get("customer"), &Value::Text("bob".to_string()));
        assert_eq!(table.rows()[0].get("paid"), &Value::Bool(true));
    }

    #[test]
    fn test_counts_only_rows_the_database_matched() {
        let conn = setup();
        let mut table = orders();
        let ada = table.add(Record::new().with("customer", "ada")).unwrap();
        table.execute_inserts(&conn, &Sqlite).unwrap();
        table.clear_pending();

        // The key now points at a row that was never stored
        table.set(ada, "id", 99).unwrap();
        table.set(ada, "paid", true).unwrap();
        assert_eq!(table.execute_updates(&conn, &Sqlite).unwrap(), 0);

        table.delete(ada).unwrap();
        assert_eq!(table.pending_deletes().len(), 1);
        assert_eq!(table.execute_deletes(&conn, &Sqlite).unwrap(), 0);
        let stored: i64 = conn
            .query_row("SELECT COUNT(*) FROM orders", [], |r| r.get(0))
            .unwrap();
        assert_eq!(stored, 1);
    }

    #[test]
    fn test_load_with_empty_candidates_returns_nothing() {
        let conn = setup();
        let mut table = orders();
        let mut filter = KeyFilter::new();
        filter.insert("id".to_string(), Vec::new());

        assert_eq!(table.load(&conn, &Sqlite, &filter).unwrap(), 0);
    }
}
