//! Master-detail modules saved and loaded as a unit
//!
//! A module has one main table at level 0, detail tables one level below
//! their master, and reference tables that sit outside the hierarchy.
//!
//! `save` runs inside one transaction:
//! 1. deletes, highest level first
//! 2. updates, highest level first
//! 3. inserts, level 0 first; before a detail table's inserts the resolved
//!    key of each row's master is copied into the row
//!
//! Tables are cloned before the transaction starts and swapped back in only
//! after commit, so a failed save leaves every row and pending change as it
//! was.

use crate::db::Database;
use crate::errors::{from_rusqlite, Result};
use crate::persist::hooks::{NoopSaveHooks, SaveHooks};
use crate::persist::table::{KeyFilter, RowId, Table};
use crate::schema::Schema;
use serde::Serialize;
use std::time::Instant;
use strata_core::errors::StrataError;
use strata_core::model::{Record, Value};
use strata_core::schema::descriptor::DetailDefinition;
use strata_core::schema::ModuleDefinition;
use strata_core::strata_core_types::RequestId;
use strata_core::{log_op_end, log_op_error, log_op_start};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SavePhase {
    Delete,
    Update,
    Insert,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveStep {
    pub table: String,
    pub phase: SavePhase,
    pub rows: usize,
}

/// Statements issued by one save, in execution order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveSummary {
    steps: Vec<SaveStep>,
}

impl SaveSummary {
    pub fn steps(&self) -> &[SaveStep] {
        &self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Rows written in `phase` across all tables
    pub fn count(&self, phase: SavePhase) -> usize {
        self.steps
            .iter()
            .filter(|s| s.phase == phase)
            .map(|s| s.rows)
            .sum()
    }

    /// Tables touched in `phase`, in the order they were processed
    pub fn tables(&self, phase: SavePhase) -> Vec<&str> {
        self.steps
            .iter()
            .filter(|s| s.phase == phase)
            .map(|s| s.table.as_str())
            .collect()
    }

    fn record(&mut self, table: &str, phase: SavePhase, rows: usize) {
        if rows > 0 {
            self.steps.push(SaveStep {
                table: table.to_string(),
                phase,
                rows,
            });
        }
    }
}

pub struct Module {
    name: String,
    main: Option<String>,
    tables: Vec<Table>,
    references: Vec<Table>,
    hooks: Box<dyn SaveHooks>,
}

impl std::fmt::Debug for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Module")
            .field("name", &self.name)
            .field("main", &self.main)
            .field("tables", &self.tables)
            .field("references", &self.references)
            .finish_non_exhaustive()
    }
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            main: None,
            tables: Vec::new(),
            references: Vec::new(),
            hooks: Box::new(NoopSaveHooks),
        }
    }

    /// Build the hierarchy a module descriptor declares over `schema`'s tables
    pub fn from_definition(definition: &ModuleDefinition, schema: &Schema) -> Result<Self> {
        let table_for = |name: &str| -> Result<Table> {
            let object = schema
                .object(name)
                .ok_or_else(|| StrataError::UnknownObject {
                    name: name.to_string(),
                })?;
            Table::from_object(object)
        };

        let mut module = Module::new(&definition.name);
        module.set_main(table_for(&definition.main)?)?;

        // Details may be listed before their masters
        let mut remaining: Vec<&DetailDefinition> = definition.details.iter().collect();
        while !remaining.is_empty() {
            let (ready, deferred): (Vec<&DetailDefinition>, Vec<&DetailDefinition>) = remaining
                .iter()
                .copied()
                .partition(|d| module.has_table(&d.master));
            if ready.is_empty() {
                let stuck = deferred[0];
                return Err(StrataError::UnknownMaster {
                    table: stuck.table.clone(),
                    master: stuck.master.clone(),
                }
                .into());
            }
            for detail in ready {
                let keys: Vec<(&str, &str)> = detail
                    .keys
                    .iter()
                    .map(|(d, m)| (d.as_str(), m.as_str()))
                    .collect();
                module.add_detail(table_for(&detail.table)?, &detail.master, &keys)?;
            }
            remaining = deferred;
        }

        for reference in &definition.references {
            module.add_reference(table_for(reference)?)?;
        }
        Ok(module)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn with_hooks(mut self, hooks: Box<dyn SaveHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn set_hooks(&mut self, hooks: Box<dyn SaveHooks>) {
        self.hooks = hooks;
    }

    // ----- structure -----

    /// Install the level-0 table
    pub fn set_main(&mut self, table: Table) -> Result<()> {
        if let Some(main) = &self.main {
            return Err(StrataError::DuplicateTable {
                table: main.clone(),
            }
            .into());
        }
        self.ensure_new(table.name())?;
        self.main = Some(table.name().to_string());
        self.tables.push(table);
        Ok(())
    }

    /// Add a detail table one level below `master`.
    ///
    /// `keys` maps detail columns to the master columns they copy.
    pub fn add_detail(&mut self, mut table: Table, master: &str, keys: &[(&str, &str)]) -> Result<()> {
        self.ensure_new(table.name())?;
        let master_index = self
            .tables
            .iter()
            .position(|t| t.name() == master)
            .ok_or_else(|| StrataError::UnknownMaster {
                table: table.name().to_string(),
                master: master.to_string(),
            })?;
        if keys.is_empty() {
            return Err(StrataError::InvalidKeyMapping {
                table: table.name().to_string(),
                reason: "no key fields mapped".to_string(),
            }
            .into());
        }
        for (detail_field, master_field) in keys {
            if !table.has_field(detail_field) {
                return Err(StrataError::InvalidKeyMapping {
                    table: table.name().to_string(),
                    reason: format!("no field {}", detail_field),
                }
                .into());
            }
            if !self.tables[master_index].has_field(master_field) {
                return Err(StrataError::InvalidKeyMapping {
                    table: table.name().to_string(),
                    reason: format!("master {} has no field {}", master, master_field),
                }
                .into());
            }
        }

        let level = self.tables[master_index].level() + 1;
        let mapping = keys
            .iter()
            .map(|(d, m)| (d.to_string(), m.to_string()))
            .collect();
        table.set_master(master, level, mapping);
        self.tables[master_index].push_detail(table.name());
        self.tables.push(table);
        Ok(())
    }

    /// Add a lookup table. It is saved with the module but never loaded by it.
    pub fn add_reference(&mut self, table: Table) -> Result<()> {
        self.ensure_new(table.name())?;
        self.references.push(table);
        Ok(())
    }

    pub fn main_table(&self) -> Result<&Table> {
        let main = self.main.as_deref().ok_or(StrataError::MissingMainTable)?;
        self.table(main)
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.tables
            .iter()
            .chain(self.references.iter())
            .any(|t| t.name() == name)
    }

    pub fn table(&self, name: &str) -> Result<&Table> {
        self.tables
            .iter()
            .chain(self.references.iter())
            .find(|t| t.name() == name)
            .ok_or_else(|| {
                StrataError::UnknownTable {
                    table: name.to_string(),
                }
                .into()
            })
    }

    pub fn table_mut(&mut self, name: &str) -> Result<&mut Table> {
        self.tables
            .iter_mut()
            .chain(self.references.iter_mut())
            .find(|t| t.name() == name)
            .ok_or_else(|| {
                StrataError::UnknownTable {
                    table: name.to_string(),
                }
                .into()
            })
    }

    /// Hierarchy tables, main first
    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    pub fn references(&self) -> &[Table] {
        &self.references
    }

    /// Hierarchy table names in insert order
    pub fn level_order(&self) -> Vec<String> {
        level_order(&self.tables)
            .into_iter()
            .map(|i| self.tables[i].name().to_string())
            .collect()
    }

    // ----- changes -----

    pub fn add(&mut self, table: &str, record: Record) -> Result<RowId> {
        self.table_mut(table)?.add(record)
    }

    pub fn add_model<T: Serialize>(&mut self, table: &str, model: &T) -> Result<RowId> {
        self.table_mut(table)?.add_model(model)
    }

    /// Add a detail row belonging to `master_row` of the table's master.
    ///
    /// The master key columns are filled in when the module is saved.
    pub fn add_detail_row(&mut self, table: &str, master_row: RowId, record: Record) -> Result<RowId> {
        let master = self
            .table(table)?
            .master()
            .map(str::to_string)
            .ok_or_else(|| StrataError::InvalidKeyMapping {
                table: table.to_string(),
                reason: "not a detail table".to_string(),
            })?;
        if self.table(&master)?.row(master_row).is_none() {
            return Err(StrataError::UnknownRow {
                table: master,
                row: master_row.get(),
            }
            .into());
        }
        self.table_mut(table)?.add_row(record, Some(master_row))
    }

    pub fn add_detail_model<T: Serialize>(
        &mut self,
        table: &str,
        master_row: RowId,
        model: &T,
    ) -> Result<RowId> {
        let record = Record::from_model(model)?;
        self.add_detail_row(table, master_row, record)
    }

    pub fn set(&mut self, table: &str, row: RowId, field: &str, value: impl Into<Value>) -> Result<()> {
        self.table_mut(table)?.set(row, field, value)
    }

    /// Delete a row together with every detail row linked below it.
    /// Returns the number of rows removed from memory.
    pub fn delete(&mut self, table: &str, row: RowId) -> Result<usize> {
        let mut doomed = Vec::new();
        self.collect_cascade(table, row, &mut doomed)?;
        for (name, id) in &doomed {
            self.table_mut(name)?.delete(*id)?;
        }
        Ok(doomed.len())
    }

    fn collect_cascade(&self, table: &str, row: RowId, out: &mut Vec<(String, RowId)>) -> Result<()> {
        let current = self.table(table)?;
        if current.row(row).is_none() {
            return Err(StrataError::UnknownRow {
                table: table.to_string(),
                row: row.get(),
            }
            .into());
        }
        for detail in current.details() {
            for linked in self.table(detail)?.linked_rows(row) {
                self.collect_cascade(detail, linked, out)?;
            }
        }
        out.push((table.to_string(), row));
        Ok(())
    }

    pub fn has_pending(&self) -> bool {
        self.tables
            .iter()
            .chain(self.references.iter())
            .any(Table::has_pending)
    }

    // ----- persistence -----

    /// Write every pending change in one transaction.
    ///
    /// # Errors
    ///
    /// `MissingMainTable` without a main table; any statement or hook error
    /// rolls the transaction back and leaves the module unchanged.
    pub fn save(&mut self, db: &mut Database) -> Result<SaveSummary> {
        let request_id = RequestId::new();
        log_op_start!("module_save", module = %self.name, request_id = %request_id);
        let start = Instant::now();

        let summary = self.save_impl(db).map_err(|e| {
            let e = e.with_request_id(request_id.clone());
            log_op_error!(
                "module_save",
                e.clone(),
                duration_ms = start.elapsed().as_millis() as u64,
                module = %self.name,
                request_id = %request_id
            );
            e
        })?;

        log_op_end!(
            "module_save",
            duration_ms = start.elapsed().as_millis() as u64,
            request_id = %request_id,
            deletes = summary.count(SavePhase::Delete) as u64,
            updates = summary.count(SavePhase::Update) as u64,
            inserts = summary.count(SavePhase::Insert) as u64
        );
        Ok(summary)
    }

    fn save_impl(&mut self, db: &mut Database) -> Result<SaveSummary> {
        if self.main.is_none() {
            return Err(StrataError::MissingMainTable.into());
        }
        if !self.has_pending() {
            tracing::debug!(module = %self.name, "nothing to save");
            return Ok(SaveSummary::default());
        }

        let mut staged: Vec<Table> = self
            .tables
            .iter()
            .chain(self.references.iter())
            .cloned()
            .collect();
        let order = level_order(&staged);
        let mut summary = SaveSummary::default();

        {
            let (tx, helper) = db.begin()?;
            self.hooks.before_save(&tx)?;

            for &i in order.iter().rev() {
                let rows = staged[i].execute_deletes(&tx, helper)?;
                summary.record(staged[i].name(), SavePhase::Delete, rows);
            }
            for &i in order.iter().rev() {
                let rows = staged[i].execute_updates(&tx, helper)?;
                summary.record(staged[i].name(), SavePhase::Update, rows);
            }
            for &i in &order {
                propagate_master_keys(&mut staged, i)?;
                let rows = staged[i].execute_inserts(&tx, helper)?;
                summary.record(staged[i].name(), SavePhase::Insert, rows);
            }

            tx.commit().map_err(from_rusqlite)?;
        }

        for table in &mut staged {
            table.clear_pending();
        }
        let references = staged.split_off(self.tables.len());
        self.tables = staged;
        self.references = references;

        for step in summary.steps() {
            tracing::debug!(
                module = %self.name,
                table = %step.table,
                phase = ?step.phase,
                rows = step.rows as u64,
                "save step"
            );
        }
        self.hooks.after_save(&summary);
        Ok(summary)
    }

    /// Load main rows by primary key, then every detail level below them
    pub fn load(&mut self, db: &Database, keys: &[Value]) -> Result<usize> {
        let main = self.main_table()?;
        let key_field = match main.key_fields() {
            [single] => single.clone(),
            _ => {
                return Err(StrataError::InvalidKeyMapping {
                    table: main.name().to_string(),
                    reason: "composite primary key; load with a field filter".to_string(),
                }
                .into())
            }
        };
        let mut filter = KeyFilter::new();
        filter.insert(key_field, keys.to_vec());
        self.load_where(db, &filter)
    }

    /// Load main rows matching `filter`, then cascade to the detail tables.
    /// Returns the number of rows loaded across the hierarchy.
    pub fn load_where(&mut self, db: &Database, filter: &KeyFilter) -> Result<usize> {
        log_op_start!("module_load", module = %self.name);
        let start = Instant::now();

        let rows = self.load_impl(db, filter).map_err(|e| {
            log_op_error!(
                "module_load",
                e.clone(),
                duration_ms = start.elapsed().as_millis() as u64,
                module = %self.name
            );
            e
        })?;

        log_op_end!(
            "module_load",
            duration_ms = start.elapsed().as_millis() as u64,
            rows = rows as u64
        );
        Ok(rows)
    }

    fn load_impl(&mut self, db: &Database, filter: &KeyFilter) -> Result<usize> {
        let main = self.main.clone().ok_or(StrataError::MissingMainTable)?;
        let conn = db.connection();
        let helper = db.helper();

        let mut total = self.table_mut(&main)?.load(conn, helper, filter)?;

        for i in level_order(&self.tables) {
            let master = match self.tables[i].master() {
                Some(m) => m.to_string(),
                None => continue,
            };
            let mapping = self.tables[i].master_key_fields().to_vec();
            let master_index = self
                .tables
                .iter()
                .position(|t| t.name() == master)
                .ok_or_else(|| StrataError::UnknownMaster {
                    table: self.tables[i].name().to_string(),
                    master: master.clone(),
                })?;

            let mut detail_filter = KeyFilter::new();
            for (detail_field, master_field) in &mapping {
                let mut candidates: Vec<Value> = Vec::new();
                for row in self.tables[master_index].rows() {
                    let value = row.get(master_field);
                    if !value.is_null() && !candidates.contains(value) {
                        candidates.push(value.clone());
                    }
                }
                detail_filter.insert(detail_field.clone(), candidates);
            }
            self.tables[i].load(conn, helper, &detail_filter)?;

            let master_keys: Vec<(Vec<Value>, RowId)> = self.tables[master_index]
                .rows()
                .iter()
                .map(|r| (mapping.iter().map(|(_, m)| r.get(m).clone()).collect(), r.id()))
                .collect();
            self.tables[i].link_rows(|record| {
                let key: Vec<Value> = mapping.iter().map(|(d, _)| record.get(d).clone()).collect();
                master_keys.iter().find(|(k, _)| *k == key).map(|(_, id)| *id)
            });
            total += self.tables[i].len();
        }
        Ok(total)
    }

    /// Load a reference table on its own
    pub fn load_reference(&mut self, db: &Database, table: &str, filter: &KeyFilter) -> Result<usize> {
        let reference = self
            .references
            .iter_mut()
            .find(|t| t.name() == table)
            .ok_or_else(|| StrataError::UnknownTable {
                table: table.to_string(),
            })?;
        reference.load(db.connection(), db.helper(), filter)
    }

    fn ensure_new(&self, name: &str) -> Result<()> {
        if self.has_table(name) {
            return Err(StrataError::DuplicateTable {
                table: name.to_string(),
            }
            .into());
        }
        Ok(())
    }
}

/// Indexes of `tables` sorted by level; ties keep insertion order
fn level_order(tables: &[Table]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..tables.len()).collect();
    order.sort_by_key(|&i| tables[i].level());
    order
}

/// Copy the resolved master key into every pending insert of a detail table
fn propagate_master_keys(tables: &mut [Table], index: usize) -> Result<()> {
    let master = match tables[index].master() {
        Some(m) => m.to_string(),
        None => return Ok(()),
    };
    let detail = tables[index].name().to_string();
    let mapping = tables[index].master_key_fields().to_vec();
    let master_index = tables
        .iter()
        .position(|t| t.name() == master)
        .ok_or_else(|| StrataError::UnknownMaster {
            table: detail.clone(),
            master: master.clone(),
        })?;

    let violation = || StrataError::ReferentialOrderViolation {
        table: detail.clone(),
        master: master.clone(),
    };
    let mut assignments = Vec::new();
    for id in tables[index].pending_inserts() {
        let row = match tables[index].row(*id) {
            Some(row) => row,
            None => continue,
        };
        // Unlinked rows must already carry their master key
        let master_row = match row.master() {
            Some(m) => m,
            None if mapping.iter().any(|(d, _)| row.get(d).is_null()) => {
                return Err(violation().into());
            }
            None => continue,
        };
        let source = tables[master_index].row(master_row).ok_or_else(violation)?;
        let mut values = Vec::with_capacity(mapping.len());
        for (detail_field, master_field) in &mapping {
            let value = source.get(master_field);
            if value.is_null() {
                return Err(violation().into());
            }
            values.push((detail_field.clone(), value.clone()));
        }
        assignments.push((*id, values));
    }

    for (id, values) in assignments {
        tables[index].assign(id, values)?;
    }
    Ok(())
}
