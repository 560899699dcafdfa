//! Schema execution engine
//!
//! A [`Schema`] owns the dependency graph of its objects and an existence
//! cache, and reconciles both with the catalog table and the physical
//! database:
//!
//! - registered and physically present: skip
//! - registered but physically gone: forget the stale row, then create
//! - unregistered but physically present: register without DDL
//! - absent everywhere: run the DDL and register, in one transaction
//!
//! Objects are executed in topological order and dropped in reverse.

mod verify;

pub use verify::VerifyIssue;

use crate::catalog::{self, CatalogEntry, SchemaInfo};
use crate::db::Database;
use crate::errors::{ddl_error, from_rusqlite, Result};
use chrono::Utc;
use std::collections::HashSet;
use std::time::Instant;
use strata_core::errors::{ExError, ExErrorKind, Failure, StrataError};
use strata_core::model::Action;
use strata_core::schema::{
    AlterOp, Existence, ExistenceCache, ObjectKind, RegisteredObject, SchemaDefinition,
    SchemaGraph, SchemaObject,
};
use strata_core::strata_core_types::RequestId;
use strata_core::{log_op_end, log_op_error, log_op_start};

/// What one execute or drop pass did, object names in execution order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecuteReport {
    pub created: Vec<String>,
    /// Found physically present and registered without running DDL
    pub adopted: Vec<String>,
    pub altered: Vec<String>,
    pub dropped: Vec<String>,
    pub skipped: Vec<String>,
    /// Alter or drop failures that were rolled back and logged
    pub failed: Vec<String>,
    /// DDL statements actually run against the database
    pub ddl_statements: usize,
}

#[derive(Debug, Clone)]
pub struct Schema {
    id: String,
    version: i64,
    description: String,
    graph: SchemaGraph,
    cache: ExistenceCache,
}

enum Resolved {
    Registered(RegisteredObject),
    Unregistered { physical: bool },
}

impl Schema {
    pub fn new(id: impl Into<String>, version: i64) -> Self {
        Self {
            id: id.into(),
            version,
            description: String::new(),
            graph: SchemaGraph::new(),
            cache: ExistenceCache::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Build a schema from a validated descriptor
    pub fn from_definition(definition: &SchemaDefinition) -> Result<Self> {
        Ok(Self {
            id: definition.id.clone(),
            version: definition.version,
            description: definition.description.clone(),
            graph: definition.build_graph()?,
            cache: ExistenceCache::new(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn graph(&self) -> &SchemaGraph {
        &self.graph
    }

    pub fn object(&self, name: &str) -> Option<&SchemaObject> {
        self.graph.get(name)
    }

    pub fn is_created(&self, name: &str) -> bool {
        self.graph.get(name).map(SchemaObject::is_created).unwrap_or(false)
    }

    /// What the existence cache currently knows about `name`
    pub fn existence(&self, name: &str) -> Existence {
        self.cache.probe(name)
    }

    pub fn add_object(&mut self, object: SchemaObject) -> Result<()> {
        self.graph.insert(object)?;
        Ok(())
    }

    /// Add the edge "`from` depends on `to`"
    pub fn add_dependency(&mut self, from: &str, to: &str) -> Result<()> {
        self.graph.add_dependency(from, to)?;
        Ok(())
    }

    pub fn set_action(&mut self, name: &str, action: Action) -> Result<()> {
        self.require_mut(name)?.set_action(action);
        Ok(())
    }

    /// Execute every object, dependencies first.
    ///
    /// # Errors
    ///
    /// A failed create is rolled back and returned; failed alterations and
    /// drops are rolled back, logged and listed in the report.
    pub fn execute(&mut self, db: &mut Database) -> Result<ExecuteReport> {
        let request_id = RequestId::new();
        log_op_start!(
            "schema_execute",
            schema_id = %self.id,
            request_id = %request_id,
            object_count = self.graph.len() as u64
        );
        let start = Instant::now();

        let report = self.execute_impl(db, None).map_err(|e| {
            let e = e.with_request_id(request_id.clone());
            log_op_error!(
                "schema_execute",
                e.clone(),
                duration_ms = start.elapsed().as_millis() as u64,
                request_id = %request_id
            );
            e
        })?;

        log_op_end!(
            "schema_execute",
            duration_ms = start.elapsed().as_millis() as u64,
            request_id = %request_id,
            created = report.created.len() as u64,
            ddl_statements = report.ddl_statements as u64
        );
        Ok(report)
    }

    /// Execute `name` and everything it depends on
    pub fn execute_object(&mut self, db: &mut Database, name: &str) -> Result<ExecuteReport> {
        log_op_start!("schema_execute_object", schema_id = %self.id, object = name);
        let start = Instant::now();

        let report = self.execute_impl(db, Some(name)).map_err(|e| {
            log_op_error!(
                "schema_execute_object",
                e.clone(),
                duration_ms = start.elapsed().as_millis() as u64
            );
            e
        })?;

        log_op_end!(
            "schema_execute_object",
            duration_ms = start.elapsed().as_millis() as u64,
            ddl_statements = report.ddl_statements as u64
        );
        Ok(report)
    }

    /// Drop every object, dependants first, and remove the info row
    pub fn drop(&mut self, db: &mut Database) -> Result<ExecuteReport> {
        log_op_start!("schema_drop", schema_id = %self.id);
        let start = Instant::now();

        let report = self.drop_impl(db, None).map_err(|e| {
            log_op_error!(
                "schema_drop",
                e.clone(),
                duration_ms = start.elapsed().as_millis() as u64
            );
            e
        })?;

        log_op_end!(
            "schema_drop",
            duration_ms = start.elapsed().as_millis() as u64,
            dropped = report.dropped.len() as u64
        );
        Ok(report)
    }

    /// Drop `name` and everything that transitively depends on it
    pub fn drop_object(&mut self, db: &mut Database, name: &str) -> Result<ExecuteReport> {
        log_op_start!("schema_drop_object", schema_id = %self.id, object = name);
        let start = Instant::now();

        let report = self.drop_impl(db, Some(name)).map_err(|e| {
            log_op_error!(
                "schema_drop_object",
                e.clone(),
                duration_ms = start.elapsed().as_millis() as u64
            );
            e
        })?;

        log_op_end!(
            "schema_drop_object",
            duration_ms = start.elapsed().as_millis() as u64,
            dropped = report.dropped.len() as u64
        );
        Ok(report)
    }

    /// Catalog rows registered by this schema
    pub fn registered(&self, db: &Database) -> Result<Vec<CatalogEntry>> {
        catalog::ensure_tables(db.connection())?;
        catalog::list(db.connection(), Some(&self.id))
    }

    pub fn info(&self) -> SchemaInfo {
        SchemaInfo {
            schema_id: self.id.clone(),
            version: self.version,
            description: self.description.clone(),
        }
    }

    // ----- passes -----

    fn execute_impl(&mut self, db: &mut Database, only: Option<&str>) -> Result<ExecuteReport> {
        catalog::ensure_tables(db.connection())?;
        let order = match only {
            Some(name) => self.graph.creation_closure(name)?,
            None => self.graph.topological_order()?,
        };
        tracing::debug!(schema_id = %self.id, order = ?order, "dependencies resolved");

        let mut report = ExecuteReport::default();
        let removed = self.drop_marked(db, &order, &mut report)?;
        for name in order.iter().filter(|n| !removed.contains(*n)) {
            let action = self.require(name)?.action();
            let outcome = match action {
                Action::Create => self.ensure_created(db, name, &mut report),
                Action::Alter => match self.check_alterable(name) {
                    Ok(()) => {
                        // Creating a missing table is still a create and may fail loudly
                        let created = self.ensure_created(db, name, &mut report);
                        self.settle(name, Action::Create, created, &mut report)?;
                        self.alter(db, name, &mut report)
                    }
                    Err(err) => Err(err),
                },
                Action::Drop => continue,
            };
            self.settle(name, action, outcome, &mut report)?;
        }

        catalog::upsert_info(db.connection(), &self.info())?;
        Ok(report)
    }

    fn drop_impl(&mut self, db: &mut Database, only: Option<&str>) -> Result<ExecuteReport> {
        catalog::ensure_tables(db.connection())?;
        let order = match only {
            Some(name) => self.graph.removal_closure(name)?,
            None => self.graph.drop_order()?,
        };
        tracing::debug!(schema_id = %self.id, order = ?order, "drop order resolved");

        let mut report = ExecuteReport::default();
        for name in &order {
            let outcome = self.drop_one(db, name, &mut report);
            self.settle(name, Action::Drop, outcome, &mut report)?;
        }

        if only.is_none() {
            catalog::delete_info(db.connection(), &self.id)?;
        }
        Ok(report)
    }

    /// Drop every object in `order` marked for dropping, together with
    /// everything that depends on it, dependants first.
    fn drop_marked(
        &mut self,
        db: &mut Database,
        order: &[String],
        report: &mut ExecuteReport,
    ) -> Result<HashSet<String>> {
        let mut removed = HashSet::new();
        for name in order.iter().rev() {
            if removed.contains(name) || self.require(name)?.action() != Action::Drop {
                continue;
            }
            for victim in self.graph.removal_closure(name)? {
                if removed.insert(victim.clone()) {
                    let outcome = self.drop_one(db, &victim, report);
                    self.settle(&victim, Action::Drop, outcome, report)?;
                }
            }
        }
        Ok(removed)
    }

    /// Only failed creates propagate; everything else is logged and recorded.
    fn settle(
        &self,
        name: &str,
        action: Action,
        outcome: Result<()>,
        report: &mut ExecuteReport,
    ) -> Result<()> {
        let err = match outcome {
            Ok(()) => return Ok(()),
            Err(err) => err,
        };
        tracing::error!(
            schema_id = %self.id,
            object = name,
            action = ?action,
            ddl = err.sql().unwrap_or_default(),
            err.code = err.code(),
            err.chain = %err.chain(),
            "schema object execution failed"
        );
        match action {
            Action::Create => Err(err),
            Action::Alter | Action::Drop => {
                report.failed.push(name.to_string());
                Ok(())
            }
        }
    }

    // ----- single object -----

    fn ensure_created(
        &mut self,
        db: &mut Database,
        name: &str,
        report: &mut ExecuteReport,
    ) -> Result<()> {
        let object = self.require(name)?;
        if object.is_created() {
            report.skipped.push(name.to_string());
            return Ok(());
        }
        let kind = object.kind();

        match self.resolve(db, name, kind)? {
            Resolved::Registered(entry) => {
                tracing::debug!(object = name, unique_id = %entry.unique_id, "already registered");
                self.remember_created(entry);
                report.skipped.push(name.to_string());
                Ok(())
            }
            Resolved::Unregistered { physical: true } => self.adopt(db, name, report),
            Resolved::Unregistered { physical: false } => self.create(db, name, report),
        }
    }

    /// Find the registration of `name` and confirm it physically.
    ///
    /// A registration whose object no longer exists is removed from both the
    /// cache and the catalog.
    fn resolve(&mut self, db: &Database, name: &str, kind: ObjectKind) -> Result<Resolved> {
        let conn = db.connection();
        let candidate = match self.cache.probe(name) {
            Existence::CachedPresent(entry) => Some(entry),
            Existence::CachedAbsent => None,
            Existence::MustQuery => catalog::lookup(conn, name)?.map(|e| e.object),
        };
        let physical = catalog::physically_exists(conn, db.helper(), kind, name)?;

        match candidate {
            Some(entry) if physical => {
                self.cache.remember_present(entry.clone());
                Ok(Resolved::Registered(entry))
            }
            Some(entry) => {
                tracing::warn!(
                    object = name,
                    unique_id = %entry.unique_id,
                    "registered object no longer exists; discarding registration"
                );
                self.cache.invalidate(name);
                catalog::unregister(conn, name)?;
                if let Some(object) = self.graph.get_mut(name) {
                    object.mark_dropped();
                }
                Ok(Resolved::Unregistered { physical: false })
            }
            None => Ok(Resolved::Unregistered { physical }),
        }
    }

    fn create(&mut self, db: &mut Database, name: &str, report: &mut ExecuteReport) -> Result<()> {
        self.check_dependencies_created(name)?;
        let entry = self.registration(db, name)?;

        let tx = db.transaction()?;
        tx.execute_batch(&entry.ddl)
            .map_err(|e| ddl_error(name, &entry.ddl, e))?;
        catalog::register(&tx, &entry, &self.id)?;
        tx.commit().map_err(from_rusqlite)?;

        tracing::debug!(object = name, unique_id = %entry.unique_id, "created");
        report.created.push(name.to_string());
        report.ddl_statements += 1;
        self.remember_created(entry);
        Ok(())
    }

    fn adopt(&mut self, db: &mut Database, name: &str, report: &mut ExecuteReport) -> Result<()> {
        let entry = self.registration(db, name)?;
        catalog::register(db.connection(), &entry, &self.id)?;

        tracing::debug!(
            object = name,
            unique_id = %entry.unique_id,
            "physically present; registered without DDL"
        );
        report.adopted.push(name.to_string());
        self.remember_created(entry);
        Ok(())
    }

    fn check_alterable(&self, name: &str) -> Result<()> {
        if self.require(name)?.kind() == ObjectKind::View {
            return Err(StrataError::ViewAlterationNotSupported {
                name: name.to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Apply pending column changes that the column probe shows are still
    /// needed. The table must already exist.
    fn alter(&mut self, db: &mut Database, name: &str, report: &mut ExecuteReport) -> Result<()> {
        let object = self.require(name)?;
        let helper = db.helper();
        let conn = db.connection();
        let mut statements = Vec::new();
        for op in object.alter_ops() {
            match op {
                AlterOp::AddColumn(field) => {
                    if !catalog::column_exists(conn, helper, name, &field.name)? {
                        statements.push(helper.add_column(name, &field.definition(helper, false)));
                    }
                }
                AlterOp::DropColumn(column) => {
                    if catalog::column_exists(conn, helper, name, column)? {
                        statements.push(helper.drop_column(name, column));
                    }
                }
            }
        }
        if statements.is_empty() {
            tracing::debug!(object = name, "no column changes pending");
            return Ok(());
        }

        let folded = object.with_alterations_applied();
        let ddl = folded.create_sql(helper)?;
        let checksum = folded.checksum(helper)?;

        let tx = db.transaction()?;
        for sql in &statements {
            tx.execute_batch(sql).map_err(|e| ddl_error(name, sql, e))?;
        }
        catalog::update_ddl(&tx, name, &ddl, &checksum)?;
        tx.commit().map_err(from_rusqlite)?;

        tracing::debug!(object = name, statements = statements.len() as u64, "altered");
        report.altered.push(name.to_string());
        report.ddl_statements += statements.len();
        if let Existence::CachedPresent(mut entry) = self.cache.probe(name) {
            entry.ddl = ddl;
            entry.ddl_checksum = checksum;
            self.cache.remember_present(entry);
        }
        Ok(())
    }

    fn drop_one(&mut self, db: &mut Database, name: &str, report: &mut ExecuteReport) -> Result<()> {
        let kind = self.require(name)?.kind();
        let (registered, physical) = match self.resolve(db, name, kind)? {
            Resolved::Registered(_) => (true, true),
            Resolved::Unregistered { physical } => (false, physical),
        };

        if !physical {
            tracing::warn!(object = name, "drop requested for an object that does not exist");
            self.forget(name);
            report.skipped.push(name.to_string());
            return Ok(());
        }

        let sql = self.require(name)?.drop_sql(db.helper());
        let tx = db.transaction()?;
        tx.execute_batch(&sql).map_err(|e| ddl_error(name, &sql, e))?;
        if registered {
            catalog::unregister(&tx, name)?;
        }
        tx.commit().map_err(from_rusqlite)?;

        tracing::debug!(object = name, "dropped");
        report.dropped.push(name.to_string());
        report.ddl_statements += 1;
        self.forget(name);
        Ok(())
    }

    // ----- helpers -----

    fn require(&self, name: &str) -> Result<&SchemaObject> {
        self.graph.get(name).ok_or_else(|| {
            StrataError::UnknownObject {
                name: name.to_string(),
            }
            .into()
        })
    }

    fn require_mut(&mut self, name: &str) -> Result<&mut SchemaObject> {
        self.graph.get_mut(name).ok_or_else(|| {
            StrataError::UnknownObject {
                name: name.to_string(),
            }
            .into()
        })
    }

    fn check_dependencies_created(&self, name: &str) -> Result<()> {
        for dep in self.require(name)?.dependencies() {
            if !self.is_created(dep) {
                return Err(ExError::new(ExErrorKind::DdlFailure)
                    .with_op("schema_execute")
                    .with_failure(Failure::Dependency)
                    .with_object(name.to_string())
                    .with_message(format!("dependency {} has not been created", dep)));
            }
        }
        Ok(())
    }

    /// Catalog row for a fresh registration of `name`
    fn registration(&self, db: &Database, name: &str) -> Result<RegisteredObject> {
        let object = self.require(name)?.with_alterations_applied();
        let helper = db.helper();
        Ok(RegisteredObject {
            name: name.to_string(),
            unique_id: uuid::Uuid::now_v7().to_string(),
            kind: object.kind(),
            ddl: object.create_sql(helper)?,
            ddl_checksum: object.checksum(helper)?,
            created_at: Utc::now(),
        })
    }

    fn remember_created(&mut self, entry: RegisteredObject) {
        if let Some(object) = self.graph.get_mut(&entry.name) {
            object.mark_created(entry.unique_id.clone());
        }
        self.cache.remember_present(entry);
    }

    fn forget(&mut self, name: &str) {
        if let Some(object) = self.graph.get_mut(name) {
            object.mark_dropped();
        }
        self.cache.remember_absent(name);
    }
}
