//! Schema objects: tables and views with their fields, constraints and
//! dependency edges.

use crate::dialect::DdlHelper;
use crate::errors::{Result, StrataError};
use crate::model::{Action, Constraint, Field, FieldType, ReferentialAction};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    #[default]
    Table,
    View,
}

impl ObjectKind {
    /// Name stored in the catalog's object type column
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Table => "table",
            ObjectKind::View => "view",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "table" => Some(ObjectKind::Table),
            "view" => Some(ObjectKind::View),
            _ => None,
        }
    }
}

/// A column change applied when an existing table is executed with `Action::Alter`
#[derive(Debug, Clone, PartialEq)]
pub enum AlterOp {
    AddColumn(Field),
    DropColumn(String),
}

/// A named table or view.
///
/// Dependency edges are read-only here; they are kept mutually consistent by
/// the owning [`SchemaGraph`](crate::schema::SchemaGraph).
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaObject {
    sql_name: String,
    kind: ObjectKind,
    unique_key: Option<String>,
    fields: Vec<Field>,
    constraints: Vec<Constraint>,
    select: Option<String>,
    pub(crate) depends_on: Vec<String>,
    pub(crate) depended_on_by: Vec<String>,
    action: Action,
    alter_ops: Vec<AlterOp>,
    is_created: bool,
}

impl SchemaObject {
    pub fn table(name: impl Into<String>) -> Self {
        Self::new(name.into(), ObjectKind::Table, None)
    }

    pub fn view(name: impl Into<String>, select: impl Into<String>) -> Self {
        Self::new(name.into(), ObjectKind::View, Some(select.into()))
    }

    fn new(sql_name: String, kind: ObjectKind, select: Option<String>) -> Self {
        Self {
            sql_name,
            kind,
            unique_key: None,
            fields: Vec::new(),
            constraints: Vec::new(),
            select,
            depends_on: Vec::new(),
            depended_on_by: Vec::new(),
            action: Action::Create,
            alter_ops: Vec::new(),
            is_created: false,
        }
    }

    // ----- builder -----

    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Declare the primary key. Key columns become NOT NULL.
    pub fn primary_key(mut self, fields: &[&str]) -> Self {
        for f in self.fields.iter_mut() {
            if fields.contains(&f.name.as_str()) {
                f.nullable = false;
            }
        }
        self.constraints.retain(|c| !c.is_primary_key());
        self.constraints
            .push(Constraint::primary_key(&self.sql_name, fields));
        self
    }

    pub fn unique(mut self, fields: &[&str]) -> Self {
        self.constraints.push(Constraint::unique(&self.sql_name, fields));
        self
    }

    /// Declare a foreign key; the referenced object becomes a dependency.
    pub fn foreign_key(
        mut self,
        fields: &[&str],
        references: &str,
        referenced_fields: &[&str],
        on_delete: Option<ReferentialAction>,
    ) -> Self {
        let mut fk = Constraint::foreign_key(&self.sql_name, fields, references, referenced_fields);
        if let Some(rule) = on_delete {
            fk = fk.on_delete(rule);
        }
        self.constraints.push(fk);
        if references != self.sql_name {
            self = self.depends_on(references);
        }
        self
    }

    pub fn constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    /// Declare a dependency by name. Duplicates are ignored.
    pub fn depends_on(mut self, name: &str) -> Self {
        if !self.depends_on.iter().any(|d| d == name) {
            self.depends_on.push(name.to_string());
        }
        self
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.action = action;
        self
    }

    pub fn add_column(mut self, field: Field) -> Self {
        self.alter_ops.push(AlterOp::AddColumn(field));
        self
    }

    pub fn drop_column(mut self, column: &str) -> Self {
        self.alter_ops.push(AlterOp::DropColumn(column.to_string()));
        self
    }

    // ----- accessors -----

    pub fn sql_name(&self) -> &str {
        &self.sql_name
    }

    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    pub fn unique_key(&self) -> Option<&str> {
        self.unique_key.as_deref()
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field_named(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn select(&self) -> Option<&str> {
        self.select.as_deref()
    }

    pub fn dependencies(&self) -> &[String] {
        &self.depends_on
    }

    pub fn dependants(&self) -> &[String] {
        &self.depended_on_by
    }

    pub fn action(&self) -> Action {
        self.action
    }

    pub fn set_action(&mut self, action: Action) {
        self.action = action;
    }

    pub fn alter_ops(&self) -> &[AlterOp] {
        &self.alter_ops
    }

    pub fn is_created(&self) -> bool {
        self.is_created
    }

    /// Primary key columns, in declaration order
    pub fn key_fields(&self) -> Vec<String> {
        self.constraints
            .iter()
            .find(|c| c.is_primary_key())
            .map(|c| c.fields.clone())
            .unwrap_or_default()
    }

    /// The database-generated column, if the table has one
    pub fn generated_field(&self) -> Option<&Field> {
        self.fields.iter().find(|f| f.generated)
    }

    // ----- lifecycle -----

    /// Record the object as created and registered under `unique_key`
    pub fn mark_created(&mut self, unique_key: impl Into<String>) {
        self.unique_key = Some(unique_key.into());
        self.is_created = true;
    }

    /// Forget registration after the object was dropped
    pub fn mark_dropped(&mut self) {
        self.unique_key = None;
        self.is_created = false;
    }

    /// The definition as it stands once pending column changes are applied.
    ///
    /// Its create statement is what gets registered after an alteration.
    pub fn with_alterations_applied(&self) -> SchemaObject {
        let mut folded = self.clone();
        for op in &self.alter_ops {
            match op {
                AlterOp::AddColumn(field) => {
                    if folded.field_named(&field.name).is_none() {
                        folded.fields.push(field.clone());
                    }
                }
                AlterOp::DropColumn(column) => folded.fields.retain(|f| &f.name != column),
            }
        }
        folded.alter_ops.clear();
        folded
    }

    // ----- rendering -----

    /// `CREATE TABLE` / `CREATE VIEW` statement
    pub fn create_sql(&self, helper: &dyn DdlHelper) -> Result<String> {
        match self.kind {
            ObjectKind::View => {
                let select = self.select.as_deref().ok_or_else(|| {
                    StrataError::InvalidDescriptor {
                        reason: format!("view {} has no select statement", self.sql_name),
                    }
                })?;
                Ok(format!(
                    "CREATE VIEW {} AS {}",
                    helper.quote(&self.sql_name),
                    select.trim().trim_end_matches(';')
                ))
            }
            ObjectKind::Table => {
                if self.fields.is_empty() {
                    return Err(StrataError::InvalidDescriptor {
                        reason: format!("table {} has no fields", self.sql_name),
                    });
                }
                let inline_key = self.inline_identity_key(helper);
                self.check_generated_fields(helper, inline_key)?;
                let mut lines: Vec<String> = self
                    .fields
                    .iter()
                    .map(|f| {
                        let inline = inline_key == Some(f.name.as_str());
                        f.definition(helper, inline)
                    })
                    .collect();
                for c in &self.constraints {
                    match c.action {
                        Action::Alter => {
                            return Err(StrataError::ConstraintAlterationNotSupported {
                                constraint: c.name.clone(),
                            })
                        }
                        Action::Drop => continue,
                        Action::Create => {}
                    }
                    if inline_key.is_some() && c.is_primary_key() {
                        continue;
                    }
                    lines.push(c.definition(helper));
                }
                Ok(format!(
                    "CREATE TABLE {} (\n  {}\n)",
                    helper.quote(&self.sql_name),
                    lines.join(",\n  ")
                ))
            }
        }
    }

    pub fn drop_sql(&self, helper: &dyn DdlHelper) -> String {
        let keyword = match self.kind {
            ObjectKind::Table => "TABLE",
            ObjectKind::View => "VIEW",
        };
        format!("DROP {} {}", keyword, helper.quote(&self.sql_name))
    }

    /// Column alterations for `Action::Alter`
    pub fn alter_sql(&self, helper: &dyn DdlHelper) -> Result<Vec<String>> {
        if self.kind == ObjectKind::View {
            return Err(StrataError::ViewAlterationNotSupported {
                name: self.sql_name.clone(),
            });
        }
        Ok(self
            .alter_ops
            .iter()
            .map(|op| match op {
                AlterOp::AddColumn(field) => {
                    helper.add_column(&self.sql_name, &field.definition(helper, false))
                }
                AlterOp::DropColumn(column) => helper.drop_column(&self.sql_name, column),
            })
            .collect())
    }

    /// SHA-256 of the create statement, used to detect definition drift
    pub fn checksum(&self, helper: &dyn DdlHelper) -> Result<String> {
        let sql = self.create_sql(helper)?;
        Ok(hex::encode(Sha256::digest(sql.as_bytes())))
    }

    /// Engines that only allow identity on the key column accept exactly one
    /// generated field: the single-column integer primary key.
    fn check_generated_fields(&self, helper: &dyn DdlHelper, inline_key: Option<&str>) -> Result<()> {
        if !helper.identity_is_primary_key() {
            return Ok(());
        }
        for field in self.fields.iter().filter(|f| f.generated) {
            let reason = if inline_key != Some(field.name.as_str()) {
                "must be the only primary key column"
            } else if field.field_type != FieldType::Integer {
                "must be an integer"
            } else {
                continue;
            };
            return Err(StrataError::InvalidDescriptor {
                reason: format!(
                    "generated field {}.{} {} for {}",
                    self.sql_name,
                    field.name,
                    reason,
                    helper.name()
                ),
            });
        }
        Ok(())
    }

    /// Name of the single generated key column when the engine declares it inline
    fn inline_identity_key(&self, helper: &dyn DdlHelper) -> Option<&str> {
        if !helper.identity_is_primary_key() {
            return None;
        }
        let pk = self.constraints.iter().find(|c| c.is_primary_key())?;
        match pk.fields.as_slice() {
            [only] => self
                .field_named(only)
                .filter(|f| f.generated)
                .map(|f| f.name.as_str()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{Postgres, Sqlite};

    fn orders() -> SchemaObject {
        SchemaObject::table("orders")
            .field(Field::new("id", FieldType::Integer).generated())
            .field(Field::new("customer", FieldType::Text(Some(80))).not_null())
            .primary_key(&["id"])
    }

    #[test]
    fn test_create_table_sqlite_inlines_identity_key() {
        let sql = orders().create_sql(&Sqlite).unwrap();
        assert_eq!(
            sql,
            "CREATE TABLE \"orders\" (\n  \"id\" INTEGER PRIMARY KEY AUTOINCREMENT,\n  \"customer\" TEXT NOT NULL\n)"
        );
    }

    #[test]
    fn test_sqlite_rejects_generated_field_outside_the_key() {
        let obj = SchemaObject::table("tickets")
            .field(Field::new("id", FieldType::Integer).generated())
            .field(Field::new("seq", FieldType::Integer).generated())
            .primary_key(&["id"]);
        let err = obj.create_sql(&Sqlite).unwrap_err();
        assert!(matches!(
            err,
            StrataError::InvalidDescriptor { ref reason } if reason.contains("tickets.seq")
        ));

        let composite = SchemaObject::table("slots")
            .field(Field::new("id", FieldType::Integer).generated())
            .field(Field::new("day", FieldType::Integer))
            .primary_key(&["id", "day"]);
        assert!(composite.create_sql(&Sqlite).is_err());

        let text_key = SchemaObject::table("codes")
            .field(Field::new("code", FieldType::Text(None)).generated())
            .primary_key(&["code"]);
        assert!(text_key.create_sql(&Sqlite).is_err());

        // Identity columns outside the key are fine where the engine allows them
        assert!(obj.create_sql(&Postgres).is_ok());
    }

    #[test]
    fn test_create_table_postgres_keeps_constraint() {
        let sql = orders().create_sql(&Postgres).unwrap();
        assert!(sql.contains("\"id\" INTEGER GENERATED BY DEFAULT AS IDENTITY NOT NULL"));
        assert!(sql.contains("CONSTRAINT \"pk_orders\" PRIMARY KEY (\"id\")"));
    }

    #[test]
    fn test_foreign_key_adds_dependency() {
        let lines = SchemaObject::table("order_lines")
            .field(Field::new("id", FieldType::Integer).generated())
            .field(Field::new("order_id", FieldType::Integer).not_null())
            .primary_key(&["id"])
            .foreign_key(&["order_id"], "orders", &["id"], None);

        assert_eq!(lines.dependencies(), &["orders".to_string()]);
        let sql = lines.create_sql(&Sqlite).unwrap();
        assert!(sql.contains("FOREIGN KEY (\"order_id\") REFERENCES \"orders\" (\"id\")"));
    }

    #[test]
    fn test_self_reference_is_not_a_dependency() {
        let tree = SchemaObject::table("nodes")
            .field(Field::new("id", FieldType::Integer))
            .field(Field::new("parent_id", FieldType::Integer))
            .primary_key(&["id"])
            .foreign_key(&["parent_id"], "nodes", &["id"], None);
        assert!(tree.dependencies().is_empty());
    }

    #[test]
    fn test_view_sql_and_alter_rejection() {
        let view = SchemaObject::view("open_orders", "SELECT * FROM orders;").depends_on("orders");
        assert_eq!(
            view.create_sql(&Sqlite).unwrap(),
            "CREATE VIEW \"open_orders\" AS SELECT * FROM orders"
        );
        assert_eq!(view.drop_sql(&Sqlite), "DROP VIEW \"open_orders\"");
        assert!(view.alter_sql(&Sqlite).is_err());
    }

    #[test]
    fn test_alter_sql_renders_column_ops() {
        let altered = orders()
            .with_action(Action::Alter)
            .add_column(Field::new("note", FieldType::Text(None)))
            .drop_column("legacy");
        let stmts = altered.alter_sql(&Sqlite).unwrap();
        assert_eq!(
            stmts,
            vec![
                "ALTER TABLE \"orders\" ADD COLUMN \"note\" TEXT".to_string(),
                "ALTER TABLE \"orders\" DROP COLUMN \"legacy\"".to_string(),
            ]
        );
    }

    #[test]
    fn test_alterations_fold_into_fields() {
        let folded = orders()
            .add_column(Field::new("note", FieldType::Text(None)))
            .drop_column("customer")
            .with_alterations_applied();
        let names: Vec<&str> = folded.fields().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["id", "note"]);
        assert!(folded.alter_ops().is_empty());
    }

    #[test]
    fn test_lifecycle_flags() {
        let mut obj = orders();
        assert!(!obj.is_created());
        obj.mark_created("k1");
        assert_eq!(obj.unique_key(), Some("k1"));
        obj.mark_dropped();
        assert!(obj.unique_key().is_none());
        assert!(!obj.is_created());
    }

    #[test]
    fn test_checksum_changes_with_definition() {
        let a = orders().checksum(&Sqlite).unwrap();
        let b = orders()
            .field(Field::new("note", FieldType::Text(None)))
            .checksum(&Sqlite)
            .unwrap();
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
    }

    #[test]
    fn test_create_rejects_constraint_marked_for_alter() {
        let obj = orders().constraint(
            Constraint::unique("orders", &["customer"]).with_action(Action::Alter),
        );
        let err = obj.create_sql(&Sqlite).unwrap_err();
        assert!(matches!(
            err,
            StrataError::ConstraintAlterationNotSupported { ref constraint } if constraint == "uq_orders_customer"
        ));
    }
}
