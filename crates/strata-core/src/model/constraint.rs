//! Primary, foreign and unique key constraints
//!
//! Constraints render two kinds of SQL: the inline definition placed inside
//! `CREATE TABLE`, and a standalone statement driven by the constraint's own
//! action. Only `Create` and `Drop` have a standalone form; changing a key
//! means dropping it and creating the new one.

use crate::dialect::DdlHelper;
use crate::errors::{Result, StrataError};
use serde::{Deserialize, Serialize};

/// DDL intent attached to schema objects and constraints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    #[default]
    Create,
    Alter,
    Drop,
}

/// Behaviour of a foreign key when the referenced row is deleted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferentialAction {
    Cascade,
    Restrict,
    SetNull,
    NoAction,
}

impl ReferentialAction {
    fn as_sql(&self) -> &'static str {
        match self {
            ReferentialAction::Cascade => "CASCADE",
            ReferentialAction::Restrict => "RESTRICT",
            ReferentialAction::SetNull => "SET NULL",
            ReferentialAction::NoAction => "NO ACTION",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConstraintKind {
    PrimaryKey,
    ForeignKey {
        references: String,
        referenced_fields: Vec<String>,
        on_delete: Option<ReferentialAction>,
    },
    Unique,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    pub name: String,
    pub table: String,
    pub kind: ConstraintKind,
    pub fields: Vec<String>,
    pub action: Action,
}

impl Constraint {
    /// Primary key named `pk_<table>`
    pub fn primary_key(table: &str, fields: &[&str]) -> Self {
        Self {
            name: format!("pk_{}", table),
            table: table.to_string(),
            kind: ConstraintKind::PrimaryKey,
            fields: to_owned(fields),
            action: Action::Create,
        }
    }

    /// Foreign key named `fk_<table>_<references>`
    pub fn foreign_key(
        table: &str,
        fields: &[&str],
        references: &str,
        referenced_fields: &[&str],
    ) -> Self {
        Self {
            name: format!("fk_{}_{}", table, references),
            table: table.to_string(),
            kind: ConstraintKind::ForeignKey {
                references: references.to_string(),
                referenced_fields: to_owned(referenced_fields),
                on_delete: None,
            },
            fields: to_owned(fields),
            action: Action::Create,
        }
    }

    /// Unique key named `uq_<table>_<fields>`
    pub fn unique(table: &str, fields: &[&str]) -> Self {
        Self {
            name: format!("uq_{}_{}", table, fields.join("_")),
            table: table.to_string(),
            kind: ConstraintKind::Unique,
            fields: to_owned(fields),
            action: Action::Create,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.action = action;
        self
    }

    /// Set the ON DELETE behaviour. Ignored for non-foreign keys.
    pub fn on_delete(mut self, rule: ReferentialAction) -> Self {
        if let ConstraintKind::ForeignKey { on_delete, .. } = &mut self.kind {
            *on_delete = Some(rule);
        }
        self
    }

    pub fn is_primary_key(&self) -> bool {
        matches!(self.kind, ConstraintKind::PrimaryKey)
    }

    /// Name of the referenced object for foreign keys
    pub fn references(&self) -> Option<&str> {
        match &self.kind {
            ConstraintKind::ForeignKey { references, .. } => Some(references),
            _ => None,
        }
    }

    /// Inline definition, e.g. `CONSTRAINT "pk_orders" PRIMARY KEY ("id")`
    pub fn definition(&self, helper: &dyn DdlHelper) -> String {
        let columns = quote_list(helper, &self.fields);
        let body = match &self.kind {
            ConstraintKind::PrimaryKey => format!("PRIMARY KEY ({})", columns),
            ConstraintKind::Unique => format!("UNIQUE ({})", columns),
            ConstraintKind::ForeignKey {
                references,
                referenced_fields,
                on_delete,
            } => {
                let mut sql = format!(
                    "FOREIGN KEY ({}) REFERENCES {} ({})",
                    columns,
                    helper.quote(references),
                    quote_list(helper, referenced_fields)
                );
                if let Some(rule) = on_delete {
                    sql.push_str(" ON DELETE ");
                    sql.push_str(rule.as_sql());
                }
                sql
            }
        };
        format!("CONSTRAINT {} {}", helper.quote(&self.name), body)
    }

    /// Standalone statement for this constraint's action.
    ///
    /// # Errors
    ///
    /// `ConstraintAlterationNotSupported` when the action is `Alter`.
    pub fn to_sql(&self, helper: &dyn DdlHelper) -> Result<String> {
        match self.action {
            Action::Create => Ok(format!(
                "ALTER TABLE {} ADD {}",
                helper.quote(&self.table),
                self.definition(helper)
            )),
            Action::Drop => Ok(format!(
                "ALTER TABLE {} DROP CONSTRAINT {}",
                helper.quote(&self.table),
                helper.quote(&self.name)
            )),
            Action::Alter => Err(StrataError::ConstraintAlterationNotSupported {
                constraint: self.name.clone(),
            }),
        }
    }
}

fn to_owned(fields: &[&str]) -> Vec<String> {
    fields.iter().map(|f| f.to_string()).collect()
}

fn quote_list(helper: &dyn DdlHelper, names: &[String]) -> String {
    names
        .iter()
        .map(|n| helper.quote(n))
        .collect::<Vec<_>>()
        .join(", ")
}
