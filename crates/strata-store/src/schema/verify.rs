//! Drift verification between the definition, the catalog and the database

use super::Schema;
use crate::catalog;
use crate::db::Database;
use crate::errors::Result;
use strata_core::model::Action;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyIssue {
    /// Defined but never registered
    NotRegistered { name: String },
    /// Registered, but the physical object is gone
    Missing { name: String },
    /// The rendered DDL no longer matches the registered checksum
    Drifted {
        name: String,
        registered: String,
        rendered: String,
    },
}

impl VerifyIssue {
    pub fn name(&self) -> &str {
        match self {
            VerifyIssue::NotRegistered { name }
            | VerifyIssue::Missing { name }
            | VerifyIssue::Drifted { name, .. } => name,
        }
    }
}

impl std::fmt::Display for VerifyIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerifyIssue::NotRegistered { name } => write!(f, "{}: not registered", name),
            VerifyIssue::Missing { name } => {
                write!(f, "{}: registered but missing from the database", name)
            }
            VerifyIssue::Drifted {
                name,
                registered,
                rendered,
            } => write!(
                f,
                "{}: definition changed (registered {}, now {})",
                name,
                &registered[..registered.len().min(12)],
                &rendered[..rendered.len().min(12)]
            ),
        }
    }
}

impl Schema {
    /// Compare every object that should exist with its catalog row and the
    /// database. Reads only; the cache is left alone.
    pub fn verify(&self, db: &Database) -> Result<Vec<VerifyIssue>> {
        catalog::ensure_tables(db.connection())?;
        let helper = db.helper();
        let mut issues = Vec::new();

        for name in self.graph.topological_order()? {
            let object = self.require(&name)?;
            if object.action() == Action::Drop {
                continue;
            }
            let entry = match catalog::lookup(db.connection(), &name)? {
                Some(entry) => entry.object,
                None => {
                    issues.push(VerifyIssue::NotRegistered { name });
                    continue;
                }
            };
            if !catalog::physically_exists(db.connection(), helper, object.kind(), &name)? {
                issues.push(VerifyIssue::Missing { name });
                continue;
            }
            let rendered = object.with_alterations_applied().checksum(helper)?;
            if rendered != entry.ddl_checksum {
                issues.push(VerifyIssue::Drifted {
                    name,
                    registered: entry.ddl_checksum,
                    rendered,
                });
            }
        }

        tracing::debug!(schema_id = %self.id, issues = issues.len() as u64, "schema verified");
        Ok(issues)
    }
}
