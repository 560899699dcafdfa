//! Per-schema existence cache
//!
//! The cache answers "is this object registered?" without a round trip when
//! it can, and says so explicitly when it cannot. Probing never fails: I/O
//! errors belong to the caller that performs the query.

use crate::schema::ObjectKind;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// A catalog row as remembered in memory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredObject {
    pub name: String,
    pub unique_id: String,
    pub kind: ObjectKind,
    pub ddl: String,
    pub ddl_checksum: String,
    pub created_at: DateTime<Utc>,
}

/// Outcome of a cache probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Existence {
    /// Registered according to the cache; the physical object still has to be
    /// confirmed before trusting the hit.
    CachedPresent(RegisteredObject),
    /// Known to be absent since the last drop or failed lookup
    CachedAbsent,
    /// Nothing cached; consult the catalog table
    MustQuery,
}

#[derive(Debug, Clone, Default)]
pub struct ExistenceCache {
    entries: HashMap<String, Option<RegisteredObject>>,
}

impl ExistenceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn probe(&self, name: &str) -> Existence {
        match self.entries.get(name) {
            Some(Some(entry)) => Existence::CachedPresent(entry.clone()),
            Some(None) => Existence::CachedAbsent,
            None => Existence::MustQuery,
        }
    }

    pub fn remember_present(&mut self, entry: RegisteredObject) {
        self.entries.insert(entry.name.clone(), Some(entry));
    }

    pub fn remember_absent(&mut self, name: &str) {
        self.entries.insert(name.to_string(), None);
    }

    /// Drop whatever is known about `name`
    pub fn invalidate(&mut self, name: &str) {
        self.entries.remove(name);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of objects cached as present
    pub fn present_count(&self) -> usize {
        self.entries.values().filter(|e| e.is_some()).count()
    }
}
