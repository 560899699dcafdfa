//! Declarative schema descriptors
//!
//! A descriptor file is the explicit replacement for reflecting over model
//! types: it lists every object with its ordered fields, key declarations
//! and dependencies, plus the module hierarchies built on top of them.
//!
//! ```yaml
//! id: shop
//! version: 1
//! objects:
//!   - name: orders
//!     fields:
//!       - { name: id, type: integer, generated: true }
//!       - { name: customer, type: text(80), nullable: false }
//!     primary_key: [id]
//!   - name: order_lines
//!     fields:
//!       - { name: id, type: integer, generated: true }
//!       - { name: order_id, type: integer, nullable: false }
//!     primary_key: [id]
//!     foreign_keys:
//!       - { fields: [order_id], references: orders, referenced_fields: [id] }
//! modules:
//!   - name: order_entry
//!     main: orders
//!     details:
//!       - { table: order_lines, master: orders, keys: { order_id: id } }
//! ```

use crate::errors::{Result, StrataError};
use crate::model::{Action, Constraint, Field, FieldType, ReferentialAction};
use crate::schema::{ObjectKind, SchemaGraph, SchemaObject};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaDefinition {
    pub id: String,
    #[serde(default = "default_version")]
    pub version: i64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub objects: Vec<ObjectDescriptor>,
    #[serde(default)]
    pub modules: Vec<ModuleDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectDescriptor {
    pub name: String,
    #[serde(default)]
    pub kind: ObjectKind,
    #[serde(default)]
    pub action: Action,
    #[serde(default)]
    pub fields: Vec<FieldDescriptor>,
    #[serde(default)]
    pub primary_key: Vec<String>,
    #[serde(default)]
    pub unique_keys: Vec<UniqueKeyDescriptor>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKeyDescriptor>,
    #[serde(default)]
    pub select: Option<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub add_columns: Vec<FieldDescriptor>,
    #[serde(default)]
    pub drop_columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    #[serde(default)]
    pub generated: bool,
    #[serde(default)]
    pub default: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniqueKeyDescriptor {
    #[serde(default)]
    pub name: Option<String>,
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKeyDescriptor {
    #[serde(default)]
    pub name: Option<String>,
    pub fields: Vec<String>,
    pub references: String,
    pub referenced_fields: Vec<String>,
    #[serde(default)]
    pub on_delete: Option<ReferentialAction>,
}

/// A module hierarchy: one main table, its details and shared lookups
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleDefinition {
    pub name: String,
    pub main: String,
    #[serde(default)]
    pub details: Vec<DetailDefinition>,
    #[serde(default)]
    pub references: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailDefinition {
    pub table: String,
    pub master: String,
    /// Detail column -> master column
    pub keys: BTreeMap<String, String>,
}

fn default_version() -> i64 {
    1
}

fn default_nullable() -> bool {
    true
}

fn invalid(reason: impl Into<String>) -> StrataError {
    StrataError::InvalidDescriptor {
        reason: reason.into(),
    }
}

impl SchemaDefinition {
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let def: Self = serde_yaml::from_str(content)
            .map_err(|e| invalid(format!("YAML parse error: {}", e)))?;
        def.validate()?;
        Ok(def)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let def: Self = serde_json::from_str(content)
            .map_err(|e| invalid(format!("JSON parse error: {}", e)))?;
        def.validate()?;
        Ok(def)
    }

    /// Read a descriptor file; `.json` files are parsed as JSON, anything
    /// else as YAML.
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            invalid(format!(
                "Failed to read descriptor {}: {}",
                path.display(),
                e
            ))
        })?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&content),
            _ => Self::from_yaml_str(&content),
        }
    }

    pub fn object(&self, name: &str) -> Option<&ObjectDescriptor> {
        self.objects.iter().find(|o| o.name == name)
    }

    pub fn module(&self, name: &str) -> Option<&ModuleDefinition> {
        self.modules.iter().find(|m| m.name == name)
    }

    /// Structural validation that does not need the dependency graph
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(invalid("schema id must not be empty"));
        }

        let mut names = HashSet::new();
        for object in &self.objects {
            if !names.insert(object.name.as_str()) {
                return Err(invalid(format!("duplicate object name {}", object.name)));
            }
            object.validate()?;
        }

        for module in &self.modules {
            module.validate(self)?;
        }
        Ok(())
    }

    /// Build the dependency graph of every object.
    ///
    /// # Errors
    ///
    /// Validation errors, `CyclicDependency`, or `UnknownDependency` for an
    /// edge that points outside the descriptor.
    pub fn build_graph(&self) -> Result<SchemaGraph> {
        let mut graph = SchemaGraph::new();
        for object in &self.objects {
            graph.insert(object.to_object()?)?;
        }
        graph.topological_order()?;
        Ok(graph)
    }
}

impl ObjectDescriptor {
    fn validate(&self) -> Result<()> {
        let field_names: HashSet<&str> = self.fields.iter().map(|f| f.name.as_str()).collect();
        let require = |fields: &[String], what: &str| -> Result<()> {
            for f in fields {
                if !field_names.contains(f.as_str()) {
                    return Err(invalid(format!(
                        "{} of {} names unknown field {}",
                        what, self.name, f
                    )));
                }
            }
            Ok(())
        };

        match self.kind {
            ObjectKind::View => {
                if self.select.as_deref().map(str::trim).unwrap_or("").is_empty() {
                    return Err(invalid(format!("view {} has no select", self.name)));
                }
            }
            ObjectKind::Table => {
                if self.fields.is_empty() {
                    return Err(invalid(format!("table {} has no fields", self.name)));
                }
                if field_names.len() != self.fields.len() {
                    return Err(invalid(format!("table {} repeats a field name", self.name)));
                }
                require(&self.primary_key, "primary key")?;
                for uq in &self.unique_keys {
                    require(&uq.fields, "unique key")?;
                }
                for fk in &self.foreign_keys {
                    require(&fk.fields, "foreign key")?;
                    if fk.fields.len() != fk.referenced_fields.len() {
                        return Err(invalid(format!(
                            "foreign key of {} maps {} fields onto {}",
                            self.name,
                            fk.fields.len(),
                            fk.referenced_fields.len()
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Materialize the descriptor as a schema object
    pub fn to_object(&self) -> Result<SchemaObject> {
        let mut object = match self.kind {
            ObjectKind::Table => SchemaObject::table(&self.name),
            ObjectKind::View => SchemaObject::view(
                &self.name,
                self.select.clone().unwrap_or_default(),
            ),
        };

        for f in &self.fields {
            object = object.field(f.to_field());
        }
        if !self.primary_key.is_empty() {
            object = object.primary_key(&as_strs(&self.primary_key));
        }
        for uq in &self.unique_keys {
            let mut c = Constraint::unique(&self.name, &as_strs(&uq.fields));
            if let Some(name) = &uq.name {
                c = c.with_name(name);
            }
            object = object.constraint(c);
        }
        for fk in &self.foreign_keys {
            let mut c = Constraint::foreign_key(
                &self.name,
                &as_strs(&fk.fields),
                &fk.references,
                &as_strs(&fk.referenced_fields),
            );
            if let Some(name) = &fk.name {
                c = c.with_name(name);
            }
            if let Some(rule) = fk.on_delete {
                c = c.on_delete(rule);
            }
            object = object.constraint(c);
            if fk.references != self.name {
                object = object.depends_on(&fk.references);
            }
        }
        for dep in &self.depends_on {
            object = object.depends_on(dep);
        }
        for f in &self.add_columns {
            object = object.add_column(f.to_field());
        }
        for column in &self.drop_columns {
            object = object.drop_column(column);
        }
        Ok(object.with_action(self.action))
    }
}

impl FieldDescriptor {
    pub fn to_field(&self) -> Field {
        let mut field = Field::new(&self.name, self.field_type.clone());
        if !self.nullable {
            field = field.not_null();
        }
        if self.generated {
            field = field.generated();
        }
        if let Some(default) = &self.default {
            field = field.with_default(default);
        }
        field
    }
}

impl ModuleDefinition {
    fn validate(&self, schema: &SchemaDefinition) -> Result<()> {
        let table = |name: &str| -> Result<&ObjectDescriptor> {
            schema
                .object(name)
                .filter(|o| o.kind == ObjectKind::Table)
                .ok_or_else(|| {
                    invalid(format!(
                        "module {} references unknown table {}",
                        self.name, name
                    ))
                })
        };

        table(&self.main)?;
        for r in &self.references {
            table(r)?;
        }
        for detail in &self.details {
            let d = table(&detail.table)?;
            let m = table(&detail.master)?;
            if detail.keys.is_empty() {
                return Err(invalid(format!(
                    "detail {} of module {} maps no keys",
                    detail.table, self.name
                )));
            }
            for (detail_field, master_field) in &detail.keys {
                if !d.fields.iter().any(|f| &f.name == detail_field) {
                    return Err(invalid(format!(
                        "detail {} has no field {}",
                        detail.table, detail_field
                    )));
                }
                if !m.fields.iter().any(|f| &f.name == master_field) {
                    return Err(invalid(format!(
                        "master {} has no field {}",
                        detail.master, master_field
                    )));
                }
            }
        }
        Ok(())
    }
}

fn as_strs(v: &[String]) -> Vec<&str> {
    v.iter().map(String::as_str).collect()
}
