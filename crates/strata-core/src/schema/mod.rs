//! Schema objects, their dependency graph and declarative descriptors

pub mod descriptor;
pub mod existence;
pub mod graph;
pub mod object;

pub use descriptor::{ModuleDefinition, SchemaDefinition};
pub use existence::{Existence, ExistenceCache, RegisteredObject};
pub use graph::SchemaGraph;
pub use object::{AlterOp, ObjectKind, SchemaObject};
