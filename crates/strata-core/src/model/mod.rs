//! Relational model: values, records, fields and key constraints

pub mod constraint;
pub mod field;
pub mod record;
pub mod value;

pub use constraint::{Action, Constraint, ConstraintKind, ReferentialAction};
pub use field::{Field, FieldType};
pub use record::Record;
pub use value::Value;
