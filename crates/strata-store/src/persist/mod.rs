//! Master-detail persistence
//!
//! [`Table`] holds rows and their pending changes, [`Module`] arranges
//! tables into a hierarchy and writes it in one transaction.

pub mod hooks;
pub mod module;
pub mod table;

pub use hooks::{NoopSaveHooks, RejectSaveHooks, SaveHooks};
pub use module::{Module, SavePhase, SaveStep, SaveSummary};
pub use table::{KeyFilter, Row, RowId, Table};
