use strata_core_types::{RequestId, TraceId};
use thiserror::Error;

/// Result type alias using StrataError
pub type Result<T> = std::result::Result<T, StrataError>;

// ========== Error Facility ==========

/// Canonical error kind taxonomy
///
/// Each kind maps to a stable error code that can be used for programmatic
/// error handling, testing, and reporting from the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExErrorKind {
    // Structural/Validation
    InvalidInput,
    InvalidDescriptor,
    InvalidFieldType,
    NotFound,
    AlreadyExists,
    MissingPrimaryKey,

    // Schema engine
    CyclicDependency,
    ConstraintAlterationNotSupported,
    DdlFailure,

    // Persistence engine
    MissingMainTable,
    ReferentialOrderViolation,

    // Integration/IO
    ConnectionFailure,
    Config,
    Io,
    Serialization,
    Persistence,

    // Internal
    Internal,
}

impl ExErrorKind {
    /// Get the stable error code for this kind
    pub fn code(&self) -> &'static str {
        match self {
            ExErrorKind::InvalidInput => "ERR_INVALID_INPUT",
            ExErrorKind::InvalidDescriptor => "ERR_INVALID_DESCRIPTOR",
            ExErrorKind::InvalidFieldType => "ERR_INVALID_FIELD_TYPE",
            ExErrorKind::NotFound => "ERR_NOT_FOUND",
            ExErrorKind::AlreadyExists => "ERR_ALREADY_EXISTS",
            ExErrorKind::MissingPrimaryKey => "ERR_MISSING_PRIMARY_KEY",
            ExErrorKind::CyclicDependency => "ERR_CYCLIC_DEPENDENCY",
            ExErrorKind::ConstraintAlterationNotSupported => {
                "ERR_CONSTRAINT_ALTERATION_NOT_SUPPORTED"
            }
            ExErrorKind::DdlFailure => "ERR_DDL_FAILURE",
            ExErrorKind::MissingMainTable => "ERR_MISSING_MAIN_TABLE",
            ExErrorKind::ReferentialOrderViolation => "ERR_REFERENTIAL_ORDER_VIOLATION",
            ExErrorKind::ConnectionFailure => "ERR_CONNECTION_FAILURE",
            ExErrorKind::Config => "ERR_CONFIG",
            ExErrorKind::Io => "ERR_IO",
            ExErrorKind::Serialization => "ERR_SERIALIZATION",
            ExErrorKind::Persistence => "ERR_PERSISTENCE",
            ExErrorKind::Internal => "ERR_INTERNAL",
        }
    }
}

/// Broad failure categories with their human-readable messages.
///
/// Store errors are prefixed with the message of the phase that failed so
/// that a user sees "Failed to insert records: UNIQUE constraint failed ..."
/// rather than the bare driver text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Connect,
    Create,
    Ddl,
    Load,
    Insert,
    Update,
    Delete,
    Save,
    Dependency,
    Execute,
    ObjectLookup,
}

impl Failure {
    pub fn message(&self) -> &'static str {
        match self {
            Failure::Connect => "Failed to connect to the database",
            Failure::Create => "Failed to create schema object",
            Failure::Ddl => "Failed to execute DDL statement",
            Failure::Load => "Failed to load records",
            Failure::Insert => "Failed to insert records",
            Failure::Update => "Failed to update records",
            Failure::Delete => "Failed to delete records",
            Failure::Save => "Failed to save module",
            Failure::Dependency => "Failed to resolve schema dependencies",
            Failure::Execute => "Failed to execute schema",
            Failure::ObjectLookup => "Failed to look up schema object",
        }
    }
}

/// Canonical structured error type
///
/// Carries a classification for programmatic handling plus the context a
/// reader needs to find the failing object: operation, object name and the
/// SQL text that was running.
#[derive(Debug, Clone)]
pub struct ExError {
    kind: ExErrorKind,
    op: Option<String>,
    object: Option<String>,
    sql: Option<String>,
    failure: Option<Failure>,
    request_id: Option<RequestId>,
    trace_id: Option<TraceId>,
    message: String,
    source: Option<Box<ExError>>,
}

impl ExError {
    /// Create a new error with the specified kind
    pub fn new(kind: ExErrorKind) -> Self {
        Self {
            kind,
            op: None,
            object: None,
            sql: None,
            failure: None,
            request_id: None,
            trace_id: None,
            message: String::new(),
            source: None,
        }
    }

    /// Add operation context
    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = Some(op.into());
        self
    }

    /// Add schema object or table name context
    pub fn with_object(mut self, object: impl Into<String>) -> Self {
        self.object = Some(object.into());
        self
    }

    /// Add the SQL text that failed
    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.sql = Some(sql.into());
        self
    }

    /// Tag the error with a failure category
    pub fn with_failure(mut self, failure: Failure) -> Self {
        self.failure = Some(failure);
        self
    }

    pub fn with_request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = Some(request_id);
        self
    }

    pub fn with_trace_id(mut self, trace_id: TraceId) -> Self {
        self.trace_id = Some(trace_id);
        self
    }

    /// Add custom message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Add source error
    pub fn with_source(mut self, source: ExError) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Get the error kind
    pub fn kind(&self) -> ExErrorKind {
        self.kind
    }

    /// Get the stable error code
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    pub fn op(&self) -> Option<&str> {
        self.op.as_deref()
    }

    pub fn object(&self) -> Option<&str> {
        self.object.as_deref()
    }

    pub fn sql(&self) -> Option<&str> {
        self.sql.as_deref()
    }

    pub fn failure(&self) -> Option<Failure> {
        self.failure
    }

    pub fn request_id(&self) -> Option<&RequestId> {
        self.request_id.as_ref()
    }

    pub fn trace_id(&self) -> Option<&TraceId> {
        self.trace_id.as_ref()
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the source error, if any
    pub fn source_error(&self) -> Option<&ExError> {
        self.source.as_deref()
    }

    /// Render this error and every source below it, outermost first.
    pub fn chain(&self) -> String {
        let mut parts = vec![self.to_string()];
        let mut current = self.source_error();
        while let Some(err) = current {
            parts.push(err.to_string());
            current = err.source_error();
        }
        parts.join(" <- ")
    }
}

impl std::fmt::Display for ExError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.code())?;
        if let Some(op) = &self.op {
            write!(f, " in operation '{}'", op)?;
        }
        if let Some(failure) = self.failure {
            write!(f, ": {}", failure.message())?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        if let Some(object) = &self.object {
            write!(f, " (object: {})", object)?;
        }
        Ok(())
    }
}

impl std::error::Error for ExError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

// ========== End Error Facility ==========

/// Domain errors raised by the schema model and the persistence engine
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StrataError {
    // ===== Schema graph =====
    /// Adding an edge or building the graph found a dependency cycle
    #[error("Cyclic dependency detected between schema objects: {}", objects.join(" -> "))]
    CyclicDependency { objects: Vec<String> },

    #[error("Schema object not found: {name}")]
    UnknownObject { name: String },

    #[error("Schema object already defined: {name}")]
    DuplicateObject { name: String },

    #[error("Schema object {object} depends on unknown object {dependency}")]
    UnknownDependency { object: String, dependency: String },

    // ===== Rendering =====
    #[error("Constraint {constraint} cannot be altered: it must be dropped and recreated")]
    ConstraintAlterationNotSupported { constraint: String },

    #[error("Cannot alter view {name}: views must be dropped and recreated")]
    ViewAlterationNotSupported { name: String },

    #[error("Invalid field type '{spec}'")]
    InvalidFieldType { spec: String },

    #[error("Invalid schema descriptor: {reason}")]
    InvalidDescriptor { reason: String },

    #[error("Table {table} has no primary key")]
    MissingPrimaryKey { table: String },

    // ===== Module hierarchy =====
    #[error("Module has no main table")]
    MissingMainTable,

    #[error("Table not found in module: {table}")]
    UnknownTable { table: String },

    #[error("Table already part of module: {table}")]
    DuplicateTable { table: String },

    #[error("Table {table} declares master {master} which is not part of the module")]
    UnknownMaster { table: String, master: String },

    #[error("Invalid master key mapping for table {table}: {reason}")]
    InvalidKeyMapping { table: String, reason: String },

    #[error("Row {row} not found in table {table}")]
    UnknownRow { table: String, row: u64 },

    #[error("Field {field} not found in table {table}")]
    UnknownField { table: String, field: String },

    /// A detail row was about to be written while its master row was still unsaved
    #[error("Detail table {table} written before its master row in {master} was resolved")]
    ReferentialOrderViolation { table: String, master: String },

    // ===== Generic =====
    #[error("Serialization error: {message}")]
    Serialization { message: String },
}

impl From<StrataError> for ExError {
    fn from(err: StrataError) -> Self {
        let message = err.to_string();
        match err {
            StrataError::CyclicDependency { objects } => {
                let first = objects.first().cloned().unwrap_or_default();
                ExError::new(ExErrorKind::CyclicDependency)
                    .with_failure(Failure::Dependency)
                    .with_object(first)
                    .with_message(message)
            }
            StrataError::UnknownObject { name } => ExError::new(ExErrorKind::NotFound)
                .with_failure(Failure::ObjectLookup)
                .with_object(name)
                .with_message(message),
            StrataError::DuplicateObject { name } => ExError::new(ExErrorKind::AlreadyExists)
                .with_object(name)
                .with_message(message),
            StrataError::UnknownDependency { object, .. } => {
                ExError::new(ExErrorKind::InvalidDescriptor)
                    .with_failure(Failure::Dependency)
                    .with_object(object)
                    .with_message(message)
            }
            StrataError::ConstraintAlterationNotSupported { constraint } => {
                ExError::new(ExErrorKind::ConstraintAlterationNotSupported)
                    .with_object(constraint)
                    .with_message(message)
            }
            StrataError::ViewAlterationNotSupported { name } => {
                ExError::new(ExErrorKind::InvalidInput)
                    .with_object(name)
                    .with_message(message)
            }
            StrataError::InvalidFieldType { .. } => {
                ExError::new(ExErrorKind::InvalidFieldType).with_message(message)
            }
            StrataError::InvalidDescriptor { .. } => {
                ExError::new(ExErrorKind::InvalidDescriptor).with_message(message)
            }
            StrataError::MissingPrimaryKey { table } => {
                ExError::new(ExErrorKind::MissingPrimaryKey)
                    .with_object(table)
                    .with_message(message)
            }
            StrataError::MissingMainTable => {
                ExError::new(ExErrorKind::MissingMainTable).with_message(message)
            }
            StrataError::UnknownTable { table }
            | StrataError::UnknownRow { table, .. }
            | StrataError::UnknownField { table, .. } => ExError::new(ExErrorKind::NotFound)
                .with_object(table)
                .with_message(message),
            StrataError::DuplicateTable { table } => ExError::new(ExErrorKind::AlreadyExists)
                .with_object(table)
                .with_message(message),
            StrataError::UnknownMaster { table, .. }
            | StrataError::InvalidKeyMapping { table, .. } => {
                ExError::new(ExErrorKind::InvalidInput)
                    .with_object(table)
                    .with_message(message)
            }
            StrataError::ReferentialOrderViolation { table, .. } => {
                ExError::new(ExErrorKind::ReferentialOrderViolation)
                    .with_failure(Failure::Insert)
                    .with_object(table)
                    .with_message(message)
            }
            StrataError::Serialization { .. } => {
                ExError::new(ExErrorKind::Serialization).with_message(message)
            }
        }
    }
}
