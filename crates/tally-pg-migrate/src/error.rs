//! Error types for the migration engine.

use thiserror::Error;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Source or target unreachable, or a timeout elapsed.
    /// Retried with backoff; fatal for the run after exhaustion.
    #[error("Connectivity error ({context}): {message}")]
    Connectivity { context: String, message: String },

    /// Target database query error
    #[error("Target database error: {0}")]
    Target(#[from] tokio_postgres::Error),

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// A field value could not be converted to its typed representation.
    /// Recorded per record; never aborts the run.
    #[error("Cannot coerce field {field} value '{value}': {message}")]
    Coercion {
        field: String,
        value: String,
        message: String,
    },

    /// Batch validation failed in a way that prevents loading
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Store-side failure while persisting a chunk
    #[error("Persistence failed for {kind}: {message}")]
    Persistence { kind: String, message: String },

    /// Store-side uniqueness conflict the validator did not anticipate
    /// (concurrent external writer). Gets one retry after a key-map
    /// refresh.
    #[error("Persistence conflict for {kind}: {message}")]
    PersistenceConflict { kind: String, message: String },

    /// Migration was cancelled (SIGINT, etc.)
    #[error("Migration cancelled")]
    Cancelled,

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MigrateError {
    /// Create a Connectivity error with context about where it occurred
    pub fn connectivity(context: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Connectivity {
            context: context.into(),
            message: message.into(),
        }
    }

    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl Into<String>, context: impl Into<String>) -> Self {
        MigrateError::Pool {
            message: message.into(),
            context: context.into(),
        }
    }

    /// Create a Persistence error for an entity kind
    pub fn persistence(kind: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Persistence {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Create a PersistenceConflict error for an entity kind
    pub fn conflict(kind: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::PersistenceConflict {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Whether a bounded retry with backoff is worthwhile.
    ///
    /// Connection-level failures are transient; coercion, validation and
    /// configuration problems are not and retrying them only wastes time.
    pub fn is_transient(&self) -> bool {
        match self {
            MigrateError::Connectivity { .. } | MigrateError::Pool { .. } => true,
            MigrateError::Target(e) => {
                if e.is_closed() {
                    return true;
                }
                // Class 08 = connection exception, 40001/40P01 = serialization
                // failure / deadlock. Everything else is a real query problem.
                e.code().map_or(false, |c| {
                    c.code().starts_with("08") || c.code() == "40001" || c.code() == "40P01"
                })
            }
            _ => false,
        }
    }

    /// Whether this is a store-side uniqueness conflict that validation did
    /// not anticipate (concurrent external writer). Gets one retry after a
    /// key-map refresh, per the persistence-conflict policy.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            MigrateError::PersistenceConflict { .. } => true,
            MigrateError::Target(e) => e.code().map_or(false, |c| c.code() == "23505"),
            _ => false,
        }
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
