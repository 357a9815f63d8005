//! Error types for a3s-audit

use thiserror::Error;

/// Errors that can occur while wiring or backing the audit interceptor
///
/// The interceptor itself never returns these to the caller of a primary
/// mutation. They surface from registration, backend construction, and
/// the session traits the interceptor consumes.
#[derive(Debug, Error)]
pub enum AuditError {
    /// Backend connection failure
    #[error("Connection error: {0}")]
    Connection(String),

    /// Backend query failure
    #[error("Database error: {0}")]
    Database(String),

    /// Serialization/deserialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Row not found for a primary-key predicate
    #[error("Not found: {0}")]
    NotFound(String),

    /// Row already exists for a primary-key predicate
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Hook rejected by the registry (empty name, unknown anchor)
    #[error("Invalid hook: {0}")]
    InvalidHook(String),

    /// Hook name already registered at this lifecycle point
    #[error("Hook '{name}' is already registered for {point}")]
    DuplicateHook { point: String, name: String },

    /// Prior-state lookup failure
    #[error("Lookup on table '{table}' failed: {reason}")]
    Lookup { table: String, reason: String },

    /// Audit record insert failure
    #[error("Failed to persist audit record for table '{table}': {reason}")]
    Persist { table: String, reason: String },
}

impl From<tokio_postgres::Error> for AuditError {
    fn from(e: tokio_postgres::Error) -> Self {
        AuditError::Database(e.to_string())
    }
}

impl From<deadpool_postgres::PoolError> for AuditError {
    fn from(e: deadpool_postgres::PoolError) -> Self {
        AuditError::Connection(e.to_string())
    }
}

/// Result type alias for audit operations
pub type Result<T> = std::result::Result<T, AuditError>;
