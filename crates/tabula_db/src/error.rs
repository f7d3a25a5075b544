//! Error types for the connection layer.

use thiserror::Error;

/// Connection layer result type.
pub type Result<T> = std::result::Result<T, BackendError>;

/// Errors from database backend operations.
#[derive(Debug, Error)]
pub enum BackendError {
    /// SQLite error (prepare, bind, step, constraint violations, ...)
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error (file system operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Operation requires write access but database is read-only")]
    ReadOnly,

    #[error("Query error: {0}")]
    Query(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Type conversion error: {0}")]
    TypeConversion(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl BackendError {
    /// Create an invalid input error.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a type conversion error.
    pub fn type_conversion(msg: impl Into<String>) -> Self {
        Self::TypeConversion(msg.into())
    }
}
