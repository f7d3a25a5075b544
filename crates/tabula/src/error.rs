//! Error types for table reconciliation.

use tabula_db::{BackendError, IdentError};
use thiserror::Error;

use crate::infer::StorageType;

/// Reconciliation result type.
pub type Result<T> = std::result::Result<T, ReconcileError>;

/// Errors raised by insert, upsert, update and the read helpers.
///
/// Caller-input errors are detected before any statement runs. Engine
/// failures arrive unchanged inside [`ReconcileError::Database`].
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Upsert into '{table}' requires a primary key (pass pk or hash_id)")]
    PrimaryKeyRequired { table: String },

    #[error("Not found in '{table}': {detail}")]
    NotFound { table: String, detail: String },

    #[error(
        "Record contains columns not present in table '{table}': {}",
        columns.join(", ")
    )]
    SchemaMismatch { table: String, columns: Vec<String> },

    #[error("Column '{column}' of '{table}' mixes {existing} and {incoming} values")]
    ColumnTypeConflict {
        table: String,
        column: String,
        existing: StorageType,
        incoming: StorageType,
    },

    #[error("Integer {value} in column '{column}' of '{table}' exceeds the signed 64-bit range")]
    IntegerOverflow {
        table: String,
        column: String,
        value: u64,
    },

    #[error("Column '{column}' of '{table}' holds a NaN or infinite float")]
    NonFiniteReal { table: String, column: String },

    #[error("Table '{table}': {source}")]
    InvalidIdentifier {
        table: String,
        #[source]
        source: IdentError,
    },

    #[error("Cannot add NOT NULL to existing or added column '{column}' of '{table}'")]
    NotNullUnsupported { table: String, column: String },

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Database error: {0}")]
    Database(#[from] BackendError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ReconcileError {
    pub(crate) fn not_found(table: &str, detail: impl Into<String>) -> Self {
        Self::NotFound {
            table: table.to_string(),
            detail: detail.into(),
        }
    }

    pub(crate) fn invalid_identifier(table: &str, source: IdentError) -> Self {
        Self::InvalidIdentifier {
            table: table.to_string(),
            source,
        }
    }

    /// Table the error refers to, when it is tied to one.
    pub fn table(&self) -> Option<&str> {
        match self {
            Self::PrimaryKeyRequired { table }
            | Self::NotFound { table, .. }
            | Self::SchemaMismatch { table, .. }
            | Self::ColumnTypeConflict { table, .. }
            | Self::IntegerOverflow { table, .. }
            | Self::NonFiniteReal { table, .. }
            | Self::InvalidIdentifier { table, .. }
            | Self::NotNullUnsupported { table, .. } => Some(table),
            Self::InvalidRecord(_) | Self::Database(_) | Self::Serialization(_) => None,
        }
    }

    /// Column the error refers to, when it is tied to one.
    pub fn column(&self) -> Option<&str> {
        match self {
            Self::ColumnTypeConflict { column, .. }
            | Self::IntegerOverflow { column, .. }
            | Self::NonFiniteReal { column, .. }
            | Self::NotNullUnsupported { column, .. } => Some(column),
            Self::InvalidIdentifier { source, .. } => Some(source.name()),
            _ => None,
        }
    }
}
