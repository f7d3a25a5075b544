//! Storage type inference for single values.

use std::fmt;

use serde::{Deserialize, Serialize};
use tabula_db::DbValue;

use crate::error::ReconcileError;

/// Canonical column storage type.
///
/// Integer, real and text form a widening chain. Blob stands apart: it never
/// widens into or out of the others.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StorageType {
    Integer,
    Real,
    Text,
    Blob,
}

impl StorageType {
    /// Declared type used in generated DDL.
    pub fn sql_name(&self) -> &'static str {
        match self {
            StorageType::Integer => "INTEGER",
            StorageType::Real => "REAL",
            StorageType::Text => "TEXT",
            StorageType::Blob => "BLOB",
        }
    }

    /// Map a declared column type to its storage type using SQLite's
    /// affinity rules. Numeric affinity reads as real.
    pub fn from_declared(declared: &str) -> Self {
        let upper = declared.to_ascii_uppercase();
        if upper.contains("INT") {
            StorageType::Integer
        } else if upper.contains("CHAR") || upper.contains("CLOB") || upper.contains("TEXT") {
            StorageType::Text
        } else if upper.is_empty() || upper.contains("BLOB") {
            StorageType::Blob
        } else {
            StorageType::Real
        }
    }

    /// Widest type covering both, or `None` when blob meets a non-blob.
    pub fn widen(self, other: StorageType) -> Option<StorageType> {
        use StorageType::*;
        match (self, other) {
            (Blob, Blob) => Some(Blob),
            (Blob, _) | (_, Blob) => None,
            (a, b) => Some(if a.rank() >= b.rank() { a } else { b }),
        }
    }

    fn rank(self) -> u8 {
        match self {
            StorageType::Integer => 0,
            StorageType::Real => 1,
            StorageType::Text => 2,
            StorageType::Blob => 3,
        }
    }
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StorageType::Integer => "integer",
            StorageType::Real => "real",
            StorageType::Text => "text",
            StorageType::Blob => "blob",
        })
    }
}

/// A value no column can store.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InferError {
    IntegerOverflow(u64),
    NonFiniteReal,
}

impl InferError {
    /// Attach table and column context.
    pub fn in_column(self, table: &str, column: &str) -> ReconcileError {
        match self {
            InferError::IntegerOverflow(value) => ReconcileError::IntegerOverflow {
                table: table.to_string(),
                column: column.to_string(),
                value,
            },
            InferError::NonFiniteReal => ReconcileError::NonFiniteReal {
                table: table.to_string(),
                column: column.to_string(),
            },
        }
    }
}

/// Storage type for one value. `Ok(None)` means null: no constraint.
pub fn infer(value: &DbValue) -> Result<Option<StorageType>, InferError> {
    let ty = match value {
        DbValue::Null => return Ok(None),
        DbValue::Boolean(_) | DbValue::Integer(_) => StorageType::Integer,
        DbValue::Unsigned(v) => {
            if i64::try_from(*v).is_err() {
                return Err(InferError::IntegerOverflow(*v));
            }
            StorageType::Integer
        }
        DbValue::Real(v) => {
            if !v.is_finite() {
                return Err(InferError::NonFiniteReal);
            }
            StorageType::Real
        }
        DbValue::Text(_) | DbValue::Timestamp(_) | DbValue::Json(_) => StorageType::Text,
        DbValue::Blob(_) => StorageType::Blob,
    };
    Ok(Some(ty))
}
