//! Primary keys: caller-facing key types, per-call key resolution and
//! content-hash ids.

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use tabula_db::{canonical_json_ascii, DbValue};

use crate::error::{ReconcileError, Result};
use crate::record::Record;

/// Column name of the implicit key added to tables created without one.
pub const DEFAULT_ID_COLUMN: &str = "id";

/// Primary key columns as named by a caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrimaryKey {
    Column(String),
    Compound(Vec<String>),
}

impl PrimaryKey {
    pub fn columns(&self) -> Vec<&str> {
        match self {
            PrimaryKey::Column(name) => vec![name.as_str()],
            PrimaryKey::Compound(names) => names.iter().map(String::as_str).collect(),
        }
    }
}

impl From<&str> for PrimaryKey {
    fn from(name: &str) -> Self {
        PrimaryKey::Column(name.to_string())
    }
}

impl From<String> for PrimaryKey {
    fn from(name: String) -> Self {
        PrimaryKey::Column(name)
    }
}

impl From<(&str, &str)> for PrimaryKey {
    fn from((a, b): (&str, &str)) -> Self {
        PrimaryKey::Compound(vec![a.to_string(), b.to_string()])
    }
}

impl From<Vec<&str>> for PrimaryKey {
    fn from(names: Vec<&str>) -> Self {
        PrimaryKey::Compound(names.into_iter().map(str::to_string).collect())
    }
}

/// Key value of one row: a scalar, or a tuple in declared key order.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyValue {
    Single(DbValue),
    Compound(Vec<DbValue>),
}

impl KeyValue {
    /// Components in key order.
    pub fn values(&self) -> &[DbValue] {
        match self {
            KeyValue::Single(value) => std::slice::from_ref(value),
            KeyValue::Compound(values) => values,
        }
    }

    pub fn has_null(&self) -> bool {
        self.values().iter().any(DbValue::is_null)
    }

    pub(crate) fn from_values(mut values: Vec<DbValue>) -> Self {
        if values.len() == 1 {
            KeyValue::Single(values.remove(0))
        } else {
            KeyValue::Compound(values)
        }
    }
}

impl std::fmt::Display for KeyValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyValue::Single(value) => write!(f, "{}", value.to_json()),
            KeyValue::Compound(values) => {
                f.write_str("(")?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", value.to_json())?;
                }
                f.write_str(")")
            }
        }
    }
}

impl From<DbValue> for KeyValue {
    fn from(value: DbValue) -> Self {
        KeyValue::Single(value)
    }
}

impl From<i64> for KeyValue {
    fn from(value: i64) -> Self {
        KeyValue::Single(value.into())
    }
}

impl From<i32> for KeyValue {
    fn from(value: i32) -> Self {
        KeyValue::Single(value.into())
    }
}

impl From<&str> for KeyValue {
    fn from(value: &str) -> Self {
        KeyValue::Single(value.into())
    }
}

impl From<String> for KeyValue {
    fn from(value: String) -> Self {
        KeyValue::Single(value.into())
    }
}

impl<A: Into<DbValue>, B: Into<DbValue>> From<(A, B)> for KeyValue {
    fn from((a, b): (A, B)) -> Self {
        KeyValue::Compound(vec![a.into(), b.into()])
    }
}

impl<A: Into<DbValue>, B: Into<DbValue>, C: Into<DbValue>> From<(A, B, C)> for KeyValue {
    fn from((a, b, c): (A, B, C)) -> Self {
        KeyValue::Compound(vec![a.into(), b.into(), c.into()])
    }
}

impl From<Vec<DbValue>> for KeyValue {
    fn from(values: Vec<DbValue>) -> Self {
        KeyValue::Compound(values)
    }
}

/// Key specification a call works with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrimaryKeySpec {
    /// Engine-assigned rowid. `alias` names an `INTEGER PRIMARY KEY` column
    /// standing in for it; without one the bare `rowid` is the key.
    RowidImplicit { alias: Option<String> },
    Single(String),
    Compound(Vec<String>),
    /// Text key holding a digest of other columns.
    HashDerived {
        column: String,
        columns: Option<Vec<String>>,
    },
}

impl PrimaryKeySpec {
    /// Named key columns in key order. Empty for a bare rowid.
    pub fn key_columns(&self) -> Vec<&str> {
        match self {
            PrimaryKeySpec::RowidImplicit { alias } => alias.iter().map(String::as_str).collect(),
            PrimaryKeySpec::Single(column) => vec![column.as_str()],
            PrimaryKeySpec::Compound(columns) => columns.iter().map(String::as_str).collect(),
            PrimaryKeySpec::HashDerived { column, .. } => vec![column.as_str()],
        }
    }

    /// Key column names as reported to callers; `["rowid"]` for a bare rowid.
    pub fn pks(&self) -> Vec<String> {
        match self {
            PrimaryKeySpec::RowidImplicit { alias: None } => vec!["rowid".to_string()],
            other => other.key_columns().into_iter().map(str::to_string).collect(),
        }
    }

    /// Number of key components.
    pub fn arity(&self) -> usize {
        self.key_columns().len().max(1)
    }

    /// Whether the engine assigns the key when a record omits it.
    pub fn is_engine_assigned(&self) -> bool {
        matches!(self, PrimaryKeySpec::RowidImplicit { .. })
    }

    /// Whether this table has no declared key at all.
    pub fn is_bare_rowid(&self) -> bool {
        matches!(self, PrimaryKeySpec::RowidImplicit { alias: None })
    }

    /// The record's key, if every key column holds a non-null value.
    pub fn key_of(&self, record: &Record) -> Option<KeyValue> {
        let columns = self.key_columns();
        if columns.is_empty() {
            return None;
        }
        let mut values = Vec::with_capacity(columns.len());
        for column in columns {
            match record.get(column) {
                Some(value) if !value.is_null() => values.push(value.clone()),
                _ => return None,
            }
        }
        Some(KeyValue::from_values(values))
    }

    /// First key column the record lacks or holds null for.
    pub fn missing_column<'a>(&'a self, record: &Record) -> Option<&'a str> {
        self.key_columns()
            .into_iter()
            .find(|column| record.get(column).map_or(true, DbValue::is_null))
    }
}

/// Content-hash id settings for one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashId {
    pub column: String,
    pub columns: Option<Vec<String>>,
}

impl HashId {
    /// Write the digest into `record` unless it already carries the column.
    pub fn inject(&self, record: &mut Record) -> Result<()> {
        if record.contains_key(&self.column) {
            return Ok(());
        }
        let id = hash_record(record, self.columns.as_deref())?;
        record.insert(self.column.clone(), id);
        Ok(())
    }
}

/// SHA-1 of the canonical JSON of the selected columns, as 40 hex digits.
///
/// With `columns` the digest covers exactly those columns; otherwise every
/// column of the record. Objects serialize with sorted keys, compact
/// separators and non-ASCII escaped, so ids do not depend on record order.
/// Blobs contribute their lowercase hex text.
pub fn hash_record(record: &Record, columns: Option<&[String]>) -> Result<String> {
    let mut object = serde_json::Map::new();
    match columns {
        Some(columns) => {
            for column in columns {
                let value = record.get(column).ok_or_else(|| {
                    ReconcileError::InvalidRecord(format!(
                        "hash id column '{}' is missing from the record",
                        column
                    ))
                })?;
                object.insert(column.clone(), value.to_json());
            }
        }
        None => {
            for (column, value) in record.iter() {
                object.insert(column.to_string(), value.to_json());
            }
        }
    }
    let canonical = canonical_json_ascii(&serde_json::Value::Object(object));
    Ok(hex::encode(Sha1::digest(canonical.as_bytes())))
}
