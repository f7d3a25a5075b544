//! Dynamic values exchanged with the engine.
//!
//! `DbValue` is the only value representation that crosses the connection
//! boundary. Structured values travel as canonical JSON text.

use std::fmt::Write as _;

use crate::error::BackendError;

/// Timestamp wrapper for database values.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DbTimestamp {
    inner: chrono::DateTime<chrono::Utc>,
}

/// Errors that can occur when parsing or constructing timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbTimestampError {
    message: String,
}

impl DbTimestampError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for DbTimestampError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for DbTimestampError {}

impl DbTimestamp {
    /// Current timestamp in UTC.
    pub fn now() -> Self {
        Self {
            inner: chrono::Utc::now(),
        }
    }

    /// Parse an RFC3339 timestamp string.
    pub fn from_rfc3339(value: &str) -> Result<Self, DbTimestampError> {
        chrono::DateTime::parse_from_rfc3339(value)
            .map(|dt| Self {
                inner: dt.with_timezone(&chrono::Utc),
            })
            .map_err(|e| DbTimestampError::new(format!("Invalid timestamp: {}", e)))
    }

    /// Construct from Unix milliseconds.
    pub fn from_unix_millis(ms: i64) -> Result<Self, DbTimestampError> {
        chrono::DateTime::from_timestamp_millis(ms)
            .map(|dt| Self { inner: dt })
            .ok_or_else(|| DbTimestampError::new("Invalid Unix milliseconds"))
    }

    /// RFC3339 string representation. This is the stored form.
    pub fn to_rfc3339(&self) -> String {
        self.inner.to_rfc3339()
    }

    /// Unix milliseconds since epoch.
    pub fn unix_millis(&self) -> i64 {
        self.inner.timestamp_millis()
    }

    pub fn as_chrono(&self) -> &chrono::DateTime<chrono::Utc> {
        &self.inner
    }
}

impl From<chrono::DateTime<chrono::Utc>> for DbTimestamp {
    fn from(value: chrono::DateTime<chrono::Utc>) -> Self {
        Self { inner: value }
    }
}

impl serde::Serialize for DbTimestamp {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_rfc3339())
    }
}

impl<'de> serde::Deserialize<'de> for DbTimestamp {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = <String as serde::Deserialize>::deserialize(deserializer)?;
        DbTimestamp::from_rfc3339(&raw).map_err(serde::de::Error::custom)
    }
}

/// A single cell value, either bound as a parameter or read back from a row.
///
/// `Unsigned` exists so that `u64` input above `i64::MAX` can be reported
/// instead of silently wrapping. `Json` only ever holds a list or a mapping;
/// JSON scalars are normalized to their scalar variants on conversion.
#[derive(Debug, Clone, PartialEq)]
pub enum DbValue {
    Null,
    Integer(i64),
    Unsigned(u64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
    Boolean(bool),
    Timestamp(DbTimestamp),
    Json(serde_json::Value),
}

impl DbValue {
    pub fn is_null(&self) -> bool {
        matches!(self, DbValue::Null)
    }

    /// Short name of the variant, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            DbValue::Null => "null",
            DbValue::Integer(_) | DbValue::Unsigned(_) => "integer",
            DbValue::Real(_) => "real",
            DbValue::Text(_) => "text",
            DbValue::Blob(_) => "blob",
            DbValue::Boolean(_) => "boolean",
            DbValue::Timestamp(_) => "timestamp",
            DbValue::Json(_) => "json",
        }
    }

    /// JSON view of the value, as used for content hashing.
    ///
    /// Blobs become lowercase hex strings, timestamps RFC3339 strings.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as J;
        match self {
            DbValue::Null => J::Null,
            DbValue::Integer(v) => J::from(*v),
            DbValue::Unsigned(v) => J::from(*v),
            DbValue::Real(v) => serde_json::Number::from_f64(*v)
                .map(J::Number)
                .unwrap_or(J::Null),
            DbValue::Text(v) => J::String(v.clone()),
            DbValue::Blob(v) => {
                let mut hex = String::with_capacity(v.len() * 2);
                for byte in v {
                    let _ = write!(hex, "{:02x}", byte);
                }
                J::String(hex)
            }
            DbValue::Boolean(v) => J::Bool(*v),
            DbValue::Timestamp(v) => J::String(v.to_rfc3339()),
            DbValue::Json(v) => v.clone(),
        }
    }
}

impl From<i32> for DbValue {
    fn from(v: i32) -> Self {
        DbValue::Integer(v as i64)
    }
}

impl From<i64> for DbValue {
    fn from(v: i64) -> Self {
        DbValue::Integer(v)
    }
}

impl From<u32> for DbValue {
    fn from(v: u32) -> Self {
        DbValue::Integer(v as i64)
    }
}

impl From<u64> for DbValue {
    fn from(v: u64) -> Self {
        DbValue::Unsigned(v)
    }
}

impl From<f64> for DbValue {
    fn from(v: f64) -> Self {
        DbValue::Real(v)
    }
}

impl From<String> for DbValue {
    fn from(v: String) -> Self {
        DbValue::Text(v)
    }
}

impl From<&str> for DbValue {
    fn from(v: &str) -> Self {
        DbValue::Text(v.to_string())
    }
}

impl From<bool> for DbValue {
    fn from(v: bool) -> Self {
        DbValue::Boolean(v)
    }
}

impl From<DbTimestamp> for DbValue {
    fn from(v: DbTimestamp) -> Self {
        DbValue::Timestamp(v)
    }
}

impl From<Vec<u8>> for DbValue {
    fn from(v: Vec<u8>) -> Self {
        DbValue::Blob(v)
    }
}

impl From<&[u8]> for DbValue {
    fn from(v: &[u8]) -> Self {
        DbValue::Blob(v.to_vec())
    }
}

impl From<serde_json::Value> for DbValue {
    fn from(v: serde_json::Value) -> Self {
        use serde_json::Value as J;
        match v {
            J::Null => DbValue::Null,
            J::Bool(b) => DbValue::Boolean(b),
            J::Number(n) => {
                if let Some(i) = n.as_i64() {
                    DbValue::Integer(i)
                } else if let Some(u) = n.as_u64() {
                    DbValue::Unsigned(u)
                } else {
                    DbValue::Real(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            J::String(s) => DbValue::Text(s),
            structured @ (J::Array(_) | J::Object(_)) => DbValue::Json(structured),
        }
    }
}

impl<T: Into<DbValue>> From<Option<T>> for DbValue {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => DbValue::Null,
        }
    }
}

/// Row data from a query result, in column-declaration order.
#[derive(Debug, Clone)]
pub struct DbRow {
    columns: Vec<String>,
    values: Vec<DbValue>,
}

impl DbRow {
    /// Create a new row with column names and values.
    pub fn new(columns: Vec<String>, values: Vec<DbValue>) -> Self {
        Self { columns, values }
    }

    /// Get a value by column index.
    pub fn get<T: FromDbValue>(&self, index: usize) -> Result<T, BackendError> {
        self.values
            .get(index)
            .ok_or_else(|| {
                BackendError::TypeConversion(format!("Column index {} out of bounds", index))
            })
            .and_then(|v| T::from_db_value(v))
    }

    /// Get a value by column name.
    pub fn get_by_name<T: FromDbValue>(&self, name: &str) -> Result<T, BackendError> {
        let index =
            self.columns.iter().position(|c| c == name).ok_or_else(|| {
                BackendError::TypeConversion(format!("Column '{}' not found", name))
            })?;
        self.get(index)
    }

    /// Get the number of columns.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if the row is empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Get the column names.
    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    /// Get the raw DbValue at an index.
    pub fn get_raw(&self, index: usize) -> Option<&DbValue> {
        self.values.get(index)
    }

    /// Consume the row into `(column, value)` pairs.
    pub fn into_pairs(self) -> impl Iterator<Item = (String, DbValue)> {
        self.columns.into_iter().zip(self.values)
    }
}

/// Trait for converting from DbValue.
pub trait FromDbValue: Sized {
    fn from_db_value(value: &DbValue) -> Result<Self, BackendError>;
}

impl FromDbValue for i64 {
    fn from_db_value(value: &DbValue) -> Result<Self, BackendError> {
        match value {
            DbValue::Integer(v) => Ok(*v),
            DbValue::Null => Err(BackendError::TypeConversion(
                "i64 field is NULL - use Option<i64> for nullable columns".to_string(),
            )),
            _ => Err(BackendError::TypeConversion("Expected integer".to_string())),
        }
    }
}

impl FromDbValue for f64 {
    fn from_db_value(value: &DbValue) -> Result<Self, BackendError> {
        match value {
            DbValue::Real(v) => Ok(*v),
            DbValue::Integer(v) => Ok(*v as f64),
            DbValue::Null => Err(BackendError::TypeConversion(
                "f64 field is NULL - use Option<f64> for nullable columns".to_string(),
            )),
            _ => Err(BackendError::TypeConversion("Expected real".to_string())),
        }
    }
}

impl FromDbValue for String {
    fn from_db_value(value: &DbValue) -> Result<Self, BackendError> {
        match value {
            DbValue::Text(v) => Ok(v.clone()),
            DbValue::Null => Err(BackendError::TypeConversion(
                "String field is NULL - use Option<String> for nullable columns".to_string(),
            )),
            _ => Err(BackendError::TypeConversion("Expected text".to_string())),
        }
    }
}

impl FromDbValue for bool {
    fn from_db_value(value: &DbValue) -> Result<Self, BackendError> {
        match value {
            DbValue::Boolean(v) => Ok(*v),
            DbValue::Integer(v) => Ok(*v != 0),
            DbValue::Null => Err(BackendError::TypeConversion(
                "bool field is NULL - use Option<bool> for nullable columns".to_string(),
            )),
            _ => Err(BackendError::TypeConversion("Expected boolean".to_string())),
        }
    }
}

impl FromDbValue for Vec<u8> {
    fn from_db_value(value: &DbValue) -> Result<Self, BackendError> {
        match value {
            DbValue::Blob(v) => Ok(v.clone()),
            DbValue::Null => Err(BackendError::TypeConversion(
                "Vec<u8> field is NULL - use Option<Vec<u8>> for nullable columns".to_string(),
            )),
            _ => Err(BackendError::TypeConversion("Expected blob".to_string())),
        }
    }
}

impl FromDbValue for DbValue {
    fn from_db_value(value: &DbValue) -> Result<Self, BackendError> {
        Ok(value.clone())
    }
}

impl<T: FromDbValue> FromDbValue for Option<T> {
    fn from_db_value(value: &DbValue) -> Result<Self, BackendError> {
        match value {
            DbValue::Null => Ok(None),
            _ => T::from_db_value(value).map(Some),
        }
    }
}

/// Canonical JSON text: sorted object keys, no whitespace, UTF-8 as is.
///
/// This is the stored form of `DbValue::Json`.
pub fn canonical_json(value: &serde_json::Value) -> String {
    let mut out = String::new();
    write_canonical(value, false, &mut out);
    out
}

/// Canonical JSON text with every non-ASCII character escaped as `\uXXXX`.
///
/// Used as digest input so ids do not depend on how a platform encodes text.
pub fn canonical_json_ascii(value: &serde_json::Value) -> String {
    let mut out = String::new();
    write_canonical(value, true, &mut out);
    out
}

fn write_canonical(value: &serde_json::Value, ascii: bool, out: &mut String) {
    use serde_json::Value as J;
    match value {
        J::Null => out.push_str("null"),
        J::Bool(true) => out.push_str("true"),
        J::Bool(false) => out.push_str("false"),
        J::Number(n) => out.push_str(&n.to_string()),
        J::String(s) => write_json_string(s, ascii, out),
        J::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, ascii, out);
            }
            out.push(']');
        }
        J::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_json_string(key, ascii, out);
                out.push(':');
                write_canonical(&map[key.as_str()], ascii, out);
            }
            out.push('}');
        }
    }
}

fn write_json_string(s: &str, ascii: bool, out: &mut String) {
    out.push('"');
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0c}' => out.push_str("\\f"),
            c if (c as u32) < 0x20 => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c if ascii && !c.is_ascii() => {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    let _ = write!(out, "\\u{:04x}", unit);
                }
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_conversion_normalizes_scalars() {
        assert_eq!(DbValue::from(json!(null)), DbValue::Null);
        assert_eq!(DbValue::from(json!(7)), DbValue::Integer(7));
        assert_eq!(DbValue::from(json!(u64::MAX)), DbValue::Unsigned(u64::MAX));
        assert_eq!(DbValue::from(json!(1.5)), DbValue::Real(1.5));
        assert_eq!(DbValue::from(json!("x")), DbValue::Text("x".to_string()));
        assert_eq!(
            DbValue::from(json!(["a"])),
            DbValue::Json(json!(["a"]))
        );
    }

    #[test]
    fn test_canonical_json_sorts_keys_and_strips_whitespace() {
        let value = json!({"b": [1, 2], "a": {"z": null, "y": true}});
        assert_eq!(canonical_json(&value), r#"{"a":{"y":true,"z":null},"b":[1,2]}"#);
    }

    #[test]
    fn test_canonical_json_ascii_escapes() {
        let value = json!({"name": "café 🐕", "ctl": "a\u{1}b"});
        assert_eq!(
            canonical_json_ascii(&value),
            r#"{"ctl":"a\u0001b","name":"caf\u00e9 \ud83d\udc15"}"#
        );
        assert_eq!(
            canonical_json(&value),
            "{\"ctl\":\"a\\u0001b\",\"name\":\"café 🐕\"}"
        );
    }

    #[test]
    fn test_blob_json_view_is_hex() {
        assert_eq!(DbValue::from(vec![0xa0u8, 0x01]).to_json(), json!("a001"));
    }

    #[test]
    fn test_row_accessors() {
        let row = DbRow::new(
            vec!["id".to_string(), "name".to_string()],
            vec![DbValue::from(1_i64), DbValue::Null],
        );
        assert_eq!(row.get_by_name::<i64>("id").unwrap(), 1);
        assert_eq!(row.get_by_name::<Option<String>>("name").unwrap(), None);
        assert!(row.get_by_name::<i64>("missing").is_err());
        assert!(row.get::<String>(1).is_err());
    }

    #[test]
    fn test_timestamp_roundtrip() {
        let ts = DbTimestamp::from_unix_millis(1_700_000_000_000).unwrap();
        let parsed = DbTimestamp::from_rfc3339(&ts.to_rfc3339()).unwrap();
        assert_eq!(ts, parsed);
        assert!(DbTimestamp::from_rfc3339("yesterday").is_err());
    }
}
