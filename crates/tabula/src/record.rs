//! Records: one logical row as an ordered column/value list.

use serde::ser::{Serialize, SerializeMap, Serializer};
use tabula_db::{DbRow, DbValue};

use crate::error::{ReconcileError, Result};

/// Column name to value mapping in insertion order.
///
/// Order decides column order when a table is first created; it is not
/// significant for equality.
#[derive(Debug, Clone, Default)]
pub struct Record {
    fields: Vec<(String, DbValue)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `column`. An existing column keeps its position.
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<DbValue>) {
        let column = column.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(name, _)| *name == column) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((column, value)),
        }
    }

    pub fn get(&self, column: &str) -> Option<&DbValue> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn contains_key(&self, column: &str) -> bool {
        self.get(column).is_some()
    }

    pub fn remove(&mut self, column: &str) -> Option<DbValue> {
        let index = self.fields.iter().position(|(name, _)| name == column)?;
        Some(self.fields.remove(index).1)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DbValue)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Build a record from a JSON object.
    ///
    /// Column order follows the map's iteration order. Anything other than an
    /// object is rejected.
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        match value {
            serde_json::Value::Object(map) => Ok(map.into_iter().collect()),
            other => Err(ReconcileError::InvalidRecord(format!(
                "expected a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Parse JSON text holding one object.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        Self::from_json(value)
    }

    /// Parse newline-delimited JSON, one object per non-blank line.
    pub fn from_json_lines(text: &str) -> Result<Vec<Self>> {
        text.lines()
            .filter(|line| !line.trim().is_empty())
            .map(Self::from_json_str)
            .collect()
    }

    /// JSON object view of the record.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.fields
                .iter()
                .map(|(name, value)| (name.clone(), value.to_json()))
                .collect(),
        )
    }

    /// Convert a result row, optionally parsing JSON list/mapping text.
    pub(crate) fn from_row(row: DbRow, parse_json: bool) -> Self {
        row.into_pairs()
            .map(|(name, value)| {
                if parse_json {
                    (name, parse_json_text(value))
                } else {
                    (name, value)
                }
            })
            .collect()
    }
}

fn parse_json_text(value: DbValue) -> DbValue {
    if let DbValue::Text(text) = &value {
        let trimmed = text.trim_start();
        if trimmed.starts_with('[') || trimmed.starts_with('{') {
            if let Ok(parsed @ (serde_json::Value::Array(_) | serde_json::Value::Object(_))) =
                serde_json::from_str::<serde_json::Value>(text)
            {
                return DbValue::Json(parsed);
            }
        }
    }
    value
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(name, value)| other.get(name) == Some(value))
    }
}

impl<K: Into<String>, V: Into<DbValue>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (column, value) in iter {
            record.insert(column, value);
        }
        record
    }
}

impl IntoIterator for Record {
    type Item = (String, DbValue);
    type IntoIter = std::vec::IntoIter<(String, DbValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, &value.to_json())?;
        }
        map.end()
    }
}

/// Build a [`Record`] from `column => value` pairs.
///
/// ```rust,ignore
/// let dog = record! { "id" => 1, "name" => "Cleo" };
/// ```
#[macro_export]
macro_rules! record {
    () => {
        $crate::Record::new()
    };
    ($($column:expr => $value:expr),+ $(,)?) => {{
        let mut record = $crate::Record::new();
        $( record.insert($column, $value); )+
        record
    }};
}
