//! Batch schema unification.

use std::collections::HashMap;

use tracing::warn;

use crate::error::{ReconcileError, Result};
use crate::infer::{infer, StorageType};
use crate::record::Record;

/// Columns required by a batch, in creation order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UnifiedSchema {
    columns: Vec<(String, StorageType)>,
}

impl UnifiedSchema {
    pub fn columns(&self) -> &[(String, StorageType)] {
        &self.columns
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    pub fn get(&self, column: &str) -> Option<StorageType> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, ty)| *ty)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.get(column).is_some()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Put `column` first with `ty`, adding it when absent.
    pub(crate) fn ensure_leading(&mut self, column: &str, ty: StorageType) {
        if let Some(index) = self.columns.iter().position(|(name, _)| name == column) {
            let entry = self.columns.remove(index);
            self.columns.insert(0, entry);
        } else {
            self.columns.insert(0, (column.to_string(), ty));
        }
    }
}

/// Unify the column types of `records`.
///
/// Each column takes the widest type seen across the batch along
/// `integer < real < text`; nulls add no constraint and an all-null column
/// becomes text. Blob mixed with anything else is a conflict, or text when
/// `lenient` is set. Columns keep first-seen order, except that
/// `key_columns` present in the batch move to the front in key order.
pub fn unify(
    table: &str,
    records: &[Record],
    key_columns: &[&str],
    lenient: bool,
) -> Result<UnifiedSchema> {
    let mut order: Vec<(String, Option<StorageType>)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for record in records {
        for (column, value) in record.iter() {
            let incoming = infer(value).map_err(|e| e.in_column(table, column))?;
            let slot = match index.get(column) {
                Some(&i) => i,
                None => {
                    index.insert(column.to_string(), order.len());
                    order.push((column.to_string(), None));
                    order.len() - 1
                }
            };
            let current = &mut order[slot].1;
            *current = match (*current, incoming) {
                (existing, None) => existing,
                (None, incoming) => incoming,
                (Some(existing), Some(incoming)) => match existing.widen(incoming) {
                    Some(ty) => Some(ty),
                    None if lenient => {
                        warn!(
                            table,
                            column,
                            %existing,
                            %incoming,
                            "Mixed blob and non-blob values, storing column as text"
                        );
                        Some(StorageType::Text)
                    }
                    None => {
                        return Err(ReconcileError::ColumnTypeConflict {
                            table: table.to_string(),
                            column: column.to_string(),
                            existing,
                            incoming,
                        })
                    }
                },
            };
        }
    }

    let mut columns: Vec<(String, StorageType)> = order
        .into_iter()
        .map(|(name, ty)| (name, ty.unwrap_or(StorageType::Text)))
        .collect();

    // Reverse so the first key column ends up in front.
    for key in key_columns.iter().rev() {
        if let Some(i) = columns.iter().position(|(name, _)| name == key) {
            let entry = columns.remove(i);
            columns.insert(0, entry);
        }
    }

    Ok(UnifiedSchema { columns })
}
