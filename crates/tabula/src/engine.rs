//! Insert, upsert and update against one table inside one transaction.
//!
//! Every call follows the same pipeline: hash ids are injected, the batch
//! is unified, the key spec is settled, the schema is synced, DML runs and
//! the touched rows are read back so results show what was persisted.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use tabula_db::{DbConnection, DbTransaction, DbValue, IdentError};
use tracing::debug;

use crate::error::{ReconcileError, Result};
use crate::infer::StorageType;
use crate::keys::{KeyValue, PrimaryKeySpec};
use crate::options::{ReconcileOptions, WriteOptions};
use crate::record::Record;
use crate::schema::{SchemaManager, TableSchema};
use crate::statement::{self, InsertStatement};
use crate::unify::{unify, UnifiedSchema};

/// Rows touched by a call, re-read after the write.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteOutcome {
    pub result: Vec<Record>,
    /// Key of the affected row when exactly one record was written
    pub last_pk: Option<KeyValue>,
}

/// Records ready for DML: ids injected, schema synced.
struct Prepared {
    records: Vec<Record>,
    desired: UnifiedSchema,
    spec: PrimaryKeySpec,
}

pub(crate) struct Reconciler<'a, 'tx> {
    tx: &'a mut DbTransaction<'tx>,
    table: &'a str,
    options: &'a ReconcileOptions,
}

impl<'a, 'tx> Reconciler<'a, 'tx> {
    pub(crate) fn new(
        tx: &'a mut DbTransaction<'tx>,
        table: &'a str,
        options: &'a ReconcileOptions,
    ) -> Self {
        Self { tx, table, options }
    }

    pub(crate) fn insert(&mut self, records: Vec<Record>, write: &WriteOptions) -> Result<WriteOutcome> {
        if records.is_empty() {
            return Ok(WriteOutcome::default());
        }
        let Prepared {
            records,
            desired,
            spec,
        } = self.prepare(records, write, false)?;
        let table = self.table;
        let key_columns = spec.key_columns();

        let all_keyed = !key_columns.is_empty() && records.iter().all(|r| spec.key_of(r).is_some());
        let mut result = Vec::with_capacity(records.len());
        let mut keys = Vec::with_capacity(records.len());

        if all_keyed {
            let columns: Vec<&str> = desired.column_names().collect();
            let stmt = InsertStatement::new(table, columns.iter().copied(), write.replace)
                .map_err(|e| ident_error(table, e))?;
            let rows: Vec<Vec<DbValue>> = records
                .iter()
                .map(|record| {
                    columns
                        .iter()
                        .map(|c| record.get(c).cloned().unwrap_or(DbValue::Null))
                        .collect()
                })
                .collect();
            self.tx.execute_chunked(&rows, |n| stmt.sql(n))?;

            for record in &records {
                let key = spec
                    .key_of(record)
                    .ok_or_else(|| ReconcileError::not_found(table, "missing key column"))?;
                result.push(self.reread(&key_columns, &key)?);
                keys.push(key);
            }
        } else {
            for record in &records {
                let stmt = InsertStatement::new(table, record.columns(), write.replace)
                    .map_err(|e| ident_error(table, e))?;
                let params: Vec<DbValue> = record.iter().map(|(_, v)| v.clone()).collect();
                self.tx.execute(&stmt.sql(1), &params)?;

                let rowid = KeyValue::Single(self.tx.last_insert_rowid().into());
                let row = self.reread(&[], &rowid)?;
                keys.push(spec.key_of(&row).unwrap_or(rowid));
                result.push(row);
            }
        }

        debug!(table, rows = result.len(), multi_row = all_keyed, "Inserted rows");
        Ok(outcome(result, keys))
    }

    pub(crate) fn upsert(&mut self, records: Vec<Record>, write: &WriteOptions) -> Result<WriteOutcome> {
        if records.is_empty() {
            return Ok(WriteOutcome::default());
        }
        let Prepared {
            records,
            desired,
            spec,
        } = self.prepare(records, write, true)?;
        let table = self.table;
        let key_columns = spec.key_columns();

        // One statement per presence shape; the union only drives schema sync.
        let mut statements: HashMap<Vec<&str>, String> = HashMap::new();
        let mut keys = Vec::with_capacity(records.len());
        for record in &records {
            let columns: Vec<&str> = desired
                .column_names()
                .filter(|c| record.contains_key(c))
                .collect();
            let params: Vec<DbValue> = columns
                .iter()
                .map(|c| record.get(c).cloned().unwrap_or(DbValue::Null))
                .collect();
            let sql = match statements.entry(columns) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => {
                    let sql = statement::upsert(table, entry.key(), &key_columns)
                        .map_err(|e| ident_error(table, e))?;
                    entry.insert(sql)
                }
            };
            self.tx.execute(sql, &params)?;
            let key = spec
                .key_of(record)
                .ok_or_else(|| ReconcileError::not_found(table, "missing key column"))?;
            keys.push(key);
        }

        let mut result = Vec::with_capacity(keys.len());
        for key in &keys {
            result.push(self.reread(&key_columns, key)?);
        }

        debug!(table, rows = result.len(), shapes = statements.len(), "Upserted rows");
        Ok(outcome(result, keys))
    }

    pub(crate) fn update(&mut self, key: KeyValue, changes: Record, alter: bool) -> Result<WriteOutcome> {
        let table = self.table;
        let schema = TableSchema::load_in(self.tx, table)?
            .ok_or_else(|| ReconcileError::not_found(table, "table does not exist"))?;
        let spec = schema.key().clone();
        check_key(table, &spec, &key)?;
        let key_columns = spec.key_columns();

        let current = self
            .fetch(&key_columns, &key)?
            .ok_or_else(|| ReconcileError::not_found(table, format!("no row with key {}", key)))?;
        if changes.is_empty() {
            debug!(table, key = %key, "Update without changes");
            return Ok(WriteOutcome {
                result: vec![current],
                last_pk: Some(key),
            });
        }

        let desired = unify(
            table,
            std::slice::from_ref(&changes),
            &[],
            self.options.lenient_types,
        )?;
        SchemaManager::new(self.tx, table).sync(Some(&schema), &desired, &spec, alter, &[])?;

        let columns: Vec<&str> = changes.columns().collect();
        let sql = statement::update(table, &columns, &key_columns)
            .map_err(|e| ident_error(table, e))?;
        let mut params: Vec<DbValue> = changes.iter().map(|(_, v)| v.clone()).collect();
        params.extend(key.values().iter().cloned());
        self.tx.execute(&sql, &params)?;

        // Key columns may themselves have been changed.
        let new_key = if key_columns.is_empty() {
            key
        } else {
            KeyValue::from_values(
                key_columns
                    .iter()
                    .zip(key.values())
                    .map(|(column, old)| changes.get(column).unwrap_or(old).clone())
                    .collect(),
            )
        };
        let row = self.reread(&key_columns, &new_key)?;

        debug!(table, key = %new_key, columns = columns.len(), "Updated row");
        Ok(WriteOutcome {
            result: vec![row],
            last_pk: Some(new_key),
        })
    }

    fn prepare(&mut self, mut records: Vec<Record>, write: &WriteOptions, upsert: bool) -> Result<Prepared> {
        let table = self.table;
        let existing = TableSchema::load_in(self.tx, table)?;
        let mut spec = write.key_spec(table, existing.as_ref());

        if upsert && (spec.is_bare_rowid() || (existing.is_none() && !write.names_key())) {
            return Err(ReconcileError::PrimaryKeyRequired {
                table: table.to_string(),
            });
        }

        if let Some(hash) = write.hash() {
            for record in &mut records {
                hash.inject(record)?;
            }
        }

        let mut desired = unify(
            table,
            &records,
            &spec.key_columns(),
            self.options.lenient_types,
        )?;
        if existing.is_none() {
            spec = creation_spec(table, spec, &mut desired);
        }

        for record in &records {
            if upsert || !spec.is_engine_assigned() {
                if let Some(column) = spec.missing_column(record) {
                    return Err(ReconcileError::not_found(
                        table,
                        format!("missing key column '{}'", column),
                    ));
                }
            }
        }

        SchemaManager::new(self.tx, table).sync(
            existing.as_ref(),
            &desired,
            &spec,
            write.alter,
            &write.not_null,
        )?;

        Ok(Prepared {
            records,
            desired,
            spec,
        })
    }

    fn fetch(&mut self, key_columns: &[&str], key: &KeyValue) -> Result<Option<Record>> {
        let sql = statement::select_by_key(self.table, key_columns)
            .map_err(|e| ident_error(self.table, e))?;
        let row = self.tx.query_optional(&sql, key.values())?;
        Ok(row.map(|row| Record::from_row(row, self.options.parse_json)))
    }

    fn reread(&mut self, key_columns: &[&str], key: &KeyValue) -> Result<Record> {
        let table = self.table;
        self.fetch(key_columns, key)?.ok_or_else(|| {
            ReconcileError::not_found(table, format!("row with key {} vanished after write", key))
        })
    }
}

/// Key spec for a table about to be created.
///
/// An integer `id`-style key becomes a rowid alias declared first. When the
/// batch already holds non-integer values under the implicit alias name the
/// table falls back to the bare rowid.
fn creation_spec(table: &str, spec: PrimaryKeySpec, desired: &mut UnifiedSchema) -> PrimaryKeySpec {
    match spec {
        PrimaryKeySpec::RowidImplicit { alias: Some(alias) } => match desired.get(&alias) {
            None | Some(StorageType::Integer) => {
                desired.ensure_leading(&alias, StorageType::Integer);
                PrimaryKeySpec::RowidImplicit { alias: Some(alias) }
            }
            Some(other) => {
                debug!(
                    table,
                    column = %alias,
                    storage_type = %other,
                    "Implicit id column is not integer, keying by rowid"
                );
                PrimaryKeySpec::RowidImplicit { alias: None }
            }
        },
        PrimaryKeySpec::Single(column)
            if matches!(desired.get(&column), None | Some(StorageType::Integer)) =>
        {
            desired.ensure_leading(&column, StorageType::Integer);
            PrimaryKeySpec::RowidImplicit {
                alias: Some(column),
            }
        }
        other => other,
    }
}

/// Reject keys that cannot address a row of a table keyed by `spec`.
pub(crate) fn check_key(table: &str, spec: &PrimaryKeySpec, key: &KeyValue) -> Result<()> {
    if key.values().len() != spec.arity() {
        return Err(ReconcileError::not_found(
            table,
            format!(
                "key {} does not match primary key ({})",
                key,
                spec.pks().join(", ")
            ),
        ));
    }
    if key.has_null() {
        return Err(ReconcileError::not_found(
            table,
            format!("key {} contains null", key),
        ));
    }
    Ok(())
}

/// Read one row by key outside a write.
pub(crate) fn fetch_row(
    conn: &DbConnection,
    table: &str,
    spec: &PrimaryKeySpec,
    key: &KeyValue,
    parse_json: bool,
) -> Result<Option<Record>> {
    let sql = statement::select_by_key(table, &spec.key_columns())
        .map_err(|e| ident_error(table, e))?;
    let row = conn.query_optional(&sql, key.values())?;
    Ok(row.map(|row| Record::from_row(row, parse_json)))
}

fn ident_error(table: &str, err: IdentError) -> ReconcileError {
    ReconcileError::invalid_identifier(table, err)
}

fn outcome(result: Vec<Record>, mut keys: Vec<KeyValue>) -> WriteOutcome {
    let last_pk = if keys.len() == 1 { keys.pop() } else { None };
    WriteOutcome { result, last_pk }
}
