//! Table handle: the caller-facing reconciliation surface.

use tabula_db::DbConnection;

use crate::engine::{check_key, fetch_row, Reconciler, WriteOutcome};
use crate::error::{ReconcileError, Result};
use crate::keys::KeyValue;
use crate::options::{ReconcileOptions, WriteOptions};
use crate::record::Record;
use crate::schema::TableSchema;
use crate::statement;

/// One table of a [`crate::Database`], which may not exist yet.
///
/// Every write runs in its own transaction: it commits completely or leaves
/// the table as it was. The key of the last single-row write is kept in
/// [`Table::last_pk`].
#[derive(Debug, Clone)]
pub struct Table {
    conn: DbConnection,
    name: String,
    options: ReconcileOptions,
    last_pk: Option<KeyValue>,
}

impl Table {
    pub(crate) fn new(conn: DbConnection, name: &str, options: ReconcileOptions) -> Self {
        Self {
            conn,
            name: name.to_string(),
            options,
            last_pk: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Key of the row written by the most recent single-record call.
    pub fn last_pk(&self) -> Option<&KeyValue> {
        self.last_pk.as_ref()
    }

    pub fn insert(&mut self, record: Record, options: WriteOptions) -> Result<WriteOutcome> {
        self.insert_all(vec![record], options)
    }

    /// Insert `records`, creating the table or (with `alter`) its missing
    /// columns first.
    pub fn insert_all<I>(&mut self, records: I, options: WriteOptions) -> Result<WriteOutcome>
    where
        I: IntoIterator<Item = Record>,
    {
        let records: Vec<Record> = records.into_iter().collect();
        self.write(|engine| engine.insert(records, &options))
    }

    pub fn upsert(&mut self, record: Record, options: WriteOptions) -> Result<WriteOutcome> {
        self.upsert_all(vec![record], options)
    }

    /// Insert `records` or merge them into the rows sharing their key.
    ///
    /// Columns a record does not mention keep their stored values.
    pub fn upsert_all<I>(&mut self, records: I, options: WriteOptions) -> Result<WriteOutcome>
    where
        I: IntoIterator<Item = Record>,
    {
        let records: Vec<Record> = records.into_iter().collect();
        self.write(|engine| engine.upsert(records, &options))
    }

    /// Apply `changes` to the row addressed by `key`.
    ///
    /// Empty `changes` touch nothing but still return the row and anchor
    /// `last_pk` on `key`.
    pub fn update(
        &mut self,
        key: impl Into<KeyValue>,
        changes: Record,
        alter: bool,
    ) -> Result<WriteOutcome> {
        let key = key.into();
        self.write(|engine| engine.update(key, changes, alter))
    }

    fn write<F>(&mut self, op: F) -> Result<WriteOutcome>
    where
        F: FnOnce(&mut Reconciler<'_, '_>) -> Result<WriteOutcome>,
    {
        let name = self.name.as_str();
        let options = &self.options;
        let outcome = self
            .conn
            .transaction(|tx| op(&mut Reconciler::new(tx, name, options)))?;
        self.last_pk = outcome.last_pk.clone();
        Ok(outcome)
    }

    /// The row addressed by `key`.
    pub fn get(&self, key: impl Into<KeyValue>) -> Result<Record> {
        let key = key.into();
        let schema = self.require_schema()?;
        check_key(&self.name, schema.key(), &key)?;
        fetch_row(&self.conn, &self.name, schema.key(), &key, self.options.parse_json)?
            .ok_or_else(|| ReconcileError::not_found(&self.name, format!("no row with key {}", key)))
    }

    /// All rows in rowid order; empty when the table does not exist.
    pub fn rows(&self) -> Result<Vec<Record>> {
        if !self.exists()? {
            return Ok(Vec::new());
        }
        let sql = statement::select_all(&self.name)
            .map_err(|e| ReconcileError::invalid_identifier(&self.name, e))?;
        let rows = self.conn.query_all(&sql, &[])?;
        Ok(rows
            .into_iter()
            .map(|row| Record::from_row(row, self.options.parse_json))
            .collect())
    }

    pub fn exists(&self) -> Result<bool> {
        let row = self
            .conn
            .query_optional(statement::TABLE_EXISTS_SQL, &[self.name.as_str().into()])?;
        Ok(row.is_some())
    }

    /// Current schema, or `None` when the table does not exist.
    pub fn schema(&self) -> Result<Option<TableSchema>> {
        TableSchema::load(&self.conn, &self.name)
    }

    /// Primary key column names; `["rowid"]` when none is declared.
    pub fn pks(&self) -> Result<Vec<String>> {
        Ok(self.require_schema()?.pks())
    }

    fn require_schema(&self) -> Result<TableSchema> {
        self.schema()?
            .ok_or_else(|| ReconcileError::not_found(&self.name, "table does not exist"))
    }
}
