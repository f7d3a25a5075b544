//! Database handle.

use std::path::Path;

use tabula_db::{DbConfig, DbConnection, DbValue};
use tracing::debug;

use crate::error::Result;
use crate::options::ReconcileOptions;
use crate::record::Record;
use crate::statement;
use crate::table::Table;

/// A SQLite database plus the reconciliation options its tables share.
#[derive(Debug, Clone)]
pub struct Database {
    conn: DbConnection,
    options: ReconcileOptions,
}

impl Database {
    /// Open (or create) a database file with default settings.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(&DbConfig::sqlite(path), ReconcileOptions::default())
    }

    /// Open a private in-memory database.
    pub fn open_memory() -> Result<Self> {
        Self::open_with(&DbConfig::sqlite_memory(), ReconcileOptions::default())
    }

    pub fn open_with(config: &DbConfig, options: ReconcileOptions) -> Result<Self> {
        let conn = DbConnection::open(config)?;
        Ok(Self::from_connection(conn, options))
    }

    /// Wrap an already open connection.
    pub fn from_connection(conn: DbConnection, options: ReconcileOptions) -> Self {
        Self { conn, options }
    }

    pub fn connection(&self) -> &DbConnection {
        &self.conn
    }

    pub fn options(&self) -> &ReconcileOptions {
        &self.options
    }

    /// Handle for `name`. The table is created by the first write.
    pub fn table(&self, name: &str) -> Table {
        Table::new(self.conn.clone(), name, self.options.clone())
    }

    /// Names of all user tables, sorted.
    pub fn table_names(&self) -> Result<Vec<String>> {
        let rows = self.conn.query_all(statement::TABLE_NAMES_SQL, &[])?;
        let mut names = Vec::with_capacity(rows.len());
        for row in rows {
            names.push(row.get::<String>(0)?);
        }
        Ok(names)
    }

    /// Run arbitrary SQL and return its rows as records.
    ///
    /// Statements that produce no rows still run and return an empty list.
    pub fn query(&self, sql: &str, params: &[DbValue]) -> Result<Vec<Record>> {
        let rows = self.conn.query_all(sql, params)?;
        debug!(rows = rows.len(), "Passthrough query");
        Ok(rows
            .into_iter()
            .map(|row| Record::from_row(row, self.options.parse_json))
            .collect())
    }

    /// Run a statement and return the number of changed rows.
    pub fn execute(&self, sql: &str, params: &[DbValue]) -> Result<u64> {
        Ok(self.conn.execute(sql, params)?)
    }
}
