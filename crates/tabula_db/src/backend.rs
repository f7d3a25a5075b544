//! Database backend abstraction layer.
//!
//! SQLite-only synchronous backend.
//! - One connection per handle, shared by clones
//! - Every statement runs under a `db.exec`/`db.query` tracing span

use std::path::Path;
use std::rc::Rc;
use std::time::Instant;

use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::OpenFlags;
use tracing::{debug_span, info};

use crate::config::{DbConfig, DbLocation, DEFAULT_MAX_PARAMS};
use crate::error::BackendError;
use crate::value::{canonical_json, DbRow, DbValue, FromDbValue};

/// Database access mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadWrite,
    ReadOnly,
}

/// Unified database connection.
///
/// Cloning shares the underlying connection; the handle is deliberately not
/// `Send`, so all calls on one connection happen on one thread.
#[derive(Clone)]
pub struct DbConnection {
    conn: Rc<rusqlite::Connection>,
    access_mode: AccessMode,
    max_params: usize,
}

impl std::fmt::Debug for DbConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbConnection")
            .field("backend", &"SQLite")
            .field("access_mode", &self.access_mode)
            .field("max_params", &self.max_params)
            .finish()
    }
}

impl DbConnection {
    /// Open a database according to `config`.
    pub fn open(config: &DbConfig) -> Result<Self, BackendError> {
        let conn = match &config.location {
            DbLocation::File(path) => {
                if let Some(parent) = path.parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent)?;
                    }
                }
                let conn = rusqlite::Connection::open(path)?;
                if config.wal {
                    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
                }
                info!(path = %path.display(), wal = config.wal, "Opened SQLite database");
                conn
            }
            DbLocation::Memory => {
                let conn = rusqlite::Connection::open_in_memory()?;
                info!("Opened in-memory SQLite database");
                conn
            }
        };
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;

        Ok(Self {
            conn: Rc::new(conn),
            access_mode: AccessMode::ReadWrite,
            max_params: config.max_params,
        })
    }

    /// Open a SQLite file with default settings.
    pub fn open_sqlite(path: &Path) -> Result<Self, BackendError> {
        Self::open(&DbConfig::sqlite(path))
    }

    /// Open an in-memory SQLite database (for testing).
    pub fn open_sqlite_memory() -> Result<Self, BackendError> {
        Self::open(&DbConfig::sqlite_memory())
    }

    /// Open an existing SQLite file in read-only mode.
    pub fn open_sqlite_readonly(path: &Path) -> Result<Self, BackendError> {
        let conn = rusqlite::Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        info!(path = %path.display(), "Opened SQLite database (read-only)");

        Ok(Self {
            conn: Rc::new(conn),
            access_mode: AccessMode::ReadOnly,
            max_params: DEFAULT_MAX_PARAMS,
        })
    }

    /// Get the access mode.
    pub fn access_mode(&self) -> AccessMode {
        self.access_mode
    }

    /// Check if this connection has write access.
    pub fn is_writable(&self) -> bool {
        self.access_mode == AccessMode::ReadWrite
    }

    /// Get the backend name.
    pub fn backend_name(&self) -> &'static str {
        "SQLite"
    }

    /// Parameter budget per statement.
    pub fn max_params(&self) -> usize {
        self.max_params
    }

    /// Execute a SQL statement (no results).
    pub fn execute(&self, sql: &str, params: &[DbValue]) -> Result<u64, BackendError> {
        self.ensure_writable()?;
        execute_on_conn(self.conn.as_ref(), sql, params)
    }

    /// Execute a batch of SQL statements.
    pub fn execute_batch(&self, sql: &str) -> Result<(), BackendError> {
        self.ensure_writable()?;
        execute_batch_on_conn(self.conn.as_ref(), sql)
    }

    /// Query and return all rows.
    pub fn query_all(&self, sql: &str, params: &[DbValue]) -> Result<Vec<DbRow>, BackendError> {
        query_on_conn(self.conn.as_ref(), sql, params)
    }

    /// Query and return the first row, if any.
    pub fn query_optional(
        &self,
        sql: &str,
        params: &[DbValue],
    ) -> Result<Option<DbRow>, BackendError> {
        let rows = self.query_all(sql, params)?;
        Ok(rows.into_iter().next())
    }

    /// Query and return exactly one row.
    pub fn query_one(&self, sql: &str, params: &[DbValue]) -> Result<DbRow, BackendError> {
        self.query_optional(sql, params)?
            .ok_or_else(|| BackendError::Query("Expected one row, got none".to_string()))
    }

    /// Query and return a single scalar value.
    pub fn query_scalar<T: FromDbValue>(
        &self,
        sql: &str,
        params: &[DbValue],
    ) -> Result<T, BackendError> {
        let row = self.query_one(sql, params)?;
        row.get(0)
    }

    /// Run `op` inside a transaction.
    ///
    /// Commits when `op` succeeds and rolls back when it fails. When a
    /// transaction is already open on this connection a savepoint is used
    /// instead, so calls compose.
    pub fn transaction<T, E, F>(&self, op: F) -> Result<T, E>
    where
        E: From<BackendError>,
        F: FnOnce(&mut DbTransaction<'_>) -> Result<T, E>,
    {
        self.ensure_writable()?;
        let conn = self.conn.as_ref();
        let nested = !conn.is_autocommit();
        let (begin, commit, rollback) = if nested {
            (
                "SAVEPOINT tabula_tx",
                "RELEASE tabula_tx",
                "ROLLBACK TO tabula_tx; RELEASE tabula_tx",
            )
        } else {
            ("BEGIN", "COMMIT", "ROLLBACK")
        };

        conn.execute_batch(begin).map_err(BackendError::from)?;
        let mut tx = DbTransaction {
            conn,
            max_params: self.max_params,
        };
        let result = op(&mut tx);

        match result {
            Ok(value) => {
                conn.execute_batch(commit).map_err(BackendError::from)?;
                Ok(value)
            }
            Err(err) => match conn.execute_batch(rollback) {
                Ok(()) => Err(err),
                Err(rollback_err) => Err(E::from(BackendError::Transaction(format!(
                    "rollback failed: {}",
                    rollback_err
                )))),
            },
        }
    }

    fn ensure_writable(&self) -> Result<(), BackendError> {
        if self.access_mode == AccessMode::ReadOnly {
            return Err(BackendError::ReadOnly);
        }
        Ok(())
    }
}

/// Transaction wrapper for SQLite.
pub struct DbTransaction<'a> {
    conn: &'a rusqlite::Connection,
    max_params: usize,
}

impl<'a> DbTransaction<'a> {
    pub fn execute(&mut self, sql: &str, params: &[DbValue]) -> Result<u64, BackendError> {
        execute_on_conn(self.conn, sql, params)
    }

    pub fn execute_batch(&mut self, sql: &str) -> Result<(), BackendError> {
        execute_batch_on_conn(self.conn, sql)
    }

    pub fn query_all(&mut self, sql: &str, params: &[DbValue]) -> Result<Vec<DbRow>, BackendError> {
        query_on_conn(self.conn, sql, params)
    }

    pub fn query_optional(
        &mut self,
        sql: &str,
        params: &[DbValue],
    ) -> Result<Option<DbRow>, BackendError> {
        let rows = self.query_all(sql, params)?;
        Ok(rows.into_iter().next())
    }

    pub fn query_one(&mut self, sql: &str, params: &[DbValue]) -> Result<DbRow, BackendError> {
        self.query_optional(sql, params)?
            .ok_or_else(|| BackendError::Query("Expected one row, got none".to_string()))
    }

    pub fn query_scalar<T: FromDbValue>(
        &mut self,
        sql: &str,
        params: &[DbValue],
    ) -> Result<T, BackendError> {
        let row = self.query_one(sql, params)?;
        row.get(0)
    }

    /// Rowid of the most recent successful INSERT on this connection.
    pub fn last_insert_rowid(&self) -> i64 {
        self.conn.last_insert_rowid()
    }

    /// Parameter budget per statement.
    pub fn max_params(&self) -> usize {
        self.max_params
    }

    /// Execute multi-row statements over `rows`, chunked to the parameter budget.
    ///
    /// `build_sql` receives the number of rows in the chunk and returns the
    /// statement text for exactly that many rows. A row is never split
    /// across chunks. Returns the total number of changed rows.
    pub fn execute_chunked<F>(
        &mut self,
        rows: &[Vec<DbValue>],
        mut build_sql: F,
    ) -> Result<u64, BackendError>
    where
        F: FnMut(usize) -> String,
    {
        let Some(first) = rows.first() else {
            return Ok(0);
        };
        let width = first.len();
        if width == 0 {
            return Err(BackendError::invalid_input(
                "execute_chunked requires at least one column",
            ));
        }

        for (index, row) in rows.iter().enumerate() {
            if row.len() != width {
                return Err(BackendError::InvalidInput(format!(
                    "Row {} has {} values, expected {}",
                    index,
                    row.len(),
                    width
                )));
            }
        }

        let rows_per_chunk = rows_per_chunk(width, self.max_params)?;

        let mut total = 0;
        for chunk in rows.chunks(rows_per_chunk) {
            let sql = build_sql(chunk.len());
            let mut params = Vec::with_capacity(chunk.len() * width);
            for row in chunk {
                params.extend(row.iter().cloned());
            }
            total += self.execute(&sql, &params)?;
        }

        Ok(total)
    }
}

/// How many rows of `width` parameters fit in one statement.
pub fn rows_per_chunk(width: usize, max_params: usize) -> Result<usize, BackendError> {
    if width > max_params {
        return Err(BackendError::InvalidInput(format!(
            "Too many columns ({}) for max params ({})",
            width, max_params
        )));
    }
    Ok((max_params / width.max(1)).max(1))
}

fn execute_on_conn(
    conn: &rusqlite::Connection,
    sql: &str,
    params: &[DbValue],
) -> Result<u64, BackendError> {
    let op = sql_op_name(sql);
    let sql_hash = hash_sql(sql);
    let span = debug_span!(
        "db.exec",
        op = op,
        sql_hash = %sql_hash,
        params = params.len(),
        duration_ms = tracing::field::Empty
    );
    let _guard = span.enter();
    let start = Instant::now();

    let mut stmt = conn.prepare_cached(sql)?;
    let values = to_sql_values(params)?;
    let rows = stmt.execute(rusqlite::params_from_iter(values.iter()))?;
    let duration_ms = start.elapsed().as_millis() as u64;
    span.record("duration_ms", duration_ms);
    Ok(rows as u64)
}

fn execute_batch_on_conn(conn: &rusqlite::Connection, sql: &str) -> Result<(), BackendError> {
    let sql_hash = hash_sql(sql);
    let span = debug_span!(
        "db.exec_batch",
        op = "BATCH",
        sql_hash = %sql_hash,
        duration_ms = tracing::field::Empty
    );
    let _guard = span.enter();
    let start = Instant::now();
    conn.execute_batch(sql)?;
    let duration_ms = start.elapsed().as_millis() as u64;
    span.record("duration_ms", duration_ms);
    Ok(())
}

fn query_on_conn(
    conn: &rusqlite::Connection,
    sql: &str,
    params: &[DbValue],
) -> Result<Vec<DbRow>, BackendError> {
    let op = sql_op_name(sql);
    let sql_hash = hash_sql(sql);
    let span = debug_span!(
        "db.query",
        op = op,
        sql_hash = %sql_hash,
        rows = tracing::field::Empty,
        duration_ms = tracing::field::Empty
    );
    let _guard = span.enter();
    let start = Instant::now();

    let mut stmt = conn.prepare_cached(sql)?;
    let values = to_sql_values(params)?;

    let mut rows_iter = stmt.query(rusqlite::params_from_iter(values.iter()))?;
    let mut columns: Option<Vec<String>> = None;
    let mut result = Vec::new();
    while let Some(row) = rows_iter.next()? {
        // A cached statement re-prepared after ALTER TABLE only reports its
        // new column list once stepped, so names come from the first row.
        let columns = columns.get_or_insert_with(|| {
            row.as_ref()
                .column_names()
                .into_iter()
                .map(str::to_string)
                .collect()
        });
        let mut values = Vec::with_capacity(columns.len());
        for i in 0..columns.len() {
            values.push(value_ref_to_db_value(row.get_ref(i)?));
        }
        result.push(DbRow::new(columns.clone(), values));
    }

    let duration_ms = start.elapsed().as_millis() as u64;
    span.record("rows", result.len());
    span.record("duration_ms", duration_ms);
    Ok(result)
}

/// Convert parameters to owned SQLite values.
///
/// Booleans bind as 0/1, timestamps as RFC3339 text and structured values as
/// canonical JSON text.
fn to_sql_values(params: &[DbValue]) -> Result<Vec<SqlValue>, BackendError> {
    params
        .iter()
        .map(|p| -> Result<SqlValue, BackendError> {
            Ok(match p {
                DbValue::Null => SqlValue::Null,
                DbValue::Integer(v) => SqlValue::Integer(*v),
                DbValue::Unsigned(v) => SqlValue::Integer(i64::try_from(*v).map_err(|_| {
                    BackendError::InvalidInput(format!(
                        "Integer {} exceeds the signed 64-bit range",
                        v
                    ))
                })?),
                DbValue::Real(v) => SqlValue::Real(*v),
                DbValue::Text(v) => SqlValue::Text(v.clone()),
                DbValue::Blob(v) => SqlValue::Blob(v.clone()),
                DbValue::Boolean(v) => SqlValue::Integer(i64::from(*v)),
                DbValue::Timestamp(v) => SqlValue::Text(v.to_rfc3339()),
                DbValue::Json(v) => SqlValue::Text(canonical_json(v)),
            })
        })
        .collect()
}

fn value_ref_to_db_value(value: ValueRef<'_>) -> DbValue {
    match value {
        ValueRef::Null => DbValue::Null,
        ValueRef::Integer(v) => DbValue::Integer(v),
        ValueRef::Real(v) => DbValue::Real(v),
        ValueRef::Text(v) => DbValue::Text(String::from_utf8_lossy(v).into_owned()),
        ValueRef::Blob(v) => DbValue::Blob(v.to_vec()),
    }
}

fn sql_op_name(sql: &str) -> &str {
    sql.split_whitespace().next().unwrap_or("unknown")
}

fn hash_sql(sql: &str) -> String {
    // FNV-1a 64-bit hash for low-cardinality, stable identification.
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in sql.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    format!("{:016x}", hash)
}
