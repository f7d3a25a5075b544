//! SQLite connection layer for Tabula.
//!
//! Everything that talks to the engine goes through this crate: opening
//! connections, binding [`DbValue`] parameters, reading [`DbRow`]s back and
//! scoping work in transactions. Identifier validation lives here too, so no
//! caller-supplied name reaches SQL text unchecked.
//!
//! # Usage
//!
//! ```rust,ignore
//! use tabula_db::{DbConfig, DbConnection, DbValue};
//!
//! let conn = DbConnection::open(&DbConfig::sqlite_memory())?;
//! conn.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)")?;
//! conn.transaction(|tx| {
//!     tx.execute("INSERT INTO t (name) VALUES (?)", &[DbValue::from("Cleo")])
//! })?;
//! ```

mod backend;
mod config;
mod error;
mod ident;
mod value;

pub use backend::{rows_per_chunk, AccessMode, DbConnection, DbTransaction};
pub use config::{DbConfig, DbLocation, DEFAULT_MAX_PARAMS};
pub use error::{BackendError, Result};
pub use ident::{checked_ident, quote_ident, validate_ident, validate_table_ident, IdentError};
pub use value::{
    canonical_json, canonical_json_ascii, DbRow, DbTimestamp, DbTimestampError, DbValue,
    FromDbValue,
};
