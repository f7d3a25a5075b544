//! Schema-inferring table reconciliation.
//!
//! Hand Tabula records (column name to value) and it creates, evolves and
//! populates SQLite tables to fit them:
//!
//! 1. **Infer**: each value maps to a storage type ([`infer`])
//! 2. **Unify**: a batch settles on one type per column ([`unify`])
//! 3. **Key**: explicit, compound, rowid or content-hash keys ([`keys`])
//! 4. **Sync**: `CREATE TABLE` or `ALTER TABLE ADD COLUMN` ([`schema`])
//! 5. **Write**: insert, upsert or update, then re-read what was persisted
//!
//! Each write is one transaction. Schema changes and rows commit together or
//! not at all.
//!
//! # Usage
//!
//! ```rust,ignore
//! use tabula::{record, Database, WriteOptions};
//!
//! let db = Database::open_memory()?;
//! let mut dogs = db.table("dogs");
//! dogs.insert(record! { "id" => 1, "name" => "Cleo" }, WriteOptions::new().pk("id"))?;
//! let merged = dogs.upsert(
//!     record! { "id" => 1, "age" => 5 },
//!     WriteOptions::new().pk("id").alter(true),
//! )?;
//! assert_eq!(merged.result, vec![record! { "id" => 1, "name" => "Cleo", "age" => 5 }]);
//! ```

mod database;
mod engine;
pub mod error;
pub mod infer;
pub mod keys;
mod options;
mod record;
pub mod schema;
pub mod statement;
mod table;
pub mod unify;

pub use database::Database;
pub use engine::WriteOutcome;
pub use error::{ReconcileError, Result};
pub use infer::{infer, StorageType};
pub use keys::{hash_record, HashId, KeyValue, PrimaryKey, PrimaryKeySpec};
pub use options::{ReconcileOptions, WriteOptions};
pub use record::Record;
pub use schema::{ColumnInfo, SchemaManager, TableSchema};
pub use table::Table;
pub use unify::{unify, UnifiedSchema};

pub use tabula_db::{DbConfig, DbTimestamp, DbValue};
