//! Schema state and schema sync.
//!
//! A [`TableSchema`] is read from the database at the start of each call and
//! re-read after DDL; nothing is cached between calls.

use serde::Serialize;
use tabula_db::{validate_ident, validate_table_ident, DbConnection, DbRow, DbTransaction};
use tracing::{debug, info};

use crate::error::{ReconcileError, Result};
use crate::infer::StorageType;
use crate::keys::PrimaryKeySpec;
use crate::statement;
use crate::unify::UnifiedSchema;

/// One persisted column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    /// Declared type as written in the table definition
    pub declared_type: String,
    pub not_null: bool,
    /// 1-based position in the primary key, 0 when not part of it
    pub pk_index: usize,
}

impl ColumnInfo {
    pub fn storage_type(&self) -> StorageType {
        StorageType::from_declared(&self.declared_type)
    }
}

/// Columns and primary key of an existing table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSchema {
    name: String,
    columns: Vec<ColumnInfo>,
    key: PrimaryKeySpec,
}

impl TableSchema {
    /// Read the schema of `table`, or `None` when it does not exist.
    pub fn load(conn: &DbConnection, table: &str) -> Result<Option<Self>> {
        let rows = conn.query_all(statement::TABLE_INFO_SQL, &[table.into()])?;
        Self::from_rows(table, rows)
    }

    /// Same as [`TableSchema::load`], inside a transaction.
    pub fn load_in(tx: &mut DbTransaction<'_>, table: &str) -> Result<Option<Self>> {
        let rows = tx.query_all(statement::TABLE_INFO_SQL, &[table.into()])?;
        Self::from_rows(table, rows)
    }

    fn from_rows(table: &str, rows: Vec<DbRow>) -> Result<Option<Self>> {
        if rows.is_empty() {
            return Ok(None);
        }
        let mut columns = Vec::with_capacity(rows.len());
        for row in rows {
            let pk: i64 = row.get_by_name("pk")?;
            columns.push(ColumnInfo {
                name: row.get_by_name("name")?,
                declared_type: row.get_by_name::<Option<String>>("type")?.unwrap_or_default(),
                not_null: row.get_by_name::<i64>("notnull")? != 0,
                pk_index: usize::try_from(pk).unwrap_or(0),
            });
        }
        let key = declared_key(&columns);
        Ok(Some(Self {
            name: table.to_string(),
            columns,
            key,
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Declared primary key.
    pub fn key(&self) -> &PrimaryKeySpec {
        &self.key
    }

    /// Key column names; `["rowid"]` when the table declares none.
    pub fn pks(&self) -> Vec<String> {
        self.key.pks()
    }
}

fn declared_key(columns: &[ColumnInfo]) -> PrimaryKeySpec {
    let mut keyed: Vec<&ColumnInfo> = columns.iter().filter(|c| c.pk_index > 0).collect();
    keyed.sort_by_key(|c| c.pk_index);
    match keyed.as_slice() {
        [] => PrimaryKeySpec::RowidImplicit { alias: None },
        [only] if only.declared_type.eq_ignore_ascii_case("INTEGER") => {
            PrimaryKeySpec::RowidImplicit {
                alias: Some(only.name.clone()),
            }
        }
        [only] => PrimaryKeySpec::Single(only.name.clone()),
        many => PrimaryKeySpec::Compound(many.iter().map(|c| c.name.clone()).collect()),
    }
}

/// Brings a table in line with the columns a call needs.
pub struct SchemaManager<'a, 'tx> {
    tx: &'a mut DbTransaction<'tx>,
    table: &'a str,
}

impl<'a, 'tx> SchemaManager<'a, 'tx> {
    pub fn new(tx: &'a mut DbTransaction<'tx>, table: &'a str) -> Self {
        Self { tx, table }
    }

    /// Create the table, or add the columns it lacks.
    ///
    /// Every identifier and every `not_null` request is checked before the
    /// first statement runs. Returns the schema as persisted afterwards.
    pub fn sync(
        &mut self,
        existing: Option<&TableSchema>,
        desired: &UnifiedSchema,
        spec: &PrimaryKeySpec,
        alter: bool,
        not_null: &[String],
    ) -> Result<TableSchema> {
        let table = self.table;
        validate_table_ident(table).map_err(|e| ReconcileError::invalid_identifier(table, e))?;
        for column in desired.column_names() {
            validate_ident(column).map_err(|e| ReconcileError::invalid_identifier(table, e))?;
        }

        match existing {
            None => self.create(desired, spec, not_null)?,
            Some(schema) => self.add_missing(schema, desired, alter, not_null)?,
        }

        TableSchema::load_in(self.tx, table)?.ok_or_else(|| {
            ReconcileError::not_found(table, "table disappeared during schema sync")
        })
    }

    fn create(
        &mut self,
        desired: &UnifiedSchema,
        spec: &PrimaryKeySpec,
        not_null: &[String],
    ) -> Result<()> {
        let table = self.table;
        for column in not_null {
            if !desired.contains(column) {
                debug!(table, column = %column, "Ignoring not_null for column absent from batch");
            }
        }
        let sql = statement::create_table(table, desired.columns(), spec, not_null)
            .map_err(|e| ReconcileError::invalid_identifier(table, e))?;
        self.tx.execute(&sql, &[])?;
        info!(
            table,
            columns = desired.len(),
            pks = ?spec.pks(),
            "Created table"
        );
        Ok(())
    }

    fn add_missing(
        &mut self,
        schema: &TableSchema,
        desired: &UnifiedSchema,
        alter: bool,
        not_null: &[String],
    ) -> Result<()> {
        let table = self.table;
        let missing: Vec<(String, StorageType)> = desired
            .columns()
            .iter()
            .filter(|(name, _)| !schema.has_column(name))
            .cloned()
            .collect();

        for column in not_null {
            let already_enforced = schema.column(column).map_or(false, |c| c.not_null);
            let touched = schema.has_column(column) || missing.iter().any(|(n, _)| n == column);
            if touched && !already_enforced {
                return Err(ReconcileError::NotNullUnsupported {
                    table: table.to_string(),
                    column: column.clone(),
                });
            }
        }

        if missing.is_empty() {
            return Ok(());
        }
        if !alter {
            return Err(ReconcileError::SchemaMismatch {
                table: table.to_string(),
                columns: missing.into_iter().map(|(name, _)| name).collect(),
            });
        }

        let mut statements = Vec::with_capacity(missing.len());
        for (name, ty) in &missing {
            let sql = statement::add_column(table, name, *ty)
                .map_err(|e| ReconcileError::invalid_identifier(table, e))?;
            statements.push((sql, name, ty));
        }
        for (sql, name, ty) in statements {
            self.tx.execute(&sql, &[])?;
            info!(table, column = %name, storage_type = %ty, "Added column");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record;
    use crate::unify::unify;

    fn open() -> DbConnection {
        DbConnection::open_sqlite_memory().unwrap()
    }

    #[test]
    fn test_load_missing_table() {
        let conn = open();
        assert!(TableSchema::load(&conn, "nope").unwrap().is_none());
    }

    #[test]
    fn test_declared_keys() {
        let conn = open();
        conn.execute_batch(
            "CREATE TABLE a (id INTEGER PRIMARY KEY, v TEXT);
             CREATE TABLE b (name TEXT PRIMARY KEY);
             CREATE TABLE c (x TEXT, y INTEGER, z TEXT, PRIMARY KEY (y, x));
             CREATE TABLE d (v TEXT);",
        )
        .unwrap();

        let key = |t: &str| TableSchema::load(&conn, t).unwrap().unwrap().key().clone();
        assert_eq!(
            key("a"),
            PrimaryKeySpec::RowidImplicit {
                alias: Some("id".to_string())
            }
        );
        assert_eq!(key("b"), PrimaryKeySpec::Single("name".to_string()));
        assert_eq!(
            key("c"),
            PrimaryKeySpec::Compound(vec!["y".to_string(), "x".to_string()])
        );
        assert_eq!(key("d"), PrimaryKeySpec::RowidImplicit { alias: None });
    }

    #[test]
    fn test_sync_creates_then_rejects_drift() {
        let conn = open();
        let spec = PrimaryKeySpec::RowidImplicit {
            alias: Some("id".to_string()),
        };
        let first = unify("dogs", &[record! { "id" => 1, "name" => "Cleo" }], &["id"], false)
            .unwrap();
        let created = conn
            .transaction(|tx| SchemaManager::new(tx, "dogs").sync(None, &first, &spec, false, &[]))
            .unwrap();
        assert_eq!(created.column_names(), vec!["id", "name"]);

        let drift = unify("dogs", &[record! { "id" => 2, "age" => 4 }], &["id"], false).unwrap();
        let err = conn
            .transaction(|tx| {
                SchemaManager::new(tx, "dogs").sync(Some(&created), &drift, &spec, false, &[])
            })
            .unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::SchemaMismatch { ref columns, .. } if columns == &vec!["age".to_string()]
        ));

        let altered = conn
            .transaction(|tx| {
                SchemaManager::new(tx, "dogs").sync(Some(&created), &drift, &spec, true, &[])
            })
            .unwrap();
        assert_eq!(altered.column_names(), vec!["id", "name", "age"]);
        assert_eq!(
            altered.column("age").unwrap().storage_type(),
            StorageType::Integer
        );
    }

    #[test]
    fn test_invalid_identifier_leaves_table_untouched() {
        let conn = open();
        conn.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY, foo TEXT)")
            .unwrap();
        let existing = TableSchema::load(&conn, "t").unwrap().unwrap();
        let desired = unify(
            "t",
            &[record! { "ok_col" => 1, "new_col[abc]" => 1.2 }],
            &[],
            false,
        )
        .unwrap();

        let err = conn
            .transaction(|tx| {
                SchemaManager::new(tx, "t").sync(Some(&existing), &desired, existing.key(), true, &[])
            })
            .unwrap_err();
        assert!(matches!(err, ReconcileError::InvalidIdentifier { .. }));
        let after = TableSchema::load(&conn, "t").unwrap().unwrap();
        assert_eq!(after.column_names(), vec!["id", "foo"]);
    }

    #[test]
    fn test_not_null_on_existing_table() {
        let conn = open();
        conn.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT NOT NULL, v TEXT)")
            .unwrap();
        let existing = TableSchema::load(&conn, "t").unwrap().unwrap();
        let desired = unify("t", &[record! { "id" => 1, "name" => "a", "v" => "b" }], &[], false)
            .unwrap();

        let enforced = conn.transaction(|tx| {
            SchemaManager::new(tx, "t").sync(
                Some(&existing),
                &desired,
                existing.key(),
                false,
                &["name".to_string()],
            )
        });
        assert!(enforced.is_ok());

        let err = conn
            .transaction(|tx| {
                SchemaManager::new(tx, "t").sync(
                    Some(&existing),
                    &desired,
                    existing.key(),
                    false,
                    &["v".to_string()],
                )
            })
            .unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::NotNullUnsupported { ref column, .. } if column == "v"
        ));
    }
}
