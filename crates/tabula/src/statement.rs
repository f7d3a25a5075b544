//! SQL text for every statement the engine issues.
//!
//! Identifiers are validated and quoted here; values are never interpolated
//! and always travel as bound parameters.

use tabula_db::{checked_ident, IdentError};

use crate::infer::StorageType;
use crate::keys::PrimaryKeySpec;

pub(crate) const TABLE_INFO_SQL: &str =
    "SELECT name, type, \"notnull\", pk FROM pragma_table_info(?) ORDER BY cid";
pub(crate) const TABLE_EXISTS_SQL: &str =
    "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?";
pub(crate) const TABLE_NAMES_SQL: &str =
    "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name";

fn quote_all<'a>(columns: impl IntoIterator<Item = &'a str>) -> Result<Vec<String>, IdentError> {
    columns.into_iter().map(checked_ident).collect()
}

/// `CREATE TABLE` with key columns declared per `spec`.
///
/// `columns` must already list the key columns first.
pub fn create_table(
    table: &str,
    columns: &[(String, StorageType)],
    spec: &PrimaryKeySpec,
    not_null: &[String],
) -> Result<String, IdentError> {
    let inline_pk: Option<&str> = match spec {
        PrimaryKeySpec::RowidImplicit { alias } => alias.as_deref(),
        PrimaryKeySpec::Single(column) => Some(column.as_str()),
        PrimaryKeySpec::HashDerived { column, .. } => Some(column.as_str()),
        PrimaryKeySpec::Compound(_) => None,
    };

    let mut defs = Vec::with_capacity(columns.len() + 1);
    for (name, ty) in columns {
        let mut def = format!("{} {}", checked_ident(name)?, ty.sql_name());
        if inline_pk == Some(name.as_str()) {
            def.push_str(" PRIMARY KEY");
        }
        if not_null.iter().any(|n| n == name) {
            def.push_str(" NOT NULL");
        }
        defs.push(def);
    }
    if let PrimaryKeySpec::Compound(keys) = spec {
        let keys = quote_all(keys.iter().map(String::as_str))?;
        defs.push(format!("PRIMARY KEY ({})", keys.join(", ")));
    }

    Ok(format!(
        "CREATE TABLE {} (\n    {}\n)",
        checked_ident(table)?,
        defs.join(",\n    ")
    ))
}

pub fn add_column(table: &str, column: &str, ty: StorageType) -> Result<String, IdentError> {
    Ok(format!(
        "ALTER TABLE {} ADD COLUMN {} {}",
        checked_ident(table)?,
        checked_ident(column)?,
        ty.sql_name()
    ))
}

/// Multi-row insert with a fixed column list.
#[derive(Debug, Clone)]
pub struct InsertStatement {
    prefix: String,
    row: String,
}

impl InsertStatement {
    pub fn new<'a>(
        table: &str,
        columns: impl IntoIterator<Item = &'a str>,
        replace: bool,
    ) -> Result<Self, IdentError> {
        let columns = quote_all(columns)?;
        let verb = if replace {
            "INSERT OR REPLACE INTO"
        } else {
            "INSERT INTO"
        };
        let prefix = if columns.is_empty() {
            format!("{} {} DEFAULT VALUES", verb, checked_ident(table)?)
        } else {
            format!("{} {} ({}) VALUES ", verb, checked_ident(table)?, columns.join(", "))
        };
        let row = format!("({})", vec!["?"; columns.len()].join(", "));
        Ok(Self { prefix, row })
    }

    /// Statement text for `rows` value tuples.
    pub fn sql(&self, rows: usize) -> String {
        if self.row == "()" {
            return self.prefix.clone();
        }
        let mut sql = String::with_capacity(self.prefix.len() + rows * (self.row.len() + 2));
        sql.push_str(&self.prefix);
        for i in 0..rows {
            if i > 0 {
                sql.push_str(", ");
            }
            sql.push_str(&self.row);
        }
        sql
    }
}

/// Conflict-aware insert of one record's own `columns`.
///
/// Parameters are the values of `columns` in order (`?1..?n`). On conflict
/// only the non-key columns listed here are overwritten, so columns the
/// record omits keep their stored values and are never bound as `NULL`.
pub fn upsert(
    table: &str,
    columns: &[&str],
    key_columns: &[&str],
) -> Result<String, IdentError> {
    let quoted = quote_all(columns.iter().copied())?;
    let keys = quote_all(key_columns.iter().copied())?;
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();

    let assignments: Vec<String> = columns
        .iter()
        .zip(&quoted)
        .filter(|(name, _)| !key_columns.contains(*name))
        .map(|(_, q)| format!("{q} = excluded.{q}", q = q))
        .collect();

    let action = if assignments.is_empty() {
        "DO NOTHING".to_string()
    } else {
        format!("DO UPDATE SET {}", assignments.join(", "))
    };

    Ok(format!(
        "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({}) {}",
        checked_ident(table)?,
        quoted.join(", "),
        placeholders.join(", "),
        keys.join(", "),
        action
    ))
}

/// `WHERE` clause matching every key column, or the bare rowid.
fn key_predicate(key_columns: &[&str]) -> Result<String, IdentError> {
    if key_columns.is_empty() {
        return Ok("rowid = ?".to_string());
    }
    let parts = quote_all(key_columns.iter().copied())?
        .into_iter()
        .map(|k| format!("{} = ?", k))
        .collect::<Vec<_>>();
    Ok(parts.join(" AND "))
}

pub fn select_by_key(table: &str, key_columns: &[&str]) -> Result<String, IdentError> {
    Ok(format!(
        "SELECT * FROM {} WHERE {}",
        checked_ident(table)?,
        key_predicate(key_columns)?
    ))
}

pub fn select_by_rowid(table: &str) -> Result<String, IdentError> {
    select_by_key(table, &[])
}

pub fn select_all(table: &str) -> Result<String, IdentError> {
    Ok(format!("SELECT * FROM {} ORDER BY rowid", checked_ident(table)?))
}

/// `UPDATE` of `columns` for the row matching the key. Parameters are the new
/// values followed by the key components.
pub fn update(
    table: &str,
    columns: &[&str],
    key_columns: &[&str],
) -> Result<String, IdentError> {
    let sets = quote_all(columns.iter().copied())?
        .into_iter()
        .map(|c| format!("{} = ?", c))
        .collect::<Vec<_>>();
    Ok(format!(
        "UPDATE {} SET {} WHERE {}",
        checked_ident(table)?,
        sets.join(", "),
        key_predicate(key_columns)?
    ))
}
