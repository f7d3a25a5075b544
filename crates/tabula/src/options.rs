//! Per-database and per-call options.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::keys::{HashId, PrimaryKey, PrimaryKeySpec, DEFAULT_ID_COLUMN};
use crate::schema::TableSchema;

/// Engine behavior shared by every table of a [`crate::Database`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileOptions {
    /// Store a column mixing blob and non-blob values as text instead of failing
    pub lenient_types: bool,
    /// Parse text cells holding a JSON list or mapping back into structures
    pub parse_json: bool,
}

impl ReconcileOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lenient_types(mut self, lenient: bool) -> Self {
        self.lenient_types = lenient;
        self
    }

    pub fn parse_json(mut self, parse: bool) -> Self {
        self.parse_json = parse;
        self
    }
}

/// Options for one insert or upsert call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteOptions {
    pub pk: Option<PrimaryKey>,
    /// Add columns the table lacks instead of failing with `SchemaMismatch`
    pub alter: bool,
    pub hash_id: Option<String>,
    pub hash_id_columns: Option<Vec<String>>,
    /// Columns declared `NOT NULL` when the table is created
    pub not_null: Vec<String>,
    /// Insert only: overwrite rows whose key already exists
    pub replace: bool,
}

impl WriteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pk(mut self, pk: impl Into<PrimaryKey>) -> Self {
        self.pk = Some(pk.into());
        self
    }

    pub fn alter(mut self, alter: bool) -> Self {
        self.alter = alter;
        self
    }

    pub fn hash_id(mut self, column: impl Into<String>) -> Self {
        self.hash_id = Some(column.into());
        self
    }

    pub fn hash_id_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.hash_id_columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn not_null<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.not_null = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn replace(mut self, replace: bool) -> Self {
        self.replace = replace;
        self
    }

    /// Hash id settings, if any. `hash_id_columns` alone implies an `id`
    /// column.
    pub fn hash(&self) -> Option<HashId> {
        let column = match (&self.hash_id, &self.hash_id_columns) {
            (Some(column), _) => column.clone(),
            (None, Some(_)) => DEFAULT_ID_COLUMN.to_string(),
            (None, None) => return None,
        };
        Some(HashId {
            column,
            columns: self.hash_id_columns.clone(),
        })
    }

    /// Whether the caller named a key, directly or through a hash id.
    pub fn names_key(&self) -> bool {
        self.pk.is_some() || self.hash().is_some()
    }

    /// Key specification for this call against `existing`.
    ///
    /// An existing table's declared key always wins; a differing caller pk is
    /// ignored with a warning. A new table takes the hash id column, then the
    /// caller pk, then an implicit `id` rowid alias.
    pub fn key_spec(&self, table: &str, existing: Option<&TableSchema>) -> PrimaryKeySpec {
        let hash = self.hash();
        match existing {
            Some(schema) => {
                let declared = schema.key();
                let declared_columns = declared.key_columns();
                if let Some(pk) = &self.pk {
                    if pk.columns() != declared_columns {
                        warn!(
                            table,
                            requested = ?pk.columns(),
                            declared = ?declared.pks(),
                            "Ignoring pk that differs from the table's declared key"
                        );
                    }
                }
                match hash {
                    Some(hash) if declared_columns == [hash.column.as_str()] => {
                        PrimaryKeySpec::HashDerived {
                            column: hash.column,
                            columns: hash.columns,
                        }
                    }
                    _ => declared.clone(),
                }
            }
            None => match (hash, &self.pk) {
                (Some(hash), pk) => {
                    if let Some(pk) = pk {
                        if pk.columns() != [hash.column.as_str()] {
                            warn!(
                                table,
                                requested = ?pk.columns(),
                                hash_id = %hash.column,
                                "Ignoring pk in favor of hash id column"
                            );
                        }
                    }
                    PrimaryKeySpec::HashDerived {
                        column: hash.column,
                        columns: hash.columns,
                    }
                }
                (None, Some(PrimaryKey::Column(column))) => PrimaryKeySpec::Single(column.clone()),
                (None, Some(PrimaryKey::Compound(columns))) => {
                    PrimaryKeySpec::Compound(columns.clone())
                }
                (None, None) => PrimaryKeySpec::RowidImplicit {
                    alias: Some(DEFAULT_ID_COLUMN.to_string()),
                },
            },
        }
    }
}
