//! Upsert behavior: merge semantics, keys and hash ids.

use tabula::{record, Database, DbValue, KeyValue, ReconcileError, WriteOptions};

fn fresh_db() -> Database {
    Database::open_memory().unwrap()
}

#[test]
fn test_upsert_merges_into_existing_row() {
    let db = fresh_db();
    let mut table = db.table("table");
    table
        .insert(record! { "id" => 1, "name" => "Cleo" }, WriteOptions::new().pk("id"))
        .unwrap();

    let outcome = table
        .upsert(
            record! { "id" => 1, "age" => 5 },
            WriteOptions::new().pk("id").alter(true),
        )
        .unwrap();

    let expected = vec![record! { "id" => 1, "name" => "Cleo", "age" => 5 }];
    assert_eq!(outcome.result, expected);
    assert_eq!(table.rows().unwrap(), expected);
    assert_eq!(outcome.last_pk, Some(KeyValue::from(1)));
    assert_eq!(table.last_pk(), Some(&KeyValue::from(1)));
}

#[test]
fn test_upsert_all() {
    let db = fresh_db();
    let mut table = db.table("table");
    table
        .upsert_all(
            vec![
                record! { "id" => 1, "name" => "Cleo" },
                record! { "id" => 2, "name" => "Nixie" },
            ],
            WriteOptions::new().pk("id"),
        )
        .unwrap();

    let outcome = table
        .upsert_all(
            vec![record! { "id" => 1, "age" => 5 }, record! { "id" => 2, "age" => 5 }],
            WriteOptions::new().pk("id").alter(true),
        )
        .unwrap();

    let expected = vec![
        record! { "id" => 1, "name" => "Cleo", "age" => 5 },
        record! { "id" => 2, "name" => "Nixie", "age" => 5 },
    ];
    assert_eq!(outcome.result, expected);
    assert_eq!(table.rows().unwrap(), expected);
    assert_eq!(outcome.last_pk, None);
    assert_eq!(table.last_pk(), None);
}

#[test]
fn test_upsert_all_single_column() {
    let db = fresh_db();
    let mut table = db.table("table");
    let outcome = table
        .upsert_all(vec![record! { "name" => "Cleo" }], WriteOptions::new().pk("name"))
        .unwrap();

    assert_eq!(outcome.result, vec![record! { "name" => "Cleo" }]);
    assert_eq!(table.rows().unwrap(), vec![record! { "name" => "Cleo" }]);
    assert_eq!(table.pks().unwrap(), vec!["name".to_string()]);

    // Key-only upsert of an existing row leaves it alone
    table
        .upsert(record! { "name" => "Cleo" }, WriteOptions::new().pk("name"))
        .unwrap();
    assert_eq!(table.rows().unwrap().len(), 1);
}

#[test]
fn test_upsert_all_not_null() {
    let db = fresh_db();
    let mut comments = db.table("comments");
    let outcome = comments
        .upsert_all(
            vec![record! { "id" => 1, "name" => "Cleo" }],
            WriteOptions::new().pk("id").not_null(["name"]),
        )
        .unwrap();

    assert_eq!(outcome.result, vec![record! { "id" => 1, "name" => "Cleo" }]);
    assert_eq!(comments.rows().unwrap(), outcome.result);
    let schema = comments.schema().unwrap().unwrap();
    assert!(schema.column("name").unwrap().not_null);
}

#[test]
fn test_upsert_error_if_no_pk() {
    let db = fresh_db();
    let mut table = db.table("table");

    let err = table
        .upsert_all(vec![record! { "id" => 1, "name" => "Cleo" }], WriteOptions::new())
        .unwrap_err();
    assert!(matches!(err, ReconcileError::PrimaryKeyRequired { ref table } if table == "table"));

    let err = table
        .upsert(record! { "id" => 1, "name" => "Cleo" }, WriteOptions::new())
        .unwrap_err();
    assert!(matches!(err, ReconcileError::PrimaryKeyRequired { .. }));
    assert!(!table.exists().unwrap());
}

#[test]
fn test_upsert_uses_declared_key_of_existing_table() {
    let db = fresh_db();
    let mut table = db.table("dogs");
    table
        .insert(record! { "id" => 1, "name" => "Cleo" }, WriteOptions::new().pk("id"))
        .unwrap();

    let outcome = table
        .upsert(record! { "id" => 1, "name" => "Pancakes" }, WriteOptions::new())
        .unwrap();
    assert_eq!(outcome.result, vec![record! { "id" => 1, "name" => "Pancakes" }]);
}

#[test]
fn test_upsert_rowid_table_requires_pk() {
    let db = fresh_db();
    db.execute("CREATE TABLE notes (body TEXT)", &[]).unwrap();
    let mut notes = db.table("notes");

    let err = notes
        .upsert(record! { "body" => "hi" }, WriteOptions::new())
        .unwrap_err();
    assert!(matches!(err, ReconcileError::PrimaryKeyRequired { .. }));
}

#[test]
fn test_upsert_with_hash_id() {
    let db = fresh_db();
    let mut table = db.table("table");
    let outcome = table
        .upsert(record! { "foo" => "bar" }, WriteOptions::new().hash_id("pk"))
        .unwrap();

    let expected = vec![record! {
        "pk" => "a5e744d0164540d33b1d7ea616c28f2fa97e754a",
        "foo" => "bar",
    }];
    assert_eq!(outcome.result, expected);
    assert_eq!(table.rows().unwrap(), expected);
    assert_eq!(
        outcome.last_pk,
        Some(KeyValue::from("a5e744d0164540d33b1d7ea616c28f2fa97e754a"))
    );
}

fn check_hash_id_columns(hash_id: Option<&str>) {
    let db = fresh_db();
    let mut table = db.table("table");
    let id_column = hash_id.unwrap_or("id");
    let options = || {
        let options = WriteOptions::new().hash_id_columns(["a", "b"]);
        match hash_id {
            Some(column) => options.hash_id(column),
            None => options,
        }
    };
    let id = "4acc71e0547112eb432f0a36fb1924c4a738cb49";

    let first = table
        .upsert(record! { "a" => 1, "b" => 2, "c" => 3 }, options())
        .unwrap();
    let expected = vec![record! { id_column => id, "a" => 1, "b" => 2, "c" => 3 }];
    assert_eq!(first.result, expected);
    assert_eq!(table.rows().unwrap(), expected);
    assert_eq!(first.last_pk, Some(KeyValue::from(id)));

    let second = table
        .upsert(record! { "a" => 1, "b" => 2, "c" => 4 }, options())
        .unwrap();
    let expected = vec![record! { id_column => id, "a" => 1, "b" => 2, "c" => 4 }];
    assert_eq!(second.result, expected);
    assert_eq!(table.rows().unwrap(), expected);
}

#[test]
fn test_upsert_with_hash_id_columns_default_id() {
    check_hash_id_columns(None);
}

#[test]
fn test_upsert_with_hash_id_columns_custom_id() {
    check_hash_id_columns(Some("custom_id"));
}

#[test]
fn test_upsert_compound_primary_key() {
    let db = fresh_db();
    let mut table = db.table("table");
    let outcome = table
        .upsert_all(
            vec![
                record! { "species" => "dog", "id" => 1, "name" => "Cleo", "age" => 4 },
                record! { "species" => "cat", "id" => 1, "name" => "Catbag" },
            ],
            WriteOptions::new().pk(("species", "id")),
        )
        .unwrap();
    assert_eq!(outcome.last_pk, None);

    let outcome = table
        .upsert(
            record! { "species" => "dog", "id" => 1, "age" => 5 },
            WriteOptions::new().pk(("species", "id")),
        )
        .unwrap();
    assert_eq!(outcome.last_pk, Some(KeyValue::from(("dog", 1))));
    assert_eq!(
        outcome.result,
        vec![record! { "species" => "dog", "id" => 1, "name" => "Cleo", "age" => 5 }]
    );
    assert_eq!(
        table.rows().unwrap(),
        vec![
            record! { "species" => "dog", "id" => 1, "name" => "Cleo", "age" => 5 },
            record! { "species" => "cat", "id" => 1, "name" => "Catbag", "age" => DbValue::Null },
        ]
    );

    // A one-item batch still sets last_pk
    let outcome = table
        .upsert_all(
            vec![record! { "species" => "cat", "id" => 1, "age" => 5 }],
            WriteOptions::new().pk(("species", "id")),
        )
        .unwrap();
    assert_eq!(outcome.last_pk, Some(KeyValue::from(("cat", 1))));
}

#[test]
fn test_upsert_explicit_null_overwrites() {
    let db = fresh_db();
    let mut table = db.table("dogs");
    table
        .insert(
            record! { "id" => 1, "name" => "Cleo", "age" => 4 },
            WriteOptions::new().pk("id"),
        )
        .unwrap();

    let outcome = table
        .upsert(
            record! { "id" => 1, "age" => DbValue::Null },
            WriteOptions::new().pk("id"),
        )
        .unwrap();
    assert_eq!(
        outcome.result,
        vec![record! { "id" => 1, "name" => "Cleo", "age" => DbValue::Null }]
    );
}

#[test]
fn test_upsert_missing_key_value_changes_nothing() {
    let db = fresh_db();
    let mut table = db.table("dogs");
    table
        .insert(record! { "id" => 1, "name" => "Cleo" }, WriteOptions::new().pk("id"))
        .unwrap();

    let err = table
        .upsert_all(
            vec![
                record! { "id" => 1, "name" => "Changed" },
                record! { "name" => "No key" },
            ],
            WriteOptions::new().pk("id"),
        )
        .unwrap_err();
    assert!(matches!(err, ReconcileError::NotFound { .. }));
    assert_eq!(
        table.rows().unwrap(),
        vec![record! { "id" => 1, "name" => "Cleo" }]
    );
}

#[test]
fn test_upsert_schema_drift_without_alter() {
    let db = fresh_db();
    let mut table = db.table("dogs");
    table
        .insert(record! { "id" => 1, "name" => "Cleo" }, WriteOptions::new().pk("id"))
        .unwrap();

    let err = table
        .upsert(record! { "id" => 1, "age" => 5 }, WriteOptions::new().pk("id"))
        .unwrap_err();
    assert!(matches!(err, ReconcileError::SchemaMismatch { .. }));
    let schema = table.schema().unwrap().unwrap();
    assert_eq!(schema.column_names(), vec!["id", "name"]);
}

#[test]
fn test_upsert_omitted_not_null_column_keeps_stored_value() {
    let db = fresh_db();
    let mut comments = db.table("comments");
    comments
        .upsert_all(
            vec![
                record! { "id" => 1, "name" => "Cleo" },
                record! { "id" => 2, "name" => "Nixie" },
            ],
            WriteOptions::new().pk("id").not_null(["name"]),
        )
        .unwrap();

    let outcome = comments
        .upsert_all(
            vec![
                record! { "id" => 1, "name" => "Cleo2" },
                record! { "id" => 2, "age" => 5 },
            ],
            WriteOptions::new().pk("id").alter(true),
        )
        .unwrap();

    let expected = vec![
        record! { "id" => 1, "name" => "Cleo2", "age" => DbValue::Null },
        record! { "id" => 2, "name" => "Nixie", "age" => 5 },
    ];
    assert_eq!(outcome.result, expected);
    assert_eq!(comments.rows().unwrap(), expected);
}

#[test]
fn test_upsert_new_row_missing_not_null_column_fails_atomically() {
    let db = fresh_db();
    let mut comments = db.table("comments");
    comments
        .upsert(
            record! { "id" => 1, "name" => "Cleo" },
            WriteOptions::new().pk("id").not_null(["name"]),
        )
        .unwrap();

    let err = comments
        .upsert_all(
            vec![
                record! { "id" => 1, "name" => "Changed" },
                record! { "id" => 3, "body" => "no name" },
            ],
            WriteOptions::new().pk("id").alter(true),
        )
        .unwrap_err();
    assert!(matches!(err, ReconcileError::Database(_)));
    assert_eq!(
        comments.rows().unwrap(),
        vec![record! { "id" => 1, "name" => "Cleo" }]
    );
}
