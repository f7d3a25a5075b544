use tabula_db::{AccessMode, BackendError, DbConfig, DbConnection, DbValue};
use tempfile::TempDir;

#[test]
fn test_open_creates_database_and_parent_dirs() {
    let tmp = TempDir::new().unwrap();
    let db_path = tmp.path().join("nested").join("data.db");

    let conn = DbConnection::open(&DbConfig::sqlite(&db_path)).unwrap();
    conn.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY)")
        .unwrap();

    assert!(db_path.exists());
    assert!(conn.is_writable());
    assert_eq!(conn.backend_name(), "SQLite");
}

#[test]
fn test_committed_rows_survive_reopen() {
    let tmp = TempDir::new().unwrap();
    let db_path = tmp.path().join("data.db");

    {
        let conn = DbConnection::open_sqlite(&db_path).unwrap();
        conn.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)")
            .unwrap();
        conn.transaction(|tx| {
            tx.execute("INSERT INTO t (name) VALUES (?)", &[DbValue::from("Cleo")])
        })
        .unwrap();
    }

    let conn = DbConnection::open_sqlite(&db_path).unwrap();
    let name: String = conn
        .query_scalar("SELECT name FROM t WHERE id = ?", &[DbValue::from(1_i64)])
        .unwrap();
    assert_eq!(name, "Cleo");
}

#[test]
fn test_readonly_connection_rejects_writes() {
    let tmp = TempDir::new().unwrap();
    let db_path = tmp.path().join("data.db");
    {
        let conn = DbConnection::open(&DbConfig::sqlite(&db_path).with_wal(false)).unwrap();
        conn.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY)")
            .unwrap();
    }

    let conn = DbConnection::open_sqlite_readonly(&db_path).unwrap();
    assert_eq!(conn.access_mode(), AccessMode::ReadOnly);

    let err = conn.execute("INSERT INTO t (id) VALUES (1)", &[]).unwrap_err();
    assert!(matches!(err, BackendError::ReadOnly));

    let err = conn
        .transaction(|tx| tx.execute("INSERT INTO t (id) VALUES (1)", &[]))
        .unwrap_err();
    assert!(matches!(err, BackendError::ReadOnly));

    let count: i64 = conn.query_scalar("SELECT COUNT(*) FROM t", &[]).unwrap();
    assert_eq!(count, 0);
}

#[test]
fn test_constraint_errors_propagate_unchanged() {
    let conn = DbConnection::open_sqlite_memory().unwrap();
    conn.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY)")
        .unwrap();
    conn.execute("INSERT INTO t (id) VALUES (1)", &[]).unwrap();

    let err = conn.execute("INSERT INTO t (id) VALUES (1)", &[]).unwrap_err();
    match err {
        BackendError::Database(rusqlite_err) => {
            assert_eq!(
                rusqlite_err.sqlite_error_code(),
                Some(rusqlite::ErrorCode::ConstraintViolation)
            );
        }
        other => panic!("expected database error, got {:?}", other),
    }
}
