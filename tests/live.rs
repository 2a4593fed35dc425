//! Integration tests against a live database.
//!
//! They run only when `DBNAME`, `DBUSER` and `DBPASS` point at a test
//! schema the tests may create tables in; without them every test is a
//! silent no-op.

use oradb::{CancelToken, Config, Connection, Error, Isolation, SqlArg, Value};

fn config() -> Option<Config> {
    let dblink = std::env::var("DBNAME").ok()?;
    let username = std::env::var("DBUSER").ok()?;
    let password = std::env::var("DBPASS").ok()?;
    Some(Config { dblink, username, password, ..Config::default() })
}

fn connect() -> Option<Connection> {
    let cfg = config()?;
    Some(Connection::open(&cfg).expect("cannot open test connection"))
}

/// Creates `name` fresh, dropping a leftover from an earlier run.
fn recreate_table(conn: &Connection, name: &str, columns: &str) {
    let _ = conn.execute(&format!("DROP TABLE {}", name), &mut []);
    conn.execute(&format!("CREATE TABLE {} ({})", name, columns), &mut [])
        .expect("cannot create test table");
}

#[test]
fn open_ping_close() {
    let Some(conn) = connect() else { return };
    conn.ping().expect("fresh connection should answer a ping");
    assert!(conn.is_open());
    conn.close().expect("close");
    assert!(!conn.is_open());
    // close is idempotent
    conn.close().expect("second close");
    assert!(matches!(conn.ping(), Err(Error::BadConnection(_))));
}

#[test]
fn dml_round_trip() {
    let Some(conn) = connect() else { return };
    recreate_table(&conn, "oradb_t_dml", "id NUMBER(10), label VARCHAR2(40), weight BINARY_DOUBLE");

    let result = conn
        .execute(
            "INSERT INTO oradb_t_dml VALUES (:1, :2, :3)",
            &mut [
                SqlArg::In(Value::Int(1)),
                SqlArg::In(Value::Text("first".into())),
                SqlArg::In(Value::Float(1.5)),
            ],
        )
        .expect("insert");
    assert_eq!(result.rows_affected, 1);
    assert!(result.row_id.is_some(), "single-row insert reports a rowid");

    let mut rows = conn
        .query("SELECT id, label, weight FROM oradb_t_dml WHERE id = :1", &[Value::Int(1)])
        .expect("query");
    let row = rows.next().expect("fetch").expect("one row");
    assert_eq!(row.get(0), Some(&Value::Int(1)));
    assert_eq!(row.get(1), Some(&Value::Text("first".into())));
    assert_eq!(row.get(2), Some(&Value::Float(1.5)));
    assert!(rows.next().expect("fetch past end").is_none());
    rows.close().expect("close cursor");
}

#[test]
fn nulls_and_empty_strings() {
    let Some(conn) = connect() else { return };
    recreate_table(&conn, "oradb_t_null", "id NUMBER(10), label VARCHAR2(40)");

    // an empty string binds as SQL NULL
    conn.execute(
        "INSERT INTO oradb_t_null VALUES (:1, :2)",
        &mut [SqlArg::In(Value::Int(1)), SqlArg::In(Value::Text(String::new()))],
    )
    .expect("insert");

    let mut rows = conn
        .query("SELECT label FROM oradb_t_null WHERE id = 1", &[])
        .expect("query");
    let row = rows.next().expect("fetch").expect("one row");
    assert_eq!(row.get(0), Some(&Value::Null));
}

#[test]
fn char_columns_come_back_padded_varchar_columns_do_not() {
    let Some(conn) = connect() else { return };
    recreate_table(&conn, "oradb_t_pad", "fixed CHAR(10), var VARCHAR2(10)");

    conn.execute(
        "INSERT INTO oradb_t_pad VALUES (:1, :2)",
        &mut [SqlArg::In(Value::Text("abc".into())), SqlArg::In(Value::Text("abc".into()))],
    )
    .expect("insert");

    let mut rows = conn.query("SELECT fixed, var FROM oradb_t_pad", &[]).expect("query");
    let row = rows.next().expect("fetch").expect("one row");
    // CHAR pads to the declared width, VARCHAR2 stores what it was given
    assert_eq!(row.get(0), Some(&Value::Text("abc       ".into())));
    assert_eq!(row.get(1), Some(&Value::Text("abc".into())));
}

#[test]
fn question_mark_placeholders() {
    let Some(cfg) = config() else { return };
    let cfg = Config { question_placeholders: true, ..cfg };
    let conn = Connection::open(&cfg).expect("open");
    let mut rows = conn
        .query("SELECT ? + ? FROM dual", &[Value::Int(2), Value::Int(3)])
        .expect("query");
    let row = rows.next().expect("fetch").expect("one row");
    assert_eq!(row.get(0), Some(&Value::Int(5)));
}

#[test]
fn named_parameters_and_out_binds() {
    let Some(conn) = connect() else { return };
    let mut doubled = Value::Int(0);
    let stmt = conn.prepare("BEGIN :outv := :inv * 2; END;").expect("prepare");
    stmt.execute_named(&mut [
        ("outv", SqlArg::Out(&mut doubled)),
        ("inv", SqlArg::In(Value::Int(21))),
    ])
    .expect("execute");
    assert_eq!(doubled, Value::Int(42));
}

#[test]
fn out_bind_needs_typed_template() {
    let Some(conn) = connect() else { return };
    let mut out = Value::Null;
    let err = conn
        .execute("BEGIN :o := 1; END;", &mut [SqlArg::Out(&mut out)])
        .expect_err("a NULL OUT template cannot select a type");
    assert!(matches!(err, Error::Conversion(_)));
}

#[test]
fn transactions_commit_and_rollback() {
    let Some(conn) = connect() else { return };
    recreate_table(&conn, "oradb_t_txn", "id NUMBER(10)");

    conn.begin().expect("begin");
    conn.execute("INSERT INTO oradb_t_txn VALUES (1)", &mut []).expect("insert");
    conn.rollback().expect("rollback");

    conn.begin().expect("begin again");
    conn.execute("INSERT INTO oradb_t_txn VALUES (2)", &mut []).expect("insert");
    conn.commit().expect("commit");

    let mut rows = conn.query("SELECT id FROM oradb_t_txn ORDER BY id", &[]).expect("query");
    let row = rows.next().expect("fetch").expect("the committed row");
    assert_eq!(row.get(0), Some(&Value::Int(2)));
    assert!(rows.next().expect("fetch").is_none(), "the rolled-back row is gone");
}

#[test]
fn nested_begin_is_rejected() {
    let Some(conn) = connect() else { return };
    conn.begin().expect("begin");
    assert!(matches!(conn.begin(), Err(Error::Interface(_))));
    conn.rollback().expect("rollback");
}

#[test]
fn configured_read_only_isolation_applies() {
    let Some(cfg) = config() else { return };
    let setup = Connection::open(&cfg).expect("open");
    recreate_table(&setup, "oradb_t_ro", "id NUMBER(10)");
    setup.close().expect("close");

    let cfg = Config { isolation: Isolation::ReadOnly, ..cfg };
    let conn = Connection::open(&cfg).expect("open");
    conn.begin().expect("begin");
    // ORA-01456: DML is rejected inside a READ ONLY transaction
    let err = conn
        .execute("INSERT INTO oradb_t_ro VALUES (1)", &mut [])
        .expect_err("insert in a read-only transaction");
    match err {
        Error::Statement(diag) => assert_eq!(diag.code, 1456, "got {}", diag),
        other => panic!("expected a statement error, got {}", other),
    }
    // reads still work
    let mut rows = conn.query("SELECT COUNT(*) FROM oradb_t_ro", &[]).expect("query");
    assert_eq!(rows.next().expect("fetch").expect("one row").get(0), Some(&Value::Int(0)));
    conn.rollback().expect("rollback");
}

#[test]
fn batch_insert_and_first_error() {
    let Some(conn) = connect() else { return };
    recreate_table(&conn, "oradb_t_batch", "id NUMBER(2) PRIMARY KEY, label VARCHAR2(10)");

    let stmt = conn.prepare("INSERT INTO oradb_t_batch VALUES (:1, :2)").expect("prepare");
    let mut batch = stmt.batch();
    for i in 0..5i64 {
        batch.add(vec![Value::Int(i), Value::Text(format!("row {}", i))]).expect("add");
    }
    let result = batch.execute().expect("clean batch");
    assert_eq!(result.rows_affected, 5);

    // row 2 violates the primary key; rows 0 and 1 still go through
    let mut batch = stmt.batch();
    batch.add(vec![Value::Int(10), Value::Text("a".into())]).expect("add");
    batch.add(vec![Value::Int(11), Value::Text("b".into())]).expect("add");
    batch.add(vec![Value::Int(10), Value::Text("dup".into())]).expect("add");
    match batch.execute() {
        Err(Error::Batch { offset, error, affected }) => {
            assert_eq!(offset, 2);
            assert_eq!(error.code, 1, "expected ORA-00001, got {}", error);
            assert_eq!(affected, 2);
        }
        other => panic!("expected a batch error, got {:?}", other.map(|r| r.rows_affected)),
    }
}

#[test]
fn batch_rejects_ragged_rows() {
    let Some(conn) = connect() else { return };
    let stmt = conn.prepare("INSERT INTO dual VALUES (:1, :2)").expect("prepare");
    let mut batch = stmt.batch();
    batch.add(vec![Value::Int(1), Value::Int(2)]).expect("first row");
    assert!(matches!(batch.add(vec![Value::Int(3)]), Err(Error::Interface(_))));
}

#[test]
fn timestamps_round_trip() {
    let Some(conn) = connect() else { return };
    recreate_table(&conn, "oradb_t_ts", "id NUMBER(10), at TIMESTAMP(9) WITH TIME ZONE");

    let sent = oradb::Zoned::Fixed(
        chrono::DateTime::parse_from_rfc3339("2024-03-15T13:45:30.5+02:00").unwrap(),
    );
    conn.execute(
        "INSERT INTO oradb_t_ts VALUES (:1, :2)",
        &mut [SqlArg::In(Value::Int(1)), SqlArg::In(Value::Timestamp(sent.clone()))],
    )
    .expect("insert");

    let mut rows = conn.query("SELECT at FROM oradb_t_ts WHERE id = 1", &[]).expect("query");
    let row = rows.next().expect("fetch").expect("one row");
    match row.get(0) {
        Some(Value::Timestamp(got)) => assert_eq!(got, &sent, "same instant and offset"),
        other => panic!("expected a timestamp, got {:?}", other),
    }
}

#[test]
fn long_and_lob_columns() {
    let Some(conn) = connect() else { return };
    recreate_table(&conn, "oradb_t_lob", "id NUMBER(10), doc CLOB, bin BLOB");

    let text = "x".repeat(10_000);
    let raw = vec![0xA5u8; 10_000];
    conn.execute(
        "INSERT INTO oradb_t_lob VALUES (:1, :2, :3)",
        &mut [
            SqlArg::In(Value::Int(1)),
            SqlArg::In(Value::Text(text.clone())),
            SqlArg::In(Value::Bytes(raw.clone())),
        ],
    )
    .expect("insert");

    let mut rows = conn.query("SELECT doc, bin FROM oradb_t_lob WHERE id = 1", &[]).expect("query");
    let row = rows.next().expect("fetch").expect("one row");
    assert_eq!(row.get(0), Some(&Value::Text(text)));
    assert_eq!(row.get(1), Some(&Value::Bytes(raw)));
}

#[test]
fn cancellation_interrupts_a_slow_call() {
    let Some(conn) = connect() else { return };
    let token = CancelToken::new();
    let guard = conn.watch(&token);
    // fire the break while the cross join below grinds
    let canceller = token.clone();
    let trigger = std::thread::spawn(move || {
        std::thread::sleep(std::time::Duration::from_millis(200));
        canceller.cancel();
    });
    let result = conn.query(
        "SELECT COUNT(*) FROM all_objects a, all_objects b, all_objects c",
        &[],
    );
    trigger.join().unwrap();
    drop(guard);
    match result {
        Err(Error::Cancelled) => {}
        Ok(_) => panic!("the query finished before the break landed; enlarge it"),
        Err(other) => panic!("expected a cancellation, got {}", other),
    }
    // the session survives the break
    conn.ping().expect("connection should remain usable");
}

#[test]
fn watch_without_cancel_is_harmless() {
    let Some(conn) = connect() else { return };
    let token = CancelToken::new();
    {
        let _guard = conn.watch(&token);
        let mut rows = conn.query("SELECT 1 FROM dual", &[]).expect("query");
        assert!(rows.next().expect("fetch").is_some());
    }
    assert!(!token.is_cancelled());
    conn.ping().expect("ping after guard drop");
}

#[test]
fn prepared_statement_is_reusable() {
    let Some(conn) = connect() else { return };
    let stmt = conn.prepare("SELECT :1 + 1 FROM dual").expect("prepare");
    for i in 0..3i64 {
        let mut rows = stmt.query(&[Value::Int(i)]).expect("query");
        let row = rows.next().expect("fetch").expect("one row");
        assert_eq!(row.get(0), Some(&Value::Int(i + 1)));
    }
    stmt.close().expect("close");
    stmt.close().expect("second close is a no-op");
    assert!(matches!(stmt.query(&[Value::Int(0)]), Err(Error::Interface(_))));
}

#[test]
fn number_columns_keep_their_kind() {
    let Some(conn) = connect() else { return };
    let mut rows = conn
        .query(
            "SELECT CAST(7 AS NUMBER(10)), CAST(2.5 AS NUMBER(10,2)), CAST(1.5 AS FLOAT) FROM dual",
            &[],
        )
        .expect("query");
    let row = rows.next().expect("fetch").expect("one row");
    assert_eq!(row.get(0), Some(&Value::Int(7)));
    assert_eq!(row.get(1), Some(&Value::Float(2.5)));
    assert_eq!(row.get(2), Some(&Value::Float(1.5)));
}

#[test]
fn column_names_are_reported() {
    let Some(conn) = connect() else { return };
    let rows = conn
        .query("SELECT 1 AS one, 'x' AS label FROM dual", &[])
        .expect("query");
    assert_eq!(rows.column_names(), vec!["ONE", "LABEL"]);
    assert_eq!(rows.column_count(), 2);
}
