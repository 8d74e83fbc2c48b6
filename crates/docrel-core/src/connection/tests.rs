use crate::{
    connection::{
        ColumnDef, Connection, ConnectionError, ConnectionFactory, ExecOutcome, MemoryBackend,
        Statement, ViewColumn,
    },
    convert::SqlLiteral,
};

// ---- helpers -----------------------------------------------------------

fn create_schema() -> Statement {
    Statement::CreateSchema {
        schema: "s".to_string(),
    }
}

fn create_table() -> Statement {
    Statement::CreateDocPartTable {
        schema: "s".to_string(),
        table: "t".to_string(),
        columns: vec![ColumnDef::new("did", "bigint")],
    }
}

fn insert(did: i64) -> Statement {
    Statement::Insert {
        schema: "s".to_string(),
        table: "t".to_string(),
        columns: vec!["did".to_string()],
        values: vec![SqlLiteral::Bigint(did)],
    }
}

fn select(table: &str) -> Statement {
    Statement::SelectAll {
        schema: "s".to_string(),
        table: table.to_string(),
    }
}

/// Backend with schema `s` and table `t(did bigint)` committed.
fn seeded() -> MemoryBackend {
    let backend = MemoryBackend::new();
    let mut conn = backend.connection();
    conn.begin_transaction().expect("begin");
    conn.execute(&create_schema()).expect("schema");
    conn.execute(&create_table()).expect("table");
    conn.commit().expect("commit");

    backend
}

// ---- transactions --------------------------------------------------------

#[test]
fn committed_statements_become_visible() {
    let backend = seeded();
    let mut conn = backend.connection();

    conn.begin_transaction().expect("begin");
    assert_eq!(conn.execute(&insert(1)).expect("insert"), ExecOutcome::RowsAffected(1));
    assert!(backend.table("s", "t").expect("table").rows.is_empty());
    conn.commit().expect("commit");

    let table = backend.table("s", "t").expect("table");
    assert_eq!(table.rows, vec![vec![SqlLiteral::Bigint(1)]]);
    assert!(!conn.in_transaction());
}

#[test]
fn rollback_discards_the_transaction() {
    let backend = seeded();
    let mut conn = backend.connection();

    conn.begin_transaction().expect("begin");
    conn.execute(&Statement::CreateSchema {
        schema: "other".to_string(),
    })
    .expect("schema");
    conn.execute(&insert(1)).expect("insert");
    conn.rollback().expect("rollback");

    assert!(!backend.has_schema("other"));
    assert!(backend.table("s", "t").expect("table").rows.is_empty());
}

#[test]
fn transaction_reads_its_own_writes() {
    let backend = seeded();
    let mut conn = backend.connection();

    conn.begin_transaction().expect("begin");
    conn.execute(&insert(7)).expect("insert");
    let rows = conn
        .execute(&select("t"))
        .expect("select")
        .into_rows()
        .expect("rows");
    assert_eq!(rows.column("did").collect::<Vec<_>>(), [&SqlLiteral::Bigint(7)]);
    conn.rollback().expect("rollback");
}

#[test]
fn transaction_state_is_checked() {
    let backend = seeded();
    let mut conn = backend.connection();

    assert!(matches!(
        conn.execute(&insert(1)),
        Err(ConnectionError::InvalidState { .. })
    ));
    assert!(matches!(
        conn.commit(),
        Err(ConnectionError::InvalidState { .. })
    ));

    conn.begin_transaction().expect("begin");
    assert!(matches!(
        conn.begin_transaction(),
        Err(ConnectionError::InvalidState { .. })
    ));
    conn.rollback().expect("rollback");
    conn.rollback().expect("rollback is idempotent");
}

#[test]
fn concurrent_conflicting_ddl_fails_the_later_commit() {
    let backend = seeded();
    let mut first = backend.connection();
    let mut second = backend.connection();
    let add = Statement::AddColumn {
        schema: "s".to_string(),
        table: "t".to_string(),
        column: ColumnDef::new("a_i", "integer"),
    };

    first.begin_transaction().expect("begin");
    second.begin_transaction().expect("begin");
    first.execute(&add).expect("first add");
    second.execute(&add).expect("second add");
    second.execute(&insert(2)).expect("second insert");

    first.commit().expect("first commit");
    assert!(matches!(
        second.commit(),
        Err(ConnectionError::Rejected { .. })
    ));

    let table = backend.table("s", "t").expect("table");
    assert_eq!(table.columns.len(), 2);
    assert!(table.rows.is_empty());
}

// ---- validation ----------------------------------------------------------

#[test]
fn statements_are_validated() {
    let backend = seeded();
    let mut conn = backend.connection();
    conn.begin_transaction().expect("begin");

    let rejected = |result: Result<ExecOutcome, ConnectionError>| {
        matches!(result, Err(ConnectionError::Rejected { .. }))
    };

    assert!(rejected(conn.execute(&create_schema())));
    assert!(rejected(conn.execute(&create_table())));
    assert!(rejected(conn.execute(&Statement::CreateScalarTable {
        schema: "s".to_string(),
        table: "dup".to_string(),
        columns: vec![ColumnDef::new("v", "json"), ColumnDef::new("v", "json")],
    })));
    assert!(rejected(conn.execute(&Statement::Insert {
        schema: "s".to_string(),
        table: "t".to_string(),
        columns: vec!["did".to_string()],
        values: vec![SqlLiteral::Integer(1)],
    })));
    assert!(rejected(conn.execute(&Statement::Insert {
        schema: "s".to_string(),
        table: "t".to_string(),
        columns: vec!["nope".to_string()],
        values: vec![SqlLiteral::Null],
    })));
    assert!(rejected(conn.execute(&Statement::Insert {
        schema: "missing".to_string(),
        table: "t".to_string(),
        columns: Vec::new(),
        values: Vec::new(),
    })));
    assert_eq!(
        conn.execute(&Statement::DropTable {
            schema: "s".to_string(),
            table: "missing".to_string(),
        })
        .expect("lenient drop"),
        ExecOutcome::RowsAffected(0)
    );

    // Nulls fit any column type.
    conn.execute(&Statement::Insert {
        schema: "s".to_string(),
        table: "t".to_string(),
        columns: vec!["did".to_string()],
        values: vec![SqlLiteral::Null],
    })
    .expect("null insert");
}

#[test]
fn added_columns_backfill_null() {
    let backend = seeded();
    let mut conn = backend.connection();
    conn.begin_transaction().expect("begin");
    conn.execute(&insert(1)).expect("insert");
    conn.execute(&Statement::AddColumn {
        schema: "s".to_string(),
        table: "t".to_string(),
        column: ColumnDef::new("a_s", "varchar"),
    })
    .expect("add");
    conn.commit().expect("commit");

    let table = backend.table("s", "t").expect("table");
    assert_eq!(table.rows, vec![vec![SqlLiteral::Bigint(1), SqlLiteral::Null]]);
}

#[test]
fn views_alias_columns_and_drop_leniently() {
    let backend = seeded();
    let mut conn = backend.connection();
    conn.begin_transaction().expect("begin");
    conn.execute(&insert(3)).expect("insert");
    conn.execute(&Statement::CreateView {
        schema: "s".to_string(),
        view: "t_view".to_string(),
        table: "t".to_string(),
        columns: vec![ViewColumn {
            column: "did".to_string(),
            alias: "document".to_string(),
        }],
    })
    .expect("view");

    let rows = conn
        .execute(&select("t_view"))
        .expect("select view")
        .into_rows()
        .expect("rows");
    assert_eq!(rows.columns, ["document"]);
    assert_eq!(rows.rows, vec![vec![SqlLiteral::Bigint(3)]]);
    conn.commit().expect("commit");
    assert_eq!(backend.views("s"), ["t_view"]);

    conn.begin_transaction().expect("begin");
    let drop = Statement::DropView {
        schema: "s".to_string(),
        view: "t_view".to_string(),
    };
    assert_eq!(conn.execute(&drop).expect("drop"), ExecOutcome::RowsAffected(1));
    assert_eq!(conn.execute(&drop).expect("again"), ExecOutcome::RowsAffected(0));
    conn.commit().expect("commit");
    assert!(backend.views("s").is_empty());
}

#[test]
fn drop_schema_removes_everything() {
    let backend = seeded();
    let mut conn = backend.connection();
    conn.begin_transaction().expect("begin");
    conn.execute(&Statement::DropSchema {
        schema: "s".to_string(),
    })
    .expect("drop");
    conn.commit().expect("commit");

    assert!(!backend.has_schema("s"));
    assert!(backend.tables("s").is_empty());
}

// ---- failure injection ---------------------------------------------------

#[test]
fn injected_commit_failure_applies_nothing() {
    let backend = seeded();
    backend.fail_next_commits(1);
    let mut conn = backend.connection();

    conn.begin_transaction().expect("begin");
    conn.execute(&insert(1)).expect("insert");
    assert!(matches!(
        conn.commit(),
        Err(ConnectionError::Backend { .. })
    ));
    assert!(backend.table("s", "t").expect("table").rows.is_empty());

    conn.begin_transaction().expect("begin");
    conn.execute(&insert(1)).expect("insert");
    conn.commit().expect("second commit succeeds");
    assert_eq!(backend.table("s", "t").expect("table").rows.len(), 1);
}

#[test]
fn injected_execute_failure_hits_the_nth_call() {
    let backend = seeded();
    let before = backend.executed();
    backend.fail_execute_at(2);
    let mut conn = backend.connection();

    conn.begin_transaction().expect("begin");
    conn.execute(&insert(1)).expect("first");
    assert!(matches!(
        conn.execute(&insert(2)),
        Err(ConnectionError::Backend { .. })
    ));
    conn.execute(&insert(3)).expect("third");
    assert_eq!(backend.executed(), before + 3);
}

#[test]
fn offline_backend_closes_every_call() {
    let backend = seeded();
    let mut conn = backend.connection();
    conn.begin_transaction().expect("begin");
    backend.set_offline(true);

    assert_eq!(conn.execute(&insert(1)), Err(ConnectionError::Closed));
    assert_eq!(conn.commit(), Err(ConnectionError::Closed));
    assert!(backend.connect().is_err());

    backend.set_offline(false);
    assert!(backend.connect().is_ok());
}

#[test]
fn statements_render_for_logs() {
    assert_eq!(create_schema().to_string(), "CREATE SCHEMA \"s\"");
    assert_eq!(
        create_table().to_string(),
        "CREATE TABLE \"s\".\"t\" (\"did\" bigint)"
    );
    assert!(!insert(1).is_ddl());
    assert!(create_table().is_ddl());
    assert_eq!(select("t").schema(), "s");
}
