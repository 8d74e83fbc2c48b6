use crate::{
    FieldType,
    catalog::{Catalog, CatalogConflictError, EntryKind, IdentifierPolicy, TableRef},
    connection::{
        Connection, ConnectionError, ExecOutcome, MemoryBackend, MemoryConnection, Statement,
    },
    convert::SqlLiteral,
    error::ErrorClass,
    executor::{
        AbortHandle, Executor, Job, JobHandle, JobId, JobOp, JobOutcome, JobOutput, JobRunner,
        JobState, RowIds,
    },
    value::{DocValue, Document},
};
use docrel_config::EngineConfig;
use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
};

const DB: &str = "shop";
const COLL: &str = "c";

// ---- helpers -----------------------------------------------------------

fn doc(entries: Vec<(&str, DocValue)>) -> Document {
    Document::try_from_entries(entries).expect("document")
}

fn catalog() -> Arc<Catalog> {
    Arc::new(Catalog::in_memory(IdentifierPolicy::default()))
}

fn runner(catalog: &Arc<Catalog>, retries: u32) -> Arc<JobRunner> {
    Arc::new(JobRunner::new(
        Arc::clone(catalog),
        Arc::new(RowIds::new()),
        retries,
    ))
}

fn run(runner: &JobRunner, conn: &mut dyn Connection, job: &Job) -> JobOutcome {
    runner.run(conn, JobId::new(1), job)
}

fn insert(documents: Vec<Document>) -> Job {
    Job::insert(DB, COLL, documents)
}

fn executor(workers: usize, catalog: &Arc<Catalog>, backend: &MemoryBackend) -> Executor {
    let config = EngineConfig {
        workers,
        ..EngineConfig::default()
    };

    Executor::start(&config, Arc::clone(catalog), backend).expect("executor")
}

fn wait_polling(handle: &JobHandle) -> JobOutcome {
    loop {
        if let Some(outcome) = handle.try_wait() {
            return outcome;
        }
        thread::yield_now();
    }
}

fn root_rows(backend: &MemoryBackend) -> usize {
    backend.table(DB, COLL).map_or(0, |table| table.rows.len())
}

///
/// HookPoint
///

#[derive(Clone, Copy, Eq, PartialEq)]
enum HookPoint {
    Begin,
    FirstStatement,
}

///
/// HookConnection
///
/// Runs a one-shot hook at `point`, standing in for a concurrent job
/// landing in the middle of this one.
///

struct HookConnection {
    inner: MemoryConnection,
    hook: Option<Box<dyn FnOnce() + Send>>,
    point: HookPoint,
}

impl HookConnection {
    fn fire(&mut self, point: HookPoint) {
        if self.point == point
            && let Some(hook) = self.hook.take()
        {
            hook();
        }
    }
}

impl Connection for HookConnection {
    fn begin_transaction(&mut self) -> Result<(), ConnectionError> {
        self.fire(HookPoint::Begin);
        self.inner.begin_transaction()
    }

    fn execute(&mut self, statement: &Statement) -> Result<ExecOutcome, ConnectionError> {
        self.fire(HookPoint::FirstStatement);
        self.inner.execute(statement)
    }

    fn commit(&mut self) -> Result<(), ConnectionError> {
        self.inner.commit()
    }

    fn rollback(&mut self) -> Result<(), ConnectionError> {
        self.inner.rollback()
    }
}

/// Connection that runs `rival` on its own connection at `point`.
fn hooked_connection(
    runner: &Arc<JobRunner>,
    backend: &MemoryBackend,
    point: HookPoint,
    rival: Job,
) -> HookConnection {
    let rival_runner = Arc::clone(runner);
    let rival_backend = backend.clone();

    HookConnection {
        inner: backend.connection(),
        hook: Some(Box::new(move || {
            let mut conn = rival_backend.connection();
            let outcome = rival_runner.run(&mut conn, JobId::new(2), &rival);
            assert!(outcome.is_ok(), "rival failed: {outcome:?}");
        })),
        point,
    }
}

fn racing_connection(runner: &Arc<JobRunner>, backend: &MemoryBackend) -> HookConnection {
    let rival = insert(vec![doc(vec![("b", DocValue::from("rival"))])]);

    hooked_connection(runner, backend, HookPoint::FirstStatement, rival)
}

fn drop_collection() -> Job {
    Job::new(JobOp::DropCollection {
        database: DB.to_string(),
        collection: COLL.to_string(),
    })
}

// ---- insert ---------------------------------------------------------------

#[test]
fn insert_creates_structure_and_rows() {
    let catalog = catalog();
    let backend = MemoryBackend::new();
    let runner = runner(&catalog, 0);

    let job = insert(vec![
        doc(vec![("a", DocValue::Integer(1))]),
        doc(vec![("a", DocValue::Integer(2)), ("b", DocValue::from("x"))]),
    ]);
    let output = run(&runner, &mut backend.connection(), &job).expect("insert");

    assert_eq!(
        output,
        JobOutput::Inserted {
            documents: 2,
            catalog_version: 1
        }
    );
    assert!(backend.has_schema(DB));

    let root = backend.table(DB, COLL).expect("root table");
    let columns: Vec<_> = root.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(columns, ["did", "a_i", "b_s"]);
    assert_eq!(root.rows.len(), 2);
    assert_eq!(root.rows[0][0], SqlLiteral::Bigint(1));
    assert_eq!(root.rows[1][0], SqlLiteral::Bigint(2));
    assert_eq!(root.rows[0][2], SqlLiteral::Null);
}

#[test]
fn create_collection_reports_whether_it_was_new() {
    let catalog = catalog();
    let backend = MemoryBackend::new();
    let runner = runner(&catalog, 0);
    let job = Job::new(JobOp::CreateCollection {
        database: DB.to_string(),
        collection: COLL.to_string(),
    });

    let first = run(&runner, &mut backend.connection(), &job).expect("create");
    let second = run(&runner, &mut backend.connection(), &job).expect("again");

    assert_eq!(first.count(), 1);
    assert_eq!(second.count(), 0);
    assert_eq!(backend.tables(DB), ["c"]);
    assert!(catalog.snapshot().resolve_collection(DB, COLL).is_some());
}

#[test]
fn known_structure_commits_without_a_new_version() {
    let catalog = catalog();
    let backend = MemoryBackend::new();
    let runner = runner(&catalog, 0);
    let job = insert(vec![doc(vec![("a", DocValue::Integer(1))])]);

    run(&runner, &mut backend.connection(), &job).expect("first");
    let output = run(&runner, &mut backend.connection(), &job).expect("second");

    assert_eq!(
        output,
        JobOutput::Inserted {
            documents: 1,
            catalog_version: 1
        }
    );
    assert_eq!(root_rows(&backend), 2);
}

// ---- concurrency ----------------------------------------------------------

#[test]
fn racing_insert_replans_and_reuses_the_winning_column() {
    let catalog = catalog();
    let backend = MemoryBackend::new();
    let runner = runner(&catalog, 2);
    run(
        &runner,
        &mut backend.connection(),
        &insert(vec![doc(vec![("a", DocValue::Integer(1))])]),
    )
    .expect("base");

    let mut conn = racing_connection(&runner, &backend);
    let job = insert(vec![doc(vec![("b", DocValue::from("mine"))])]);
    let output = run(&runner, &mut conn, &job).expect("replanned insert");

    assert_eq!(output.count(), 1);
    let snapshot = catalog.snapshot();
    assert_eq!(snapshot.count(EntryKind::Field), 2);
    let field = snapshot
        .resolve_field(DB, COLL, &TableRef::from_fields(["b"]), FieldType::String)
        .expect("b field");
    assert_eq!(field.identifier, "b_s");

    let root = backend.table(DB, COLL).expect("root table");
    let columns: Vec<_> = root.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(columns, ["did", "a_i", "b_s"]);
    assert_eq!(root.rows.len(), 3);
}

#[test]
fn racing_insert_without_retries_reports_the_conflict() {
    let catalog = catalog();
    let backend = MemoryBackend::new();
    let runner = runner(&catalog, 0);
    run(
        &runner,
        &mut backend.connection(),
        &insert(vec![doc(vec![("a", DocValue::Integer(1))])]),
    )
    .expect("base");

    let mut conn = racing_connection(&runner, &backend);
    let job = insert(vec![doc(vec![("b", DocValue::from("mine"))])]);
    let err = run(&runner, &mut conn, &job).expect_err("conflict");

    assert!(err.is_conflict());
    assert!(matches!(
        err.as_conflict(),
        Some(CatalogConflictError::KeyExists { .. })
    ));
    assert!(!conn.inner.in_transaction());
    // base row plus the rival's
    assert_eq!(root_rows(&backend), 2);
}

#[test]
fn concurrent_jobs_on_separate_workers_share_one_schema() {
    let catalog = catalog();
    let backend = MemoryBackend::new();
    let executor = executor(4, &catalog, &backend);

    let handles: Vec<_> = (0..8_i32)
        .map(|n| {
            let job = insert(vec![doc(vec![
                ("n", DocValue::Integer(n)),
                ("tags", DocValue::Array(vec![DocValue::from("t")])),
            ])]);
            executor.submit(job).expect("submit")
        })
        .collect();

    for handle in handles {
        handle.wait().expect("insert");
    }

    let snapshot = catalog.snapshot();
    assert_eq!(snapshot.count(EntryKind::Collection), 1);
    assert_eq!(snapshot.count(EntryKind::Field), 2);
    assert_eq!(snapshot.count(EntryKind::Scalar), 1);
    assert_eq!(root_rows(&backend), 8);
    assert_eq!(backend.table(DB, "c_tags_s").expect("run table").rows.len(), 8);
}

#[test]
fn insert_after_a_concurrent_drop_replans_the_collection() {
    let catalog = catalog();
    let backend = MemoryBackend::new();
    let runner = runner(&catalog, 2);
    run(
        &runner,
        &mut backend.connection(),
        &insert(vec![doc(vec![("a", DocValue::Integer(1))])]),
    )
    .expect("base");

    // planned while the collection existed, started after it was dropped
    let mut conn = hooked_connection(&runner, &backend, HookPoint::Begin, drop_collection());
    let output = run(
        &runner,
        &mut conn,
        &insert(vec![doc(vec![("a", DocValue::Integer(2))])]),
    )
    .expect("replanned insert");

    assert_eq!(output.count(), 1);
    assert!(catalog.snapshot().resolve_collection(DB, COLL).is_some());
    let root = backend.table(DB, COLL).expect("recreated root");
    assert_eq!(root.rows, [vec![SqlLiteral::Bigint(1), SqlLiteral::Integer(2)]]);
}

#[test]
fn insert_after_a_concurrent_drop_reports_a_conflict_without_retries() {
    let catalog = catalog();
    let backend = MemoryBackend::new();
    let runner = runner(&catalog, 0);
    run(
        &runner,
        &mut backend.connection(),
        &insert(vec![doc(vec![("a", DocValue::Integer(1))])]),
    )
    .expect("base");

    let mut conn = hooked_connection(&runner, &backend, HookPoint::Begin, drop_collection());
    let err = run(
        &runner,
        &mut conn,
        &insert(vec![doc(vec![("a", DocValue::Integer(2))])]),
    )
    .expect_err("conflict");

    assert!(err.is_conflict());
    assert!(matches!(
        err.as_conflict(),
        Some(CatalogConflictError::SnapshotChanged { .. })
    ));
    assert!(!conn.inner.in_transaction());
    assert!(backend.tables(DB).is_empty());
}

// ---- row ids --------------------------------------------------------------

#[test]
fn seeded_ids_continue_above_stored_ids() {
    let ids = RowIds::new();
    let root = TableRef::root();
    let child = TableRef::from_fields(["o"]);

    assert!(!ids.is_tracked(DB, COLL, &root));
    ids.seed(DB, COLL, &root, 7);
    assert!(ids.is_tracked(DB, COLL, &root));
    assert_eq!(ids.next_document(DB, COLL), 8);

    // never lowered
    ids.seed(DB, COLL, &root, 3);
    assert_eq!(ids.next_document(DB, COLL), 9);

    assert!(!ids.is_tracked(DB, COLL, &child));
    assert_eq!(ids.next_row(DB, COLL, &child), 1);

    ids.reset_scope(DB, None);
    assert!(!ids.is_tracked(DB, COLL, &root));
    assert_eq!(ids.next_document(DB, COLL), 1);
}

#[test]
fn fresh_runner_continues_the_stored_ids() {
    let catalog = catalog();
    let backend = MemoryBackend::new();
    let job = insert(vec![doc(vec![
        ("a", DocValue::Integer(1)),
        ("o", DocValue::Document(doc(vec![("x", DocValue::Long(2))]))),
    ])]);

    run(&runner(&catalog, 0), &mut backend.connection(), &job).expect("first");
    // a second runner knows the catalog but holds no ids in memory
    run(&runner(&catalog, 0), &mut backend.connection(), &job).expect("second");

    let root = backend.table(DB, COLL).expect("root");
    let dids: Vec<_> = root.rows.iter().map(|row| row[0].clone()).collect();
    assert_eq!(dids, [SqlLiteral::Bigint(1), SqlLiteral::Bigint(2)]);

    // did, rid, pid, seq, x_l
    let child = backend.table(DB, "c_o").expect("child");
    let rids: Vec<_> = child.rows.iter().map(|row| row[1].clone()).collect();
    assert_eq!(rids, [SqlLiteral::Bigint(1), SqlLiteral::Bigint(2)]);
    assert_eq!(child.rows[1][2], SqlLiteral::Bigint(2));
}

// ---- abort and failure ----------------------------------------------------

#[test]
fn abort_after_first_statement_leaves_no_trace() {
    let catalog = catalog();
    let backend = MemoryBackend::new();
    let runner = runner(&catalog, 0);

    let polls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&polls);
    let job = insert(vec![doc(vec![("a", DocValue::Integer(1))])])
        .with_abort(move || counter.fetch_add(1, Ordering::SeqCst) >= 1);

    let err = run(&runner, &mut backend.connection(), &job).expect_err("aborted");

    assert!(err.is_aborted());
    assert_eq!(polls.load(Ordering::SeqCst), 2);
    assert_eq!(backend.executed(), 1);
    assert!(!backend.has_schema(DB));
    assert!(catalog.snapshot().is_empty());
    assert_eq!(catalog.version(), 0);
}

#[test]
fn abort_handle_stops_a_queued_job() {
    let catalog = catalog();
    let backend = MemoryBackend::new();
    let executor = executor(1, &catalog, &backend);

    let abort = AbortHandle::new();
    abort.abort();
    let handle = executor
        .submit(insert(vec![doc(vec![("a", DocValue::Integer(1))])]).with_abort(abort.clone()))
        .expect("submit");

    let err = handle.wait().expect_err("aborted");
    assert!(err.is_aborted());
    assert_eq!(backend.executed(), 0);
    assert!(catalog.snapshot().is_empty());
}

#[test]
fn failed_physical_commit_retracts_the_catalog_commit() {
    let catalog = catalog();
    let backend = MemoryBackend::new();
    let runner = runner(&catalog, 3);
    let job = insert(vec![doc(vec![("a", DocValue::Integer(1))])]);

    backend.fail_next_commits(1);
    let err = run(&runner, &mut backend.connection(), &job).expect_err("commit fails");

    assert_eq!(err.class, ErrorClass::Connection);
    assert!(catalog.snapshot().is_empty());
    assert!(catalog.store().scan("").expect("scan").is_empty());
    assert!(!backend.has_schema(DB));

    // retracted identifiers are never handed out again
    run(&runner, &mut backend.connection(), &job).expect("resubmit");
    let snapshot = catalog.snapshot();
    assert_eq!(
        snapshot.resolve_database(DB).expect("database").identifier,
        "shop_2"
    );
    let root = backend.table("shop_2", "c_2").expect("root table");
    assert_eq!(root.columns[1].name, "a_i_2");
}

#[test]
fn failed_statement_rolls_back_the_job() {
    let catalog = catalog();
    let backend = MemoryBackend::new();
    let runner = runner(&catalog, 0);
    let mut conn = backend.connection();

    backend.fail_execute_at(3);
    let err = run(
        &runner,
        &mut conn,
        &insert(vec![doc(vec![("a", DocValue::Integer(1))])]),
    )
    .expect_err("execute fails");

    assert_eq!(err.class, ErrorClass::Connection);
    assert!(!conn.in_transaction());
    assert!(!backend.has_schema(DB));
    assert!(catalog.snapshot().is_empty());
}

#[test]
fn offline_backend_fails_executor_start() {
    let backend = MemoryBackend::new();
    backend.set_offline(true);

    let result = Executor::start(&EngineConfig::default(), catalog(), &backend);

    let err = result.err().expect("start fails");
    assert_eq!(err.class, ErrorClass::Connection);
}

#[test]
fn panicking_job_is_reported_and_the_worker_survives() {
    let catalog = catalog();
    let backend = MemoryBackend::new();
    let executor = executor(1, &catalog, &backend);

    let bad = insert(vec![doc(vec![("a", DocValue::Integer(1))])])
        .with_abort(|| -> bool { panic!("abort policy exploded") });
    let err = executor.submit(bad).expect("submit").wait().expect_err("panicked");
    assert_eq!(err.class, ErrorClass::Internal);

    let good = insert(vec![doc(vec![("a", DocValue::Integer(2))])]);
    executor.submit(good).expect("submit").wait().expect("insert");
    assert_eq!(root_rows(&backend), 1);
}

// ---- reporting ------------------------------------------------------------

#[test]
fn report_fires_once_per_job() {
    let catalog = catalog();
    let backend = MemoryBackend::new();
    let executor = executor(2, &catalog, &backend);

    let reports = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&reports);
    let job = insert(vec![doc(vec![("a", DocValue::Integer(1))])]).with_report(
        move |_: JobId, outcome: &JobOutcome| {
            assert!(outcome.is_ok());
            seen.fetch_add(1, Ordering::SeqCst);
        },
    );

    let handle = executor.submit(job).expect("submit");
    let id = handle.id();
    let outcome = wait_polling(&handle);

    assert!(outcome.is_ok());
    assert!(handle.try_wait().is_none());
    assert_eq!(handle.state(), JobState::Committed);
    assert_eq!(reports.load(Ordering::SeqCst), 1);
    assert_eq!(id.to_string(), format!("job-{}", id.get()));
}

#[test]
fn panicking_report_still_delivers_the_outcome() {
    let catalog = catalog();
    let backend = MemoryBackend::new();
    let executor = executor(1, &catalog, &backend);

    let job = insert(vec![doc(vec![("a", DocValue::Integer(1))])])
        .with_report(|_: JobId, _: &JobOutcome| panic!("report exploded"));

    let handle = executor.submit(job).expect("submit");
    assert!(handle.wait().is_ok());
}

#[test]
fn jobs_on_one_worker_run_in_submission_order() {
    let catalog = catalog();
    let backend = MemoryBackend::new();
    let executor = executor(3, &catalog, &backend);

    let handles: Vec<_> = (0..5_i32)
        .map(|n| {
            executor
                .submit_to(1, insert(vec![doc(vec![("n", DocValue::Integer(n))])]))
                .expect("submit")
        })
        .collect();
    for handle in handles {
        handle.wait().expect("insert");
    }

    let root = backend.table(DB, COLL).expect("root table");
    let values: Vec<_> = root.rows.iter().map(|row| row[1].clone()).collect();
    let expected: Vec<_> = (0..5).map(SqlLiteral::Integer).collect();
    assert_eq!(values, expected);
}

#[test]
fn submit_to_unknown_worker_fails() {
    let catalog = catalog();
    let backend = MemoryBackend::new();
    let executor = executor(2, &catalog, &backend);

    let err = executor
        .submit_to(7, insert(Vec::new()))
        .expect_err("no such worker");
    assert_eq!(err.class, ErrorClass::Internal);
}

#[test]
fn shutdown_drains_queued_jobs() {
    let catalog = catalog();
    let backend = MemoryBackend::new();
    let mut executor = executor(1, &catalog, &backend);

    let handles: Vec<_> = (0..3_i32)
        .map(|n| {
            executor
                .submit(insert(vec![doc(vec![("n", DocValue::Integer(n))])]))
                .expect("submit")
        })
        .collect();
    executor.shutdown();

    for handle in handles {
        assert_eq!(handle.state(), JobState::Committed);
        handle.wait().expect("insert");
    }
    assert!(executor.submit(insert(Vec::new())).is_err());
}

// ---- job state ------------------------------------------------------------

#[test]
fn job_state_only_moves_forward() {
    let running = JobState::Queued.advance(JobState::Running).expect("start");
    assert_eq!(
        running.advance(JobState::Committed).expect("commit"),
        JobState::Committed
    );
    assert!(running.advance(JobState::Aborted).expect("abort").is_terminal());

    assert!(JobState::Queued.advance(JobState::Committed).is_err());
    assert!(JobState::Committed.advance(JobState::Running).is_err());
    assert!(JobState::Aborted.advance(JobState::Aborted).is_err());
}

// ---- drops and views ------------------------------------------------------

#[test]
fn drop_collection_removes_tables_and_resets_ids() {
    let catalog = catalog();
    let backend = MemoryBackend::new();
    let runner = runner(&catalog, 0);
    let mut conn = backend.connection();
    let job = insert(vec![doc(vec![
        ("a", DocValue::Integer(1)),
        ("o", DocValue::Document(doc(vec![("x", DocValue::Long(2))]))),
    ])]);
    run(&runner, &mut conn, &job).expect("insert");

    let dropped = run(&runner, &mut conn, &drop_collection()).expect("drop");

    // collection, two doc parts, three fields
    assert_eq!(dropped, JobOutput::Dropped { entries: 6 });
    assert!(backend.tables(DB).is_empty());
    assert!(catalog.snapshot().resolve_collection(DB, COLL).is_none());

    run(&runner, &mut conn, &job).expect("reinsert");
    let root = backend.table(DB, COLL).expect("root table");
    assert_eq!(root.rows[0][0], SqlLiteral::Bigint(1));
}

#[test]
fn drop_database_removes_schema_and_catalog_scope() {
    let catalog = catalog();
    let backend = MemoryBackend::new();
    let runner = runner(&catalog, 0);
    let mut conn = backend.connection();
    run(
        &runner,
        &mut conn,
        &insert(vec![doc(vec![("a", DocValue::Integer(1))])]),
    )
    .expect("insert");

    let output = run(
        &runner,
        &mut conn,
        &Job::new(JobOp::DropDatabase {
            database: DB.to_string(),
        }),
    )
    .expect("drop");

    assert_eq!(output.count(), 4);
    assert!(!backend.has_schema(DB));
    assert!(catalog.snapshot().is_empty());
}

#[test]
fn path_views_follow_doc_parts() {
    let catalog = catalog();
    let backend = MemoryBackend::new();
    let runner = runner(&catalog, 0);
    let mut conn = backend.connection();
    run(
        &runner,
        &mut conn,
        &insert(vec![doc(vec![(
            "o",
            DocValue::Document(doc(vec![("x", DocValue::Integer(1))])),
        )])]),
    )
    .expect("insert");

    let views = JobOp::CreatePathViews {
        database: DB.to_string(),
        collection: COLL.to_string(),
    };
    let drop_views = JobOp::DropPathViews {
        database: DB.to_string(),
        collection: COLL.to_string(),
    };

    let created = run(&runner, &mut conn, &Job::new(views)).expect("create views");
    assert_eq!(created, JobOutput::ViewsCreated { views: 2 });
    assert_eq!(backend.views(DB), ["c_o_view", "c_view"]);

    let dropped = run(&runner, &mut conn, &Job::new(drop_views.clone())).expect("drop views");
    assert_eq!(dropped, JobOutput::ViewsDropped { views: 2 });
    assert!(backend.views(DB).is_empty());

    let again = run(&runner, &mut conn, &Job::new(drop_views)).expect("drop again");
    assert_eq!(again.count(), 0);
}
