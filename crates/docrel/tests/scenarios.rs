use docrel::{
    Engine,
    config::EngineConfig,
    core::{
        FieldType,
        catalog::{EntryKind, MemoryMetaStore, MetaStore, TableRef},
        connection::MemoryBackend,
        convert::{ConverterRegistry, SqlLiteral},
        executor::{Job, JobOutput},
        schema::plan,
        value::{DocValue, Document},
    },
};
use proptest::prelude::*;
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

fn engine(backend: &MemoryBackend) -> Engine {
    let config = EngineConfig {
        workers: 4,
        ..EngineConfig::default()
    };

    Engine::in_memory(config, backend).expect("engine")
}

fn field(path: &[&str]) -> TableRef {
    TableRef::from_fields(path.iter().copied())
}

fn column_names(backend: &MemoryBackend, table: &str) -> Vec<String> {
    backend
        .table(DB, table)
        .expect("table")
        .columns
        .into_iter()
        .map(|column| column.name)
        .collect()
}

fn replans_empty(engine: &Engine, document: &Document) -> bool {
    plan(document, DB, COLL, &engine.catalog().snapshot()).is_empty()
}

// ---- scenarios -------------------------------------------------------------

#[test]
fn scenario_a_first_document_allocates_root_and_field() {
    let backend = MemoryBackend::new();
    let engine = engine(&backend);
    let document = doc(vec![("a", DocValue::Integer(1))]);

    let diff = plan(&document, DB, COLL, &engine.catalog().snapshot());
    assert_eq!(diff.pending_doc_parts().count(), 1);
    assert_eq!(
        diff.pending_fields().collect::<Vec<_>>(),
        [(&field(&["a"]), FieldType::Integer)]
    );

    engine
        .insert_into(DB, COLL, vec![document.clone()])
        .expect("insert");
    assert!(replans_empty(&engine, &document));

    let snapshot = engine.catalog().snapshot();
    assert!(snapshot.resolve_doc_part(DB, COLL, &TableRef::root()).is_some());
    assert_eq!(
        snapshot
            .resolve_field(DB, COLL, &field(&["a"]), FieldType::Integer)
            .map(|f| f.identifier.as_str()),
        Some("a_i")
    );
}

#[test]
fn scenario_b_polymorphic_field_gets_a_second_column() {
    let backend = MemoryBackend::new();
    let engine = engine(&backend);
    engine
        .insert_into(DB, COLL, vec![doc(vec![("a", DocValue::Integer(1))])])
        .expect("integer");
    let integer_field = engine
        .catalog()
        .snapshot()
        .resolve_field(DB, COLL, &field(&["a"]), FieldType::Integer)
        .cloned()
        .expect("integer field");

    engine
        .insert_into(DB, COLL, vec![doc(vec![("a", DocValue::from("x"))])])
        .expect("string");

    let snapshot = engine.catalog().snapshot();
    assert_eq!(
        snapshot.resolve_field(DB, COLL, &field(&["a"]), FieldType::Integer),
        Some(&integer_field)
    );
    assert!(
        snapshot
            .resolve_field(DB, COLL, &field(&["a"]), FieldType::String)
            .is_some()
    );
    assert_eq!(column_names(&backend, COLL), ["did", "a_i", "a_s"]);

    let rows = backend.table(DB, COLL).expect("root").rows;
    assert_eq!(rows[0][1], SqlLiteral::Integer(1));
    assert_eq!(rows[1][1], SqlLiteral::Null);
    assert_eq!(rows[1][2], SqlLiteral::Text("x".to_string()));
}

#[test]
fn scenario_c_scalar_array_round_trips_in_order() {
    let backend = MemoryBackend::new();
    let engine = engine(&backend);
    let values = vec![
        DocValue::Integer(1),
        DocValue::Integer(2),
        DocValue::Integer(3),
    ];

    engine
        .insert_into(DB, COLL, vec![doc(vec![("a", DocValue::Array(values))])])
        .expect("insert");

    let snapshot = engine.catalog().snapshot();
    let scalar = snapshot
        .resolve_scalar(DB, COLL, &field(&["a"]), FieldType::Integer)
        .expect("side table");
    let side = backend.table(DB, &scalar.identifier).expect("side table rows");
    assert_eq!(side.rows.len(), 1);

    let stored = side.rows[0].last().expect("array literal");
    let decoded = ConverterRegistry::global()
        .array(FieldType::Integer)
        .expect("array converter")
        .decode(stored)
        .expect("decode");
    assert_eq!(
        decoded,
        [
            Some(DocValue::Integer(1)),
            Some(DocValue::Integer(2)),
            Some(DocValue::Integer(3)),
        ]
    );
}

#[test]
fn scenario_d_concurrent_writers_commit_each_field_once() {
    let backend = MemoryBackend::new();
    let engine = Arc::new(engine(&backend));

    let writers: Vec<_> = (0..8_i32)
        .map(|n| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                engine.insert_into(
                    DB,
                    COLL,
                    vec![doc(vec![
                        ("shared", DocValue::Integer(n)),
                        (
                            "nested",
                            DocValue::Document(doc(vec![("x", DocValue::from("v"))])),
                        ),
                    ])],
                )
            })
        })
        .collect();
    for writer in writers {
        writer.join().expect("writer").expect("insert");
    }

    let snapshot = engine.catalog().snapshot();
    assert_eq!(snapshot.count(EntryKind::Database), 1);
    assert_eq!(snapshot.count(EntryKind::Collection), 1);
    assert_eq!(snapshot.count(EntryKind::DocPart), 2);
    // shared_i, nested_e, x_s
    assert_eq!(snapshot.count(EntryKind::Field), 3);
    assert_eq!(backend.table(DB, COLL).expect("root").rows.len(), 8);
    assert_eq!(backend.table(DB, "c_nested").expect("child").rows.len(), 8);
}

#[test]
fn scenario_e_abort_after_first_ddl_leaves_no_trace() {
    let backend = MemoryBackend::new();
    let engine = engine(&backend);

    let polls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&polls);
    let job = Job::insert(DB, COLL, vec![doc(vec![("a", DocValue::Integer(1))])])
        .with_abort(move || seen.fetch_add(1, Ordering::SeqCst) >= 1);

    let err = engine.run(job).expect_err("aborted");

    assert!(err.is_aborted());
    assert_eq!(backend.executed(), 1);
    assert!(!backend.has_schema(DB));
    assert!(engine.catalog().snapshot().is_empty());
    assert!(engine.catalog().store().scan("").expect("scan").is_empty());
}

// ---- engine surface --------------------------------------------------------

#[test]
fn default_database_comes_from_config() {
    let backend = MemoryBackend::new();
    let config = EngineConfig::from_toml_str(
        r#"
        workers = 2

        [catalog]
        default_database = "App Data"
        "#,
    )
    .expect("config");
    let engine = Engine::in_memory(config, &backend).expect("engine");

    engine
        .insert("orders", vec![doc(vec![("qty", DocValue::Long(3))])])
        .expect("insert");

    assert!(backend.has_schema("app_data"));
    assert_eq!(engine.executor().workers(), 2);
}

#[test]
fn invalid_config_is_rejected_before_start() {
    let backend = MemoryBackend::new();
    let config = EngineConfig {
        max_identifier_length: 4,
        ..EngineConfig::default()
    };

    let err = Engine::in_memory(config, &backend).err().expect("invalid");
    assert_eq!(err.origin.to_string(), "config");
}

#[test]
fn restarted_engine_reuses_the_persisted_catalog() {
    let backend = MemoryBackend::new();
    let store: Arc<dyn MetaStore> = Arc::new(MemoryMetaStore::new());
    let document = doc(vec![("a", DocValue::Integer(1))]);

    let first =
        Engine::start(EngineConfig::default(), Arc::clone(&store), &backend).expect("first");
    first
        .insert_into(DB, COLL, vec![document.clone()])
        .expect("insert");
    first.shutdown();

    let second = Engine::start(EngineConfig::default(), store, &backend).expect("second");
    assert_eq!(second.catalog().snapshot().count(EntryKind::Field), 1);
    let output = second
        .insert_into(DB, COLL, vec![document])
        .expect("insert again");

    assert_eq!(
        output,
        JobOutput::Inserted {
            documents: 1,
            catalog_version: 0
        }
    );

    let dids: Vec<_> = backend
        .table(DB, COLL)
        .expect("root")
        .rows
        .into_iter()
        .map(|row| row[0].clone())
        .collect();
    assert_eq!(dids, [SqlLiteral::Bigint(1), SqlLiteral::Bigint(2)]);
}

#[test]
fn collection_lifecycle_through_the_engine() {
    let backend = MemoryBackend::new();
    let engine = engine(&backend);
    let database = engine.config().catalog.default_database.clone();

    assert_eq!(engine.create_collection("logs").expect("create").count(), 1);
    engine
        .insert(
            "logs",
            vec![doc(vec![(
                "at",
                DocValue::Document(doc(vec![("host", DocValue::from("a"))])),
            )])],
        )
        .expect("insert");

    assert_eq!(
        engine.create_path_views("logs").expect("views"),
        JobOutput::ViewsCreated { views: 2 }
    );
    assert_eq!(backend.views(&database), ["logs_at_view", "logs_view"]);
    assert_eq!(engine.drop_path_views("logs").expect("drop views").count(), 2);

    assert!(engine.drop_collection("logs").expect("drop").count() > 0);
    assert!(backend.tables(&database).is_empty());
    assert_eq!(engine.drop_collection("logs").expect("again").count(), 0);

    assert_eq!(engine.drop_database(&database).expect("drop db").count(), 1);
    assert!(!backend.has_schema(&database));
}

// ---- properties ------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn stored_documents_replan_empty(
        values in prop::collection::vec(
            prop_oneof![
                any::<i32>().prop_map(DocValue::Integer),
                any::<i64>().prop_map(DocValue::Long),
                "[a-z]{0,6}".prop_map(DocValue::String),
                any::<bool>().prop_map(DocValue::Boolean),
                Just(DocValue::Null),
            ],
            1..6,
        )
    ) {
        let backend = MemoryBackend::new();
        let engine = engine(&backend);
        let documents: Vec<Document> = values
            .into_iter()
            .map(|value| doc(vec![("f", value)]))
            .collect();

        engine.insert_into(DB, COLL, documents.clone()).expect("insert");

        for document in &documents {
            prop_assert!(replans_empty(&engine, document));
        }
        prop_assert_eq!(
            backend.table(DB, COLL).expect("root").rows.len(),
            documents.len()
        );
    }
}
