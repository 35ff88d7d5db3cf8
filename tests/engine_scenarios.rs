//! End-to-end scenarios against the engine facade.

use oxbow::request::{
    AggregateExpr, AggregateFunction, DeleteRequest, GroupBy, SelectRequest, SortDirection,
    SortKey, UpdateAssignment, UpdateRequest,
};
use oxbow::{Engine, ErrorCode, Settings};
use oxbow_catalog::TableStorageMode;
use oxbow_storage::ColumnDefinition;
use oxbow_types::{CompareOp, DataChunk, LogicalType, TableFilter, Value};

const SESSION: u64 = 1;

fn int_table(engine: &Engine, database: &str, table: &str, mode: TableStorageMode) {
    engine.create_database(database).unwrap();
    engine
        .create_table(
            database,
            table,
            vec![ColumnDefinition::new("x", LogicalType::Int64)],
            mode,
        )
        .unwrap();
}

fn insert_ints(engine: &Engine, database: &str, table: &str, values: impl Iterator<Item = i64>) {
    let mut chunk = DataChunk::new(&[LogicalType::Int64]);
    for v in values {
        chunk.push_row(vec![Value::Int64(v)]).unwrap();
    }
    let cursor = engine.insert(SESSION, database, table, chunk).unwrap();
    assert!(cursor.is_success());
}

fn select_values(engine: &Engine, database: &str, table: &str, request: &SelectRequest) -> Vec<i64> {
    let cursor = engine.select(SESSION, database, table, request).unwrap();
    assert!(cursor.is_success());
    let chunk = cursor.chunk();
    let mut values: Vec<i64> = (0..chunk.cardinality())
        .filter_map(|i| chunk.value(0, i).as_i64())
        .collect();
    values.sort_unstable();
    values
}

#[test]
fn insert_scan_match() {
    let engine = Engine::open(Settings::in_memory()).unwrap();
    int_table(&engine, "db", "t", TableStorageMode::InMemory);
    insert_ints(&engine, "db", "t", 1..=5);

    let all = select_values(&engine, "db", "t", &SelectRequest::default());
    assert_eq!(all, vec![1, 2, 3, 4, 5]);

    let filtered = select_values(
        &engine,
        "db",
        "t",
        &SelectRequest {
            filter: Some(TableFilter::Constant {
                column: 0,
                op: CompareOp::Gt,
                value: Value::Int64(3),
            }),
            ..Default::default()
        },
    );
    assert_eq!(filtered, vec![4, 5]);
}

#[test]
fn index_accelerated_equality() {
    let engine = Engine::open(Settings::in_memory()).unwrap();
    int_table(&engine, "db", "t", TableStorageMode::InMemory);
    engine.create_index("db", "t", "idx_x", "x").unwrap();
    insert_ints(&engine, "db", "t", 1..=100);

    let eq = select_values(
        &engine,
        "db",
        "t",
        &SelectRequest {
            filter: Some(TableFilter::eq(0, Value::Int64(42))),
            ..Default::default()
        },
    );
    assert_eq!(eq, vec![42]);

    let gt = select_values(
        &engine,
        "db",
        "t",
        &SelectRequest {
            filter: Some(TableFilter::Constant {
                column: 0,
                op: CompareOp::Gt,
                value: Value::Int64(97),
            }),
            ..Default::default()
        },
    );
    assert_eq!(gt, vec![98, 99, 100]);
}

#[test]
fn crash_replay_keeps_committed_only() {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = Settings::durable(dir.path());
    settings.disk.on = false; // recovery must come from the WAL alone

    {
        let engine = Engine::open(settings.clone()).unwrap();
        int_table(&engine, "db", "t", TableStorageMode::InMemory);

        // T1 inserts but never commits
        let session_t1 = 10;
        engine.begin_transaction(session_t1);
        let mut chunk = DataChunk::new(&[LogicalType::Int64]);
        chunk.push_row(vec![Value::Int64(1)]).unwrap();
        engine.insert(session_t1, "db", "t", chunk).unwrap();

        // T2 inserts and commits
        let session_t2 = 20;
        engine.begin_transaction(session_t2);
        let mut chunk = DataChunk::new(&[LogicalType::Int64]);
        chunk.push_row(vec![Value::Int64(2)]).unwrap();
        engine.insert(session_t2, "db", "t", chunk).unwrap();
        engine.commit(session_t2).unwrap();

        // crash: engine dropped without committing T1 and without checkpoint
    }

    let engine = Engine::open(settings).unwrap();
    let values = select_values(&engine, "db", "t", &SelectRequest::default());
    assert_eq!(values, vec![2]);
}

#[test]
fn checkpoint_persistence() {
    let dir = tempfile::tempdir().unwrap();
    let settings = Settings::durable(dir.path());
    const NUM_ROWS: usize = 500;

    {
        let engine = Engine::open(settings.clone()).unwrap();
        engine.create_database("db").unwrap();
        engine
            .create_table(
                "db",
                "scores",
                vec![
                    ColumnDefinition::new("id", LogicalType::Int64),
                    ColumnDefinition::new("score", LogicalType::Float64),
                ],
                TableStorageMode::Disk,
            )
            .unwrap();
        let mut chunk = DataChunk::new(&[LogicalType::Int64, LogicalType::Float64]);
        for i in 0..NUM_ROWS {
            chunk
                .push_row(vec![
                    Value::Int64(i as i64),
                    Value::Float64(i as f64 * 1.5),
                ])
                .unwrap();
        }
        engine.insert(SESSION, "db", "scores", chunk).unwrap();
        let cursor = engine.checkpoint().unwrap();
        assert!(cursor.is_success());
    }

    let engine = Engine::open(settings).unwrap();
    let cursor = engine
        .select(SESSION, "db", "scores", &SelectRequest::default())
        .unwrap();
    let chunk = cursor.chunk();
    assert_eq!(chunk.cardinality(), NUM_ROWS);
    let mut seen = vec![false; NUM_ROWS];
    for row in 0..chunk.cardinality() {
        let id = chunk.value(0, row).as_i64().unwrap() as usize;
        let score = match chunk.value(1, row) {
            Value::Float64(f) => f,
            other => panic!("unexpected score value {other}"),
        };
        assert!((score - id as f64 * 1.5).abs() < 1e-9);
        seen[id] = true;
    }
    assert!(seen.into_iter().all(|s| s));
}

#[test]
fn disk_index_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let settings = Settings::durable(dir.path());

    {
        let engine = Engine::open(settings.clone()).unwrap();
        int_table(&engine, "db", "t", TableStorageMode::Disk);
        engine.create_index("db", "t", "idx_x", "x").unwrap();
        insert_ints(&engine, "db", "t", 1..=100);
        engine.checkpoint().unwrap();
    }

    let engine = Engine::open(settings).unwrap();
    // re-creating the index reattaches the persisted b+tree file
    engine.create_index("db", "t", "idx_x", "x").unwrap();
    let handle = engine.handle("db", "t").unwrap();
    let index = handle.indexes.find_by_name("idx_x").unwrap();
    assert_eq!(index.find(&Value::Int64(50)).unwrap(), vec![49]);
    assert_eq!(index.lower_bound(&Value::Int64(10)).unwrap().len(), 9);
}

#[test]
fn delete_update_and_vacuum() {
    let engine = Engine::open(Settings::in_memory()).unwrap();
    int_table(&engine, "db", "t", TableStorageMode::InMemory);
    insert_ints(&engine, "db", "t", 1..=10);

    let deleted = engine
        .delete(
            SESSION,
            "db",
            "t",
            &DeleteRequest {
                filter: Some(TableFilter::Constant {
                    column: 0,
                    op: CompareOp::Gt,
                    value: Value::Int64(8),
                }),
                limit: None,
            },
        )
        .unwrap();
    assert_eq!(deleted.affected_rows(), 2);

    let updated = engine
        .update(
            SESSION,
            "db",
            "t",
            &UpdateRequest {
                filter: Some(TableFilter::eq(0, Value::Int64(1))),
                limit: None,
                assignments: vec![UpdateAssignment {
                    column: 0,
                    value: Value::Int64(100),
                }],
                upsert: false,
            },
        )
        .unwrap();
    assert_eq!(updated.affected_rows(), 1);

    let values = select_values(&engine, "db", "t", &SelectRequest::default());
    assert_eq!(values, vec![2, 3, 4, 5, 6, 7, 8, 100]);

    let vacuumed = engine.vacuum("db", "t").unwrap();
    assert_eq!(vacuumed.affected_rows(), 2);
    let values = select_values(&engine, "db", "t", &SelectRequest::default());
    assert_eq!(values, vec![2, 3, 4, 5, 6, 7, 8, 100]);
}

#[test]
fn upsert_inserts_when_nothing_matches() {
    let engine = Engine::open(Settings::in_memory()).unwrap();
    int_table(&engine, "db", "t", TableStorageMode::InMemory);

    let cursor = engine
        .update(
            SESSION,
            "db",
            "t",
            &UpdateRequest {
                filter: Some(TableFilter::eq(0, Value::Int64(7))),
                limit: None,
                assignments: vec![UpdateAssignment {
                    column: 0,
                    value: Value::Int64(7),
                }],
                upsert: true,
            },
        )
        .unwrap();
    assert_eq!(cursor.affected_rows(), 1);
    assert_eq!(select_values(&engine, "db", "t", &SelectRequest::default()), vec![7]);
}

#[test]
fn transactions_isolate_until_commit() {
    let engine = Engine::open(Settings::in_memory()).unwrap();
    int_table(&engine, "db", "t", TableStorageMode::InMemory);

    let writer = 11;
    let reader = 12;
    engine.begin_transaction(writer);
    let mut chunk = DataChunk::new(&[LogicalType::Int64]);
    chunk.push_row(vec![Value::Int64(42)]).unwrap();
    engine.insert(writer, "db", "t", chunk).unwrap();

    // another session sees nothing yet
    let other = select_values_for(&engine, reader, "db", "t");
    assert!(other.is_empty());
    // the writer sees its own row
    let own = select_values_for(&engine, writer, "db", "t");
    assert_eq!(own, vec![42]);

    engine.commit(writer).unwrap();
    let after = select_values_for(&engine, reader, "db", "t");
    assert_eq!(after, vec![42]);
}

// helper with explicit session (shadowing the SESSION-bound one above)
fn select_values_for(engine: &Engine, session: u64, database: &str, table: &str) -> Vec<i64> {
    let cursor = engine
        .select(session, database, table, &SelectRequest::default())
        .unwrap();
    let chunk = cursor.chunk();
    let mut values: Vec<i64> = (0..chunk.cardinality())
        .filter_map(|i| chunk.value(0, i).as_i64())
        .collect();
    values.sort_unstable();
    values
}

#[test]
fn abort_rolls_back() {
    let engine = Engine::open(Settings::in_memory()).unwrap();
    int_table(&engine, "db", "t", TableStorageMode::InMemory);
    insert_ints(&engine, "db", "t", 1..=3);

    let session = 30;
    engine.begin_transaction(session);
    let mut chunk = DataChunk::new(&[LogicalType::Int64]);
    chunk.push_row(vec![Value::Int64(99)]).unwrap();
    engine.insert(session, "db", "t", chunk).unwrap();
    engine
        .delete(
            session,
            "db",
            "t",
            &DeleteRequest {
                filter: Some(TableFilter::eq(0, Value::Int64(1))),
                limit: None,
            },
        )
        .unwrap();
    engine.abort(session).unwrap();

    let values = select_values_for(&engine, 31, "db", "t");
    assert_eq!(values, vec![1, 2, 3]);
}

#[test]
fn grouped_select_pipeline() {
    let engine = Engine::open(Settings::in_memory()).unwrap();
    engine.create_database("db").unwrap();
    engine
        .create_table(
            "db",
            "sales",
            vec![
                ColumnDefinition::new("region", LogicalType::String),
                ColumnDefinition::new("amount", LogicalType::Int64),
            ],
            TableStorageMode::InMemory,
        )
        .unwrap();
    let mut chunk = DataChunk::new(&[LogicalType::String, LogicalType::Int64]);
    for (region, amount) in [
        ("east", 10),
        ("east", 20),
        ("west", 2),
        ("west", 3),
        ("north", 100),
    ] {
        chunk
            .push_row(vec![Value::String(region.into()), Value::Int64(amount)])
            .unwrap();
    }
    engine.insert(SESSION, "db", "sales", chunk).unwrap();

    let request = SelectRequest {
        group: Some(GroupBy {
            keys: vec![0],
            aggregates: vec![AggregateExpr {
                function: AggregateFunction::Sum,
                column: 1,
            }],
        }),
        // having: total > 10
        having: Some(TableFilter::Constant {
            column: 1,
            op: CompareOp::Gt,
            value: Value::Int64(10),
        }),
        order: vec![SortKey {
            column: 1,
            direction: SortDirection::Descending,
        }],
        ..Default::default()
    };
    let cursor = engine.select(SESSION, "db", "sales", &request).unwrap();
    let chunk = cursor.chunk();
    assert_eq!(chunk.cardinality(), 2);
    assert_eq!(chunk.value(0, 0), Value::String("north".into()));
    assert_eq!(chunk.value(1, 0), Value::Int64(100));
    assert_eq!(chunk.value(0, 1), Value::String("east".into()));
    assert_eq!(chunk.value(1, 1), Value::Int64(30));
}

#[test]
fn distinct_and_limit() {
    let engine = Engine::open(Settings::in_memory()).unwrap();
    int_table(&engine, "db", "t", TableStorageMode::InMemory);
    insert_ints(&engine, "db", "t", [1, 1, 2, 2, 3, 3].into_iter());

    let distinct = select_values(
        &engine,
        "db",
        "t",
        &SelectRequest {
            distinct: true,
            order: vec![SortKey {
                column: 0,
                direction: SortDirection::Ascending,
            }],
            ..Default::default()
        },
    );
    assert_eq!(distinct, vec![1, 2, 3]);

    let limited = select_values(
        &engine,
        "db",
        "t",
        &SelectRequest {
            order: vec![SortKey {
                column: 0,
                direction: SortDirection::Ascending,
            }],
            limit: Some(2),
            offset: 1,
            ..Default::default()
        },
    );
    assert_eq!(limited, vec![1, 2]);
}

#[test]
fn error_codes_surface_on_cursors() {
    let engine = Engine::open(Settings::in_memory()).unwrap();

    let missing_db = engine.select(SESSION, "nope", "t", &SelectRequest::default());
    assert!(missing_db.is_err());
    let cursor: oxbow::Cursor = missing_db.into();
    assert!(cursor.is_error());
    assert_eq!(cursor.error_code(), ErrorCode::DatabaseNotExists);

    engine.create_database("db").unwrap();
    let missing_table: oxbow::Cursor = engine
        .select(SESSION, "db", "t", &SelectRequest::default())
        .into();
    assert_eq!(missing_table.error_code(), ErrorCode::CollectionNotExists);

    let duplicate: oxbow::Cursor = engine.create_database("db").into();
    assert_eq!(duplicate.error_code(), ErrorCode::DatabaseAlreadyExists);
}

#[test]
fn primary_key_scan_probes_index() {
    use oxbow::exec::{run_scan, ScanOperator};
    use oxbow_storage::Snapshot;

    let engine = Engine::open(Settings::in_memory()).unwrap();
    int_table(&engine, "db", "t", TableStorageMode::InMemory);
    engine.create_index("db", "t", "pk_x", "x").unwrap();
    insert_ints(&engine, "db", "t", 1..=10);

    let handle = engine.handle("db", "t").unwrap();
    let snapshot = Snapshot::latest(engine.transaction_manager());
    let (chunk, row_ids) = run_scan(
        &handle.table,
        &handle.indexes,
        &ScanOperator::PrimaryKey {
            index: "pk_x".into(),
            keys: vec![Value::Int64(3), Value::Int64(7)],
        },
        &snapshot,
    )
    .unwrap();
    assert_eq!(chunk.cardinality(), 2);
    assert_eq!(row_ids, vec![2, 6]);
    let values: Vec<Value> = (0..2).map(|i| chunk.value(0, i)).collect();
    assert_eq!(values, vec![Value::Int64(3), Value::Int64(7)]);
}

#[test]
fn sequences_through_the_catalog() {
    let engine = Engine::open(Settings::in_memory()).unwrap();
    engine.create_database("db").unwrap();
    let mut seq = oxbow_catalog::SequenceEntry::new("ids");
    seq.start_value = 5;
    seq.current_value = 5;
    seq.increment = 5;
    engine.create_sequence("db", seq).unwrap();
    assert_eq!(engine.sequence_next_value("db", "ids").unwrap(), Some(5));
    assert_eq!(engine.sequence_next_value("db", "ids").unwrap(), Some(10));
    assert_eq!(engine.sequence_next_value("db", "missing").unwrap(), None);
}
