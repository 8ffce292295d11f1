//! Extraction orchestrator integration tests

use std::sync::Arc;
use std::time::Duration;

use increx::prelude::*;
use increx::testing::MemoryConnectionFactory;

fn table() -> TableMetadata {
    TableMetadata::new("orders")
        .with_schema("sales")
        .with_column(ColumnMetadata::new("id", SqlType::Int64).primary_key(1))
        .with_column(ColumnMetadata::new(
            "amount",
            SqlType::Decimal {
                precision: Some(12),
                scale: Some(2),
            },
        ))
        .with_column(ColumnMetadata::new(
            "updated_at",
            SqlType::Timestamp { with_tz: true },
        ))
}

fn sample_rows(n: i64) -> Vec<Row> {
    (1..=n)
        .map(|i| {
            Row::new(
                vec!["id".into(), "amount".into(), "updated_at".into()],
                vec![Value::Int64(i), Value::Null, Value::Null],
            )
        })
        .collect()
}

fn factory_with_table() -> Arc<MemoryConnectionFactory> {
    let factory = Arc::new(MemoryConnectionFactory::new());
    factory.add_table(table());
    factory
}

fn engine(factory: &Arc<MemoryConnectionFactory>, owned: bool) -> Engine {
    Engine::new(
        "memory://test",
        Arc::clone(factory) as Arc<dyn ConnectionFactory>,
        owned,
        &EngineOptions::default(),
    )
}

#[tokio::test]
async fn test_control_record_comes_first_and_only_once() {
    let factory = factory_with_table();
    factory.set_rows(sample_rows(5));

    let mut stream = TableExtract::new(engine(&factory, true), "orders")
        .with_schema("sales")
        .with_chunk_size(2)
        .run()
        .await
        .unwrap();

    let mut hints_seen = 0;
    let mut chunks_seen = 0;
    let mut first_is_hints = None;
    while let Some(item) = stream.next().await.unwrap() {
        match item {
            ExtractItem::Hints(hints) => {
                hints_seen += 1;
                first_is_hints.get_or_insert(true);
                assert_eq!(hints.primary_key, Some(vec!["id".to_owned()]));
                assert_eq!(hints.columns.len(), 3);
            }
            ExtractItem::Chunk(_) => {
                chunks_seen += 1;
                first_is_hints.get_or_insert(false);
            }
        }
    }
    assert_eq!(hints_seen, 1);
    assert_eq!(chunks_seen, 3);
    assert_eq!(first_is_hints, Some(true));
}

#[tokio::test]
async fn test_reflection_level_controls_hint_types() {
    let factory = factory_with_table();
    factory.set_rows(Vec::new());

    let mut stream = TableExtract::new(engine(&factory, true), "orders")
        .with_schema("sales")
        .with_reflection_level(ReflectionLevel::Minimal)
        .run()
        .await
        .unwrap();

    let Some(ExtractItem::Hints(hints)) = stream.next().await.unwrap() else {
        panic!("expected hints first")
    };
    assert!(hints.columns.iter().all(|c| c.sql_type.is_none()));

    let factory = factory_with_table();
    let mut stream = TableExtract::new(engine(&factory, true), "orders")
        .with_schema("sales")
        .with_reflection_level(ReflectionLevel::Full)
        .run()
        .await
        .unwrap();
    let Some(ExtractItem::Hints(hints)) = stream.next().await.unwrap() else {
        panic!("expected hints first")
    };
    assert_eq!(
        hints.columns[1].sql_type,
        Some(SqlType::Decimal {
            precision: None,
            scale: None
        })
    );
}

#[tokio::test]
async fn test_included_columns_restrict_the_mapping() {
    let factory = factory_with_table();
    factory.set_rows(Vec::new());

    let mut stream = TableExtract::new(engine(&factory, true), "orders")
        .with_schema("sales")
        .with_included_columns(vec!["id".into(), "amount".into()])
        .run()
        .await
        .unwrap();

    let Some(ExtractItem::Hints(hints)) = stream.next().await.unwrap() else {
        panic!("expected hints first")
    };
    let names: Vec<_> = hints.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["id", "amount"]);
}

#[tokio::test]
async fn test_cursor_primary_key_survives_autofill() {
    let factory = factory_with_table();
    factory.set_rows(Vec::new());

    let cursor =
        CursorState::max("updated_at").with_primary_key(vec!["custom_key".to_owned()]);
    let mut stream = TableExtract::new(engine(&factory, true), "orders")
        .with_schema("sales")
        .with_cursor(cursor)
        .run()
        .await
        .unwrap();

    let Some(ExtractItem::Hints(hints)) = stream.next().await.unwrap() else {
        panic!("expected hints first")
    };
    assert_eq!(hints.primary_key, Some(vec!["custom_key".to_owned()]));
}

#[tokio::test]
async fn test_config_driven_run() {
    let factory = factory_with_table();
    factory.set_rows(sample_rows(3));

    let config: ExtractConfig = serde_json::from_str(
        r#"{
            "credentials": "memory://test",
            "table": "orders",
            "schema": "sales",
            "chunk_size": 2,
            "defer_table_reflect": true,
            "reflection_level": "full_with_precision"
        }"#,
    )
    .unwrap();

    let mut stream = config
        .to_extract(engine(&factory, true), None)
        .unwrap()
        .run()
        .await
        .unwrap();

    let Some(ExtractItem::Hints(hints)) = stream.next().await.unwrap() else {
        panic!("expected hints first")
    };
    assert_eq!(
        hints.columns[1].sql_type,
        Some(SqlType::Decimal {
            precision: Some(12),
            scale: Some(2)
        })
    );

    let mut rows = 0;
    while let Some(item) = stream.next().await.unwrap() {
        if let ExtractItem::Chunk(chunk) = item {
            rows += chunk.num_rows();
        }
    }
    assert_eq!(rows, 3);
}

#[tokio::test]
async fn test_table_not_found_without_metadata() {
    let factory = Arc::new(MemoryConnectionFactory::new());

    let err = TableExtract::new(engine(&factory, true), "missing")
        .with_schema("sales")
        .run()
        .await
        .unwrap_err();
    assert!(matches!(err, Error::TableNotFound { .. }));
    assert!(err.to_string().contains("sales.missing"));
}

#[tokio::test]
async fn test_supplied_metadata_skips_reflection_and_hints() {
    // No metadata is registered with the factory; the run must not reflect.
    let factory = Arc::new(MemoryConnectionFactory::new());
    factory.set_rows(sample_rows(1));

    let mut stream = TableExtract::new(engine(&factory, true), "orders")
        .with_schema("sales")
        .with_metadata(table())
        .run()
        .await
        .unwrap();

    // The caller already knows the mapping; the stream starts with data.
    let Some(ExtractItem::Chunk(chunk)) = stream.next().await.unwrap() else {
        panic!("expected a data chunk first when metadata is pre-supplied")
    };
    assert_eq!(chunk.num_rows(), 1);
    assert!(stream.next().await.unwrap().is_none());
}

#[tokio::test]
async fn test_owned_engine_is_disposed_after_exhaustion() {
    let factory = factory_with_table();
    factory.set_rows(sample_rows(2));

    let engine = engine(&factory, true);
    let probe = engine.clone();
    let mut stream = TableExtract::new(engine, "orders")
        .with_schema("sales")
        .run()
        .await
        .unwrap();

    while stream.next().await.unwrap().is_some() {}
    assert!(probe.is_disposed());

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(factory.closed_connections(), factory.open_connections());
}

#[tokio::test]
async fn test_external_engine_is_left_open() {
    let factory = factory_with_table();
    factory.set_rows(sample_rows(2));

    let engine = engine(&factory, false);
    let probe = engine.clone();
    let mut stream = TableExtract::new(engine, "orders")
        .with_schema("sales")
        .run()
        .await
        .unwrap();

    while stream.next().await.unwrap().is_some() {}
    assert!(!probe.is_disposed());
    assert!(probe.connect().await.is_ok());
}

#[tokio::test]
async fn test_owned_engine_is_disposed_on_prepare_error() {
    let factory = factory_with_table();
    factory.fail_queries("permission denied");

    let engine = engine(&factory, true);
    let probe = engine.clone();
    let err = TableExtract::new(engine, "orders")
        .with_schema("sales")
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Query { .. }));
    assert!(probe.is_disposed());
}

#[tokio::test]
async fn test_early_drop_disposes_owned_engine_in_background() {
    let factory = factory_with_table();
    factory.set_rows(sample_rows(100));

    let engine = engine(&factory, true);
    let probe = engine.clone();
    let mut stream = TableExtract::new(engine, "orders")
        .with_schema("sales")
        .with_chunk_size(10)
        .run()
        .await
        .unwrap();

    // Consume the control record and one chunk, then walk away.
    stream.next().await.unwrap();
    stream.next().await.unwrap();
    drop(stream);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(probe.is_disposed());
}
