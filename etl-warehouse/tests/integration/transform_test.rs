use chrono::NaiveDate;
use etl_telemetry::tracing::init_test_tracing;
use etl_warehouse::error::ErrorKind;
use etl_warehouse::pipeline::{PopulationPipeline, snapshot_key};
use etl_warehouse::registry;
use etl_warehouse::storage::SnapshotStore;
use etl_warehouse::storage::memory::MemorySnapshotStore;
use etl_warehouse::test_utils::fixtures::{
    EXTRACT_SOURCES, TEST_BUCKET, TEST_INGESTION_BUCKET, create_tables_like_stored,
    credentials_provider, populator_config, seed_extracts,
};
use etl_warehouse::test_utils::logs::LogCapture;
use etl_warehouse::transform::TransformPipeline;
use etl_warehouse::types::Cell;
use etl_warehouse::warehouse::memory::MemoryWarehouse;
use pretty_assertions::assert_eq;

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2022, 11, day).unwrap()
}

fn transform_pipeline(store: &MemorySnapshotStore) -> TransformPipeline<MemorySnapshotStore> {
    TransformPipeline::new(store.clone(), TEST_INGESTION_BUCKET, TEST_BUCKET)
        .with_date_range(date(1), date(7))
}

#[tokio::test]
async fn transform_stores_one_snapshot_per_table() {
    init_test_tracing();
    let store = MemorySnapshotStore::new();
    seed_extracts(&store, EXTRACT_SOURCES).await;

    let report = transform_pipeline(&store).run().await;

    assert!(report.all_succeeded());
    assert_eq!(report.len(), 11);
    assert_eq!(
        report.outcome("dim_date").unwrap().result.as_ref().ok(),
        Some(&7)
    );

    let mut expected: Vec<String> = registry::table_names()
        .into_iter()
        .map(snapshot_key)
        .collect();
    expected.sort();
    assert_eq!(store.object_keys(TEST_BUCKET).await, expected);

    let staff = store
        .fetch_snapshot(TEST_BUCKET, &snapshot_key("dim_staff"))
        .await
        .unwrap();
    assert_eq!(staff.num_rows(), 3);
    assert_eq!(
        staff.column("department_name").unwrap().cells,
        vec![
            Cell::from("Purchasing"),
            Cell::from("Sales"),
            Cell::from("Purchasing")
        ]
    );

    let transaction = store
        .fetch_snapshot(TEST_BUCKET, &snapshot_key("dim_transaction"))
        .await
        .unwrap();
    assert_eq!(
        transaction.column("sales_order_id").unwrap().cells,
        vec![Cell::Null, Cell::I64(2)]
    );

    let sales = store
        .fetch_snapshot(TEST_BUCKET, &snapshot_key("fact_sales_order"))
        .await
        .unwrap();
    assert_eq!(
        sales.column("last_updated_date").unwrap().cells,
        vec![Cell::Date(date(3)), Cell::Date(date(4))]
    );
    assert_eq!(
        sales.column("sales_record_id").unwrap().cells,
        vec![Cell::I64(1), Cell::I64(2)]
    );
}

#[tokio::test]
async fn transformed_snapshots_populate_the_warehouse_once() {
    init_test_tracing();
    let store = MemorySnapshotStore::new();
    let warehouse = MemoryWarehouse::new();
    seed_extracts(&store, EXTRACT_SOURCES).await;

    assert!(transform_pipeline(&store).run().await.all_succeeded());
    create_tables_like_stored(&store, &warehouse, &registry::table_names()).await;

    let population = PopulationPipeline::new(
        &populator_config(None),
        store.clone(),
        warehouse.clone(),
        credentials_provider(),
    );

    let first = population.run().await;
    assert!(first.all_succeeded());
    let staff = first.outcome("dim_staff").unwrap().result.as_ref().unwrap();
    assert_eq!(staff.new_rows, 3);
    assert_eq!(warehouse.table("dim_date").await.unwrap().num_rows(), 7);

    // A second transform of unchanged extracts leaves nothing to merge.
    assert!(transform_pipeline(&store).run().await.all_succeeded());
    let second = population.run().await;

    for outcome in second.outcomes() {
        let summary = outcome.result.as_ref().unwrap();
        assert_eq!(
            (summary.new_rows, summary.updated_rows),
            (0, 0),
            "{}",
            outcome.table_name
        );
    }
}

#[tokio::test]
async fn missing_extract_fails_only_the_tables_built_from_it() {
    init_test_tracing();
    let capture = LogCapture::new();
    let _guard = capture.install();

    let store = MemorySnapshotStore::new();
    let sources: Vec<&str> = EXTRACT_SOURCES
        .iter()
        .copied()
        .filter(|source| *source != "address")
        .collect();
    seed_extracts(&store, &sources).await;
    store
        .fail_key(TEST_BUCKET, &snapshot_key("dim_design"))
        .await;

    let report = transform_pipeline(&store).run().await;

    assert_eq!(
        report.failed_tables(),
        vec!["dim_location", "dim_design", "dim_counterparty"]
    );
    let kind_of = |table_name: &str| {
        report
            .outcome(table_name)
            .and_then(|outcome| outcome.result.as_ref().err())
            .map(|err| err.kind())
    };
    assert_eq!(kind_of("dim_location"), Some(ErrorKind::FetchError));
    assert_eq!(kind_of("dim_counterparty"), Some(ErrorKind::FetchError));
    assert_eq!(kind_of("dim_design"), Some(ErrorKind::UploadError));

    assert_eq!(capture.count("extract unavailable"), 1);
    assert_eq!(capture.errors_for("dim_counterparty").len(), 1);
    assert!(
        store
            .object(TEST_BUCKET, &snapshot_key("dim_staff"))
            .await
            .is_some()
    );
    assert!(
        store
            .object(TEST_BUCKET, &snapshot_key("dim_location"))
            .await
            .is_none()
    );
}
