use etl_telemetry::tracing::init_test_tracing;
use etl_warehouse::error::ErrorKind;
use etl_warehouse::pipeline::{PopulationPipeline, snapshot_key};
use etl_warehouse::registry;
use etl_warehouse::secrets::cached::CachedCredentialsProvider;
use etl_warehouse::secrets::memory::StaticCredentialsProvider;
use etl_warehouse::storage::memory::MemorySnapshotStore;
use etl_warehouse::test_utils::fixtures::{
    TEST_BUCKET, credentials_provider, populator_config, seed_tables, staff_snapshot,
};
use etl_warehouse::test_utils::logs::LogCapture;
use etl_warehouse::warehouse::memory::{Fault, MemoryWarehouse};
use pretty_assertions::assert_eq;

async fn seeded_collaborators() -> (MemorySnapshotStore, MemoryWarehouse) {
    let store = MemorySnapshotStore::new();
    let warehouse = MemoryWarehouse::new();
    seed_tables(&store, &warehouse, &registry::table_names()).await;

    (store, warehouse)
}

#[tokio::test]
async fn populates_every_table_in_registry_order() {
    init_test_tracing();
    let (store, warehouse) = seeded_collaborators().await;

    let pipeline = PopulationPipeline::new(
        &populator_config(None),
        store.clone(),
        warehouse.clone(),
        credentials_provider(),
    );
    let report = pipeline.run().await;

    assert!(report.all_succeeded());
    assert_eq!(report.len(), 11);
    let processed: Vec<&str> = report
        .outcomes()
        .iter()
        .map(|outcome| outcome.table_name.as_str())
        .collect();
    assert_eq!(processed, registry::table_names());

    let fetched: Vec<String> = store.fetches().await.into_iter().map(|(_, key)| key).collect();
    let expected: Vec<String> = registry::table_names()
        .into_iter()
        .map(snapshot_key)
        .collect();
    assert_eq!(fetched, expected);

    assert_eq!(warehouse.statements().await.len(), 11);
    assert_eq!(warehouse.closed_connections().await, 11);
    assert_eq!(warehouse.open_connections().await, 0);
}

#[tokio::test]
async fn failing_table_does_not_affect_the_others() {
    init_test_tracing();
    let capture = LogCapture::new();
    let _guard = capture.install();

    let (store, warehouse) = seeded_collaborators().await;
    store
        .fail_key(TEST_BUCKET, &snapshot_key("dim_counterparty"))
        .await;

    let pipeline = PopulationPipeline::new(
        &populator_config(None),
        store,
        warehouse.clone(),
        credentials_provider(),
    );
    let report = pipeline.run().await;

    for table_name in registry::table_names() {
        let expected = table_name != "dim_counterparty";
        assert_eq!(report.get(table_name), Some(expected), "{table_name}");
    }
    assert_eq!(report.failed_tables(), vec!["dim_counterparty"]);

    let err = report
        .outcome("dim_counterparty")
        .and_then(|outcome| outcome.result.as_ref().err())
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::FetchError);
    assert_eq!(capture.errors_for("dim_counterparty").len(), 1);
    assert!(warehouse.statements_for("dim_counterparty").await.is_empty());
    assert!(
        capture
            .messages()
            .iter()
            .any(|message| message.contains("'dim_counterparty': false"))
    );
}

#[tokio::test]
async fn warehouse_failure_is_reported_per_table() {
    init_test_tracing();
    let capture = LogCapture::new();
    let _guard = capture.install();

    let (store, warehouse) = seeded_collaborators().await;
    warehouse
        .inject_fault(Fault::Insert("fact_payment".to_string()))
        .await;

    let pipeline = PopulationPipeline::new(
        &populator_config(Some(&["dim_staff", "fact_payment", "dim_date"])),
        store,
        warehouse.clone(),
        credentials_provider(),
    );
    let report = pipeline.run().await;

    assert_eq!(report.to_string(), "{'dim_staff': true, 'fact_payment': false, 'dim_date': true}");
    assert_eq!(
        serde_json::to_value(&report).unwrap(),
        serde_json::json!({"dim_staff": true, "fact_payment": false, "dim_date": true})
    );
    assert_eq!(capture.count("Connection closed successfully"), 3);
    assert_eq!(warehouse.closed_connections().await, 3);

    let err = report.into_result().unwrap_err();
    assert_eq!(err.kinds(), vec![ErrorKind::QueryError]);
}

#[tokio::test]
async fn missing_bucket_fails_every_table() {
    init_test_tracing();
    let (store, warehouse) = seeded_collaborators().await;
    store.remove_bucket(TEST_BUCKET).await;

    let pipeline = PopulationPipeline::new(
        &populator_config(None),
        store,
        warehouse.clone(),
        credentials_provider(),
    );
    let report = pipeline.run().await;

    assert_eq!(report.failed_tables(), registry::table_names());
    assert_eq!(warehouse.closed_connections().await, 0);
}

#[tokio::test]
async fn missing_secret_fails_tables_without_connecting() {
    init_test_tracing();
    let (store, warehouse) = seeded_collaborators().await;

    let pipeline = PopulationPipeline::new(
        &populator_config(Some(&["dim_staff", "dim_design"])),
        store,
        warehouse.clone(),
        StaticCredentialsProvider::new(),
    );
    let report = pipeline.run().await;

    assert_eq!(report.failed_tables(), vec!["dim_staff", "dim_design"]);
    let err = report.into_result().unwrap_err();
    assert_eq!(
        err.kinds(),
        vec![ErrorKind::CredentialsError, ErrorKind::CredentialsError]
    );
    assert_eq!(warehouse.closed_connections().await, 0);
}

#[tokio::test]
async fn concurrent_tables_keep_isolation_and_order() {
    init_test_tracing();
    let (store, warehouse) = seeded_collaborators().await;
    store
        .fail_key(TEST_BUCKET, &snapshot_key("dim_location"))
        .await;

    let credentials = credentials_provider();
    let mut config = populator_config(None);
    config.max_concurrent_tables = 4;

    let pipeline = PopulationPipeline::new(
        &config,
        store,
        warehouse.clone(),
        CachedCredentialsProvider::new(credentials.clone()),
    );
    let report = pipeline.run().await;

    let processed: Vec<&str> = report
        .outcomes()
        .iter()
        .map(|outcome| outcome.table_name.as_str())
        .collect();
    assert_eq!(processed, registry::table_names());
    assert_eq!(report.failed_tables(), vec!["dim_location"]);

    // Every merged table used its own connection, and the secret was read once.
    let mut connection_ids: Vec<u64> = warehouse
        .statements()
        .await
        .iter()
        .map(|executed| executed.connection_id)
        .collect();
    connection_ids.sort_unstable();
    connection_ids.dedup();
    assert_eq!(connection_ids.len(), 10);
    assert_eq!(credentials.lookups(), 1);
}

#[tokio::test]
async fn rerun_after_source_change_updates_only_the_changed_rows() {
    init_test_tracing();
    let (store, warehouse) = seeded_collaborators().await;
    let config = populator_config(Some(&["dim_staff"]));

    let pipeline = PopulationPipeline::new(
        &config,
        store.clone(),
        warehouse.clone(),
        credentials_provider(),
    );
    assert!(pipeline.run().await.all_succeeded());

    store
        .insert(
            TEST_BUCKET,
            &snapshot_key("dim_staff"),
            staff_snapshot(&[(1, "Jeremie"), (2, "Dave"), (3, "Jeanette"), (4, "Ana")]),
        )
        .await;
    warehouse.clear_statements().await;

    let report = pipeline.run().await;
    let summary = report
        .outcome("dim_staff")
        .and_then(|outcome| outcome.result.as_ref().ok())
        .copied()
        .unwrap();

    assert_eq!(summary.new_rows, 1);
    assert_eq!(summary.updated_rows, 1);
    assert_eq!(summary.unchanged_rows, 2);
    assert_eq!(warehouse.statements().await.len(), 2);
}
