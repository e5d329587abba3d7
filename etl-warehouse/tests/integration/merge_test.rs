use etl_telemetry::tracing::init_test_tracing;
use etl_warehouse::error::ErrorKind;
use etl_warehouse::merge::{MergeSettings, TableMerger};
use etl_warehouse::secrets::memory::StaticCredentialsProvider;
use etl_warehouse::sql::StatementKind;
use etl_warehouse::test_utils::fixtures::{
    credentials_provider, snapshot_for, staff_snapshot, transaction_snapshot,
    warehouse_table_like,
};
use etl_warehouse::test_utils::logs::LogCapture;
use etl_warehouse::types::{Cell, Snapshot};
use etl_warehouse::warehouse::memory::{Fault, MemoryWarehouse};
use pretty_assertions::assert_eq;

const STAFF: &[(i64, &str)] = &[(1, "Jeremie"), (2, "Joe"), (3, "Jeanette")];

fn merger(warehouse: &MemoryWarehouse) -> TableMerger<MemoryWarehouse, StaticCredentialsProvider> {
    TableMerger::new(
        warehouse.clone(),
        credentials_provider(),
        MergeSettings::default(),
    )
}

/// Warehouse whose `table_name` table holds the rows of `contents`.
async fn warehouse_holding(table_name: &str, contents: &Snapshot) -> MemoryWarehouse {
    let warehouse = MemoryWarehouse::new();
    warehouse
        .create_table(table_name, warehouse_table_like(table_name, contents))
        .await;
    warehouse.seed(table_name, contents).await.unwrap();
    warehouse
}

#[tokio::test]
async fn identical_snapshot_writes_nothing() {
    init_test_tracing();
    let capture = LogCapture::new();
    let _guard = capture.install();

    let warehouse = warehouse_holding("dim_staff", &staff_snapshot(STAFF)).await;

    let summary = merger(&warehouse)
        .merge("dim_staff", staff_snapshot(STAFF))
        .await
        .unwrap();

    assert_eq!(summary.new_rows, 0);
    assert_eq!(summary.updated_rows, 0);
    assert_eq!(summary.unchanged_rows, 3);
    assert!(capture.contains("New rows to insert: 0"));
    assert!(capture.contains("Existing rows to update: 0"));
    assert!(!capture.contains("Inserting new data into table: dim_staff"));
    assert!(warehouse.statements().await.is_empty());
}

#[tokio::test]
async fn unknown_primary_key_is_inserted_once() {
    init_test_tracing();
    let capture = LogCapture::new();
    let _guard = capture.install();

    let warehouse = warehouse_holding("dim_staff", &staff_snapshot(STAFF)).await;
    let snapshot = staff_snapshot(&[(1, "Jeremie"), (2, "Joe"), (3, "Jeanette"), (4, "Deron")]);

    let summary = merger(&warehouse).merge("dim_staff", snapshot).await.unwrap();

    assert_eq!(summary.new_rows, 1);
    assert_eq!(summary.updated_rows, 0);
    assert_eq!(summary.inserted, 1);

    let statements = warehouse.statements_for("dim_staff").await;
    assert_eq!(statements.len(), 1);
    assert_eq!(statements[0].statement.kind(), StatementKind::Insert);
    assert_eq!(statements[0].statement.rows().len(), 1);
    assert_eq!(statements[0].statement.rows()[0].values()[0], Cell::I64(4));

    assert!(capture.contains("New rows to insert: 1"));
    assert!(capture.contains("Inserting new data into table: dim_staff"));
    assert!(capture.contains("New data commited to table: dim_staff"));
    assert_eq!(warehouse.table("dim_staff").await.unwrap().num_rows(), 4);
}

#[tokio::test]
async fn changed_value_is_updated_once() {
    init_test_tracing();
    let capture = LogCapture::new();
    let _guard = capture.install();

    let warehouse = warehouse_holding("dim_staff", &staff_snapshot(STAFF)).await;
    let snapshot = staff_snapshot(&[(1, "Jeremie"), (2, "Dave"), (3, "Jeanette")]);

    let summary = merger(&warehouse).merge("dim_staff", snapshot).await.unwrap();

    assert_eq!(summary.new_rows, 0);
    assert_eq!(summary.updated_rows, 1);
    assert_eq!(summary.unchanged_rows, 2);

    let statements = warehouse.statements_for("dim_staff").await;
    assert_eq!(statements.len(), 1);
    assert_eq!(statements[0].statement.kind(), StatementKind::Update);
    assert_eq!(statements[0].statement.rows().len(), 1);
    assert_eq!(statements[0].statement.rows()[0].values()[0], Cell::I64(2));

    assert!(capture.contains("Existing rows to update: 1"));
    assert!(capture.contains("Updated data commited to table: dim_staff"));

    let table = warehouse.table("dim_staff").await.unwrap();
    assert_eq!(
        table.column("first_name").unwrap().cells,
        vec![
            Cell::from("Jeremie"),
            Cell::from("Dave"),
            Cell::from("Jeanette")
        ]
    );
}

#[tokio::test]
async fn changed_and_new_rows_are_classified_apart() {
    init_test_tracing();

    let warehouse = warehouse_holding("dim_staff", &staff_snapshot(STAFF)).await;
    let snapshot = staff_snapshot(&[
        (1, "Jeremie"),
        (2, "Dave"),
        (3, "Jeanette"),
        (4, "Deron"),
        (5, "Ana"),
    ]);

    let summary = merger(&warehouse).merge("dim_staff", snapshot).await.unwrap();

    assert_eq!(summary.new_rows, 2);
    assert_eq!(summary.updated_rows, 1);
    assert_eq!(summary.unchanged_rows, 2);
    assert_eq!(
        summary.new_rows + summary.updated_rows + summary.unchanged_rows,
        5
    );

    let kinds: Vec<StatementKind> = warehouse
        .statements()
        .await
        .iter()
        .map(|executed| executed.statement.kind())
        .collect();
    assert_eq!(kinds, vec![StatementKind::Insert, StatementKind::Update]);
}

#[tokio::test]
async fn second_merge_of_every_table_is_a_no_op() {
    init_test_tracing();

    for table_name in etl_warehouse::registry::table_names() {
        let snapshot = snapshot_for(table_name);
        let warehouse = MemoryWarehouse::new();
        warehouse
            .create_table(table_name, warehouse_table_like(table_name, &snapshot))
            .await;
        let merger = merger(&warehouse);

        let first = merger.merge(table_name, snapshot.clone()).await.unwrap();
        assert_eq!(first.new_rows, snapshot.num_rows(), "{table_name}");

        let second = merger.merge(table_name, snapshot).await.unwrap();
        assert_eq!(second.new_rows, 0, "{table_name}");
        assert_eq!(second.updated_rows, 0, "{table_name}");
        assert_eq!(second.unchanged_rows, first.new_rows, "{table_name}");
        assert_eq!(warehouse.statements().await.len(), 1, "{table_name}");
    }
}

#[tokio::test]
async fn missing_order_ids_match_warehouse_nulls() {
    init_test_tracing();

    let rows = [(1, None, Some(2)), (2, Some(3), None), (3, None, None)];
    let snapshot = transaction_snapshot(&rows);
    let warehouse = MemoryWarehouse::new();
    warehouse
        .create_table(
            "dim_transaction",
            warehouse_table_like("dim_transaction", &snapshot),
        )
        .await;
    let merger = merger(&warehouse);
    merger.merge("dim_transaction", snapshot).await.unwrap();

    let stored = warehouse.table("dim_transaction").await.unwrap();
    assert_eq!(
        stored.column("sales_order_id").unwrap().cells,
        vec![Cell::Null, Cell::I64(3), Cell::Null]
    );

    // The snapshot still carries NaN for the missing ids.
    let summary = merger
        .merge("dim_transaction", transaction_snapshot(&rows))
        .await
        .unwrap();

    assert_eq!(summary.updated_rows, 0);
    assert_eq!(summary.unchanged_rows, 3);
}

#[tokio::test]
async fn failed_insert_still_closes_the_connection() {
    init_test_tracing();
    let capture = LogCapture::new();
    let _guard = capture.install();

    let warehouse = warehouse_holding("dim_staff", &staff_snapshot(STAFF)).await;
    warehouse
        .inject_fault(Fault::Insert("dim_staff".to_string()))
        .await;
    let snapshot = staff_snapshot(&[(1, "Jeremie"), (2, "Joe"), (3, "Jeanette"), (4, "Deron")]);

    let err = merger(&warehouse)
        .merge("dim_staff", snapshot)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::QueryError);
    assert!(capture.contains("Inserting new data into table: dim_staff"));
    assert!(!capture.contains("New data commited to table: dim_staff"));
    assert!(capture.contains("Connection closed successfully"));
    assert_eq!(capture.errors_for("dim_staff").len(), 1);
    assert_eq!(warehouse.closed_connections().await, 1);
    assert_eq!(warehouse.open_connections().await, 0);
    assert_eq!(warehouse.table("dim_staff").await.unwrap().num_rows(), 3);
}

#[tokio::test]
async fn failed_update_keeps_committed_insert() {
    init_test_tracing();
    let capture = LogCapture::new();
    let _guard = capture.install();

    let warehouse = warehouse_holding("dim_staff", &staff_snapshot(STAFF)).await;
    warehouse
        .inject_fault(Fault::Update("dim_staff".to_string()))
        .await;
    let snapshot = staff_snapshot(&[(1, "Jeremie"), (2, "Dave"), (3, "Jeanette"), (4, "Deron")]);

    let err = merger(&warehouse)
        .merge("dim_staff", snapshot)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::QueryError);
    assert!(capture.contains("New data commited to table: dim_staff"));
    assert!(capture.contains("Connection closed successfully"));

    let table = warehouse.table("dim_staff").await.unwrap();
    assert_eq!(table.num_rows(), 4);
    assert_eq!(
        table.column("first_name").unwrap().cells[1],
        Cell::from("Joe")
    );
}

#[tokio::test]
async fn snapshot_missing_a_warehouse_column_is_rejected() {
    init_test_tracing();

    let warehouse = warehouse_holding("dim_staff", &staff_snapshot(STAFF)).await;
    let snapshot = staff_snapshot(STAFF).select(&["staff_id", "first_name"]).unwrap();

    let err = merger(&warehouse)
        .merge("dim_staff", snapshot)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::DataShapeError);
    assert!(warehouse.statements().await.is_empty());
    assert_eq!(warehouse.closed_connections().await, 1);
}

#[tokio::test]
async fn failed_state_read_still_closes_the_connection() {
    init_test_tracing();
    let capture = LogCapture::new();
    let _guard = capture.install();

    let warehouse = warehouse_holding("dim_staff", &staff_snapshot(STAFF)).await;
    warehouse
        .inject_fault(Fault::FetchTableState("dim_staff".to_string()))
        .await;
    let snapshot = staff_snapshot(&[(1, "Jeremie"), (2, "Dave"), (3, "Jeanette"), (4, "Deron")]);

    let err = merger(&warehouse)
        .merge("dim_staff", snapshot.clone())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::QueryError);
    assert_eq!(capture.errors_for("dim_staff").len(), 1);
    assert!(capture.contains("Connection closed successfully"));
    assert!(!capture.contains("New rows to insert: 1"));
    assert!(warehouse.statements().await.is_empty());
    assert_eq!(warehouse.closed_connections().await, 1);
    assert_eq!(warehouse.open_connections().await, 0);

    // Once the warehouse is readable again the same snapshot converges.
    warehouse.clear_faults().await;
    let summary = merger(&warehouse).merge("dim_staff", snapshot).await.unwrap();

    assert_eq!(summary.new_rows, 1);
    assert_eq!(summary.updated_rows, 1);
    assert_eq!(warehouse.closed_connections().await, 2);
}
