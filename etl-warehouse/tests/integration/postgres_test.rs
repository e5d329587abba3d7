//! Merges against a real Postgres database.
//!
//! These tests only run when `TESTS_DATABASE_HOST` points at a Postgres server and return early
//! otherwise.

use etl_telemetry::tracing::init_test_tracing;
use etl_warehouse::merge::{MergeSettings, TableMerger};
use etl_warehouse::registry;
use etl_warehouse::secrets::memory::StaticCredentialsProvider;
use etl_warehouse::test_utils::database::TestWarehouse;
use etl_warehouse::test_utils::fixtures::{snapshot_for, staff_snapshot, transaction_snapshot};
use etl_warehouse::warehouse::postgres::PgWarehouseConnector;
use pretty_assertions::assert_eq;

fn merger(
    database: &TestWarehouse,
) -> TableMerger<PgWarehouseConnector, StaticCredentialsProvider> {
    TableMerger::new(
        PgWarehouseConnector::new(),
        database.credentials_provider(),
        MergeSettings::default(),
    )
}

#[tokio::test]
async fn changed_row_is_updated_once_in_postgres() {
    init_test_tracing();
    let Some(database) = TestWarehouse::spawn().await else {
        return;
    };

    let before = staff_snapshot(&[(1, "Jeremie"), (2, "Joe"), (3, "Jeanette")]);
    database.create_table_like("dim_staff", &before).await;
    let merger = merger(&database);

    let seeded = merger.merge("dim_staff", before).await.unwrap();
    assert_eq!((seeded.new_rows, seeded.inserted), (3, 3));

    let after = staff_snapshot(&[(1, "Jeremie"), (2, "Dave"), (3, "Jeanette")]);
    let summary = merger.merge("dim_staff", after.clone()).await.unwrap();

    assert_eq!(summary.new_rows, 0);
    assert_eq!(summary.updated_rows, 1);
    assert_eq!(summary.updated, 1);
    assert_eq!(summary.unchanged_rows, 2);

    let rows = database
        .client()
        .query("select first_name from dim_staff where staff_id = 2", &[])
        .await
        .unwrap();
    let first_name: String = rows[0].get(0);
    assert_eq!(first_name, "Dave");

    let rerun = merger.merge("dim_staff", after).await.unwrap();
    assert_eq!((rerun.new_rows, rerun.updated_rows), (0, 0));

    database.drop_database().await;
}

#[tokio::test]
async fn missing_order_ids_stay_null_across_runs() {
    init_test_tracing();
    let Some(database) = TestWarehouse::spawn().await else {
        return;
    };

    let snapshot = transaction_snapshot(&[(1, None, Some(2)), (2, Some(3), None)]);
    database
        .create_table_like("dim_transaction", &snapshot)
        .await;
    let merger = merger(&database);

    let first = merger
        .merge("dim_transaction", snapshot.clone())
        .await
        .unwrap();
    assert_eq!(first.new_rows, 2);

    let rows = database
        .client()
        .query(
            "select transaction_id from dim_transaction
             where sales_order_id is null and purchase_order_id = 2",
            &[],
        )
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    let transaction_id: i32 = rows[0].get(0);
    assert_eq!(transaction_id, 1);

    // `NaN` order ids in the snapshot match the `NULL`s now stored in the warehouse.
    let second = merger.merge("dim_transaction", snapshot).await.unwrap();
    assert_eq!((second.new_rows, second.updated_rows), (0, 0));
    assert_eq!(second.unchanged_rows, 2);

    database.drop_database().await;
}

#[tokio::test]
async fn second_merge_of_every_table_writes_nothing() {
    init_test_tracing();
    let Some(database) = TestWarehouse::spawn().await else {
        return;
    };
    let merger = merger(&database);

    for table_name in registry::table_names() {
        let snapshot = snapshot_for(table_name);
        database.create_table_like(table_name, &snapshot).await;

        let first = merger.merge(table_name, snapshot.clone()).await.unwrap();
        assert_eq!(first.new_rows, snapshot.num_rows(), "{table_name}");

        let second = merger.merge(table_name, snapshot).await.unwrap();
        assert_eq!(
            (second.new_rows, second.updated_rows),
            (0, 0),
            "{table_name}"
        );
    }

    database.drop_database().await;
}
