use etl_telemetry::tracing::init_test_tracing;
use etl_warehouse::merge::{MergeSettings, TableMerger};
use etl_warehouse::test_utils::fixtures::{credentials_provider, warehouse_table_like};
use etl_warehouse::transform::{DIM_DATE_END, DIM_DATE_START, dim_date, dim_staff};
use etl_warehouse::types::{Cell, Column, Snapshot};
use etl_warehouse::warehouse::memory::MemoryWarehouse;
use pretty_assertions::assert_eq;

#[tokio::test]
async fn full_date_dimension_merges_once() {
    init_test_tracing();

    let snapshot = dim_date(DIM_DATE_START, DIM_DATE_END).unwrap();
    let warehouse = MemoryWarehouse::new();
    warehouse
        .create_table("dim_date", warehouse_table_like("dim_date", &snapshot))
        .await;
    let merger = TableMerger::new(
        warehouse.clone(),
        credentials_provider(),
        MergeSettings::default(),
    );

    let first = merger.merge("dim_date", snapshot.clone()).await.unwrap();
    let second = merger.merge("dim_date", snapshot).await.unwrap();

    assert_eq!(first.new_rows, 18_263);
    assert_eq!(second.new_rows, 0);
    assert_eq!(second.updated_rows, 0);
    assert_eq!(second.unchanged_rows, 18_263);
}

#[tokio::test]
async fn department_change_reaches_the_staff_dimension() {
    init_test_tracing();

    let staff = Snapshot::new(vec![
        Column::from_cells("staff_id", [1i64, 2]),
        Column::from_cells("first_name", ["Jeremie", "Deron"]),
        Column::from_cells("last_name", ["Franey", "Beier"]),
        Column::from_cells("department_id", [2i64, 6]),
        Column::from_cells(
            "email_address",
            [
                "jeremie.franey@terrifictotes.com",
                "deron.beier@terrifictotes.com",
            ],
        ),
    ])
    .unwrap();
    let department = |location: &str| {
        Snapshot::new(vec![
            Column::from_cells("department_id", [2i64, 6]),
            Column::from_cells("department_name", ["Purchasing", "Facilities"]),
            Column::from_cells("location", [location, "Manchester"]),
        ])
        .unwrap()
    };

    let snapshot = dim_staff(&staff, &department("Leeds")).unwrap();
    let warehouse = MemoryWarehouse::new();
    warehouse
        .create_table("dim_staff", warehouse_table_like("dim_staff", &snapshot))
        .await;
    let merger = TableMerger::new(
        warehouse.clone(),
        credentials_provider(),
        MergeSettings::default(),
    );
    merger.merge("dim_staff", snapshot).await.unwrap();

    let moved = dim_staff(&staff, &department("York")).unwrap();
    let summary = merger.merge("dim_staff", moved).await.unwrap();

    assert_eq!(summary.updated_rows, 1);
    assert_eq!(summary.unchanged_rows, 1);
    assert_eq!(
        warehouse.table("dim_staff").await.unwrap().column("location").unwrap().cells,
        vec![Cell::from("York"), Cell::from("Manchester")]
    );
}
