use chrono::NaiveDate;
use etl_config::shared::PopulatorConfig;

use crate::pipeline::snapshot_key;
use crate::registry::{self, TargetType};
use crate::secrets::memory::StaticCredentialsProvider;
use crate::storage::SnapshotStore;
use crate::storage::memory::MemorySnapshotStore;
use crate::transform::{self, extract_key};
use crate::types::{Cell, Column, ColumnType, Snapshot};
use crate::warehouse::memory::{MemoryWarehouse, empty_table};

pub const TEST_BUCKET: &str = "processed-bucket";

pub const TEST_INGESTION_BUCKET: &str = "ingestion-bucket";

pub const TEST_SECRET_NAME: &str = "warehouse_credentials";

pub const TEST_SECRET: &str = r#"{"host": "localhost", "dbname": "warehouse", "user": "loader", "password": "loader", "port": "5432"}"#;

pub fn credentials_provider() -> StaticCredentialsProvider {
    StaticCredentialsProvider::new().with_secret(TEST_SECRET_NAME, TEST_SECRET)
}

/// Configuration of a run over `tables`, or over every table when [`None`].
pub fn populator_config(tables: Option<&[&str]>) -> PopulatorConfig {
    PopulatorConfig {
        bucket: TEST_BUCKET.to_string(),
        warehouse_secret_name: TEST_SECRET_NAME.to_string(),
        tables: tables.map(|tables| tables.iter().map(|table| table.to_string()).collect()),
        connection_timeout_ms: 5_000,
        merge_timeout_ms: 10_000,
        max_concurrent_tables: 1,
        ingestion_bucket: Some(TEST_INGESTION_BUCKET.to_string()),
        s3_endpoint: None,
    }
}

/// `dim_staff` snapshot with one row per `(staff_id, first_name)`.
pub fn staff_snapshot(rows: &[(i64, &str)]) -> Snapshot {
    let text_column = |name: &str, value: fn(i64, &str) -> String| {
        Column::new(
            name,
            ColumnType::Text,
            rows.iter()
                .map(|(id, first_name)| Cell::String(value(*id, first_name)))
                .collect(),
        )
    };

    let snapshot = Snapshot::new(vec![
        Column::new(
            "staff_id",
            ColumnType::Int,
            rows.iter().map(|(id, _)| Cell::I64(*id)).collect(),
        ),
        text_column("first_name", |_, first_name| first_name.to_string()),
        text_column("last_name", |id, _| format!("Surname{id}")),
        text_column("department_name", |_, _| "Sales".to_string()),
        text_column("location", |_, _| "Manchester".to_string()),
        text_column("email_address", |id, first_name| {
            format!("{}.{id}@terrifictotes.com", first_name.to_lowercase())
        }),
    ]);

    snapshot.unwrap_or_default()
}

/// `dim_transaction` snapshot as the transform stage writes it: order ids are floats, with
/// `NaN` for a missing order.
pub fn transaction_snapshot(rows: &[(i64, Option<i64>, Option<i64>)]) -> Snapshot {
    let order_id = |value: Option<i64>| Cell::F64(value.map_or(f64::NAN, |id| id as f64));

    let snapshot = Snapshot::new(vec![
        Column::new(
            "transaction_id",
            ColumnType::Int,
            rows.iter().map(|(id, _, _)| Cell::I64(*id)).collect(),
        ),
        Column::new(
            "transaction_type",
            ColumnType::Text,
            rows.iter()
                .map(|(_, sales, _)| Cell::from(if sales.is_some() { "SALE" } else { "PURCHASE" }))
                .collect(),
        ),
        Column::new(
            "sales_order_id",
            ColumnType::Float,
            rows.iter().map(|(_, sales, _)| order_id(*sales)).collect(),
        ),
        Column::new(
            "purchase_order_id",
            ColumnType::Float,
            rows.iter().map(|(_, _, purchase)| order_id(*purchase)).collect(),
        ),
    ]);

    snapshot.unwrap_or_default()
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap_or_default()
}

fn timestamp_column(name: &str, values: &[&str]) -> Column {
    Column::from_cells(name, values.iter().copied())
}

fn address() -> Snapshot {
    Snapshot::new(vec![
        Column::from_cells("address_id", [1i64, 2]),
        Column::from_cells("address_line_1", ["6826 Herzog Via", "179 Alexie Cliffs"]),
        Column::from_cells("address_line_2", [None, Some("Flat 2")]),
        Column::from_cells("district", [Some("Avon"), None]),
        Column::from_cells("city", ["New Patienceburgh", "Aliso Viejo"]),
        Column::from_cells("postal_code", ["28441", "99305-7380"]),
        Column::from_cells("country", ["Turkey", "San Marino"]),
        Column::from_cells("phone", ["1803 637401", "9621 880720"]),
    ])
    .unwrap_or_default()
}

/// A small, consistent snapshot for every registered table.
///
/// # Panics
///
/// Panics if `table_name` is not registered.
pub fn snapshot_for(table_name: &str) -> Snapshot {
    let audit = |num_rows: usize| {
        vec![
            timestamp_column("created_at", &vec!["2022-11-03 14:20:52.186"; num_rows]),
            timestamp_column("last_updated", &vec!["2022-11-03 14:20:52.186"; num_rows]),
        ]
    };

    let snapshot = match table_name {
        "dim_staff" => Ok(staff_snapshot(&[(1, "Jeremie"), (2, "Deron"), (3, "Jeanette")])),
        "dim_date" => transform::dim_date(date(2022, 11, 1), date(2022, 11, 7)),
        "dim_location" => transform::dim_location(&address()),
        "dim_design" => Snapshot::new(vec![
            Column::from_cells("design_id", [8i64, 51]),
            Column::from_cells("design_name", ["Wooden", "Bronze"]),
            Column::from_cells("file_location", ["/usr", "/private"]),
            Column::from_cells(
                "file_name",
                ["wooden-20220717-npgz.json", "bronze-20221024-4dds.json"],
            ),
        ]),
        "dim_counterparty" => Snapshot::new(vec![
            Column::from_cells("counterparty_id", [1i64, 2]),
            Column::from_cells("counterparty_legal_name", ["Fahey and Sons", "Leannon Ltd"]),
            Column::from_cells("legal_address_id", [2i64, 1]),
        ])
        .and_then(|counterparty| transform::dim_counterparty(&counterparty, &address())),
        "dim_transaction" => Ok(transaction_snapshot(&[(1, None, Some(2)), (2, Some(3), None)])),
        "dim_payment_type" => Snapshot::new(vec![
            Column::from_cells("payment_type_id", [1i64, 2]),
            Column::from_cells("payment_type_name", ["SALES_RECEIPT", "SALES_REFUND"]),
        ]),
        "dim_currency" => Snapshot::new(vec![
            Column::from_cells("currency_id", [1i64, 2, 3]),
            Column::from_cells("currency_code", ["GBP", "USD", "EUR"]),
        ])
        .and_then(|currency| transform::dim_currency(&currency)),
        "fact_sales_order" => {
            let mut columns = vec![
                Column::from_cells("sales_order_id", [2i64, 3]),
                Column::from_cells("design_id", [8i64, 51]),
                Column::from_cells("staff_id", [1i64, 2]),
                Column::from_cells("counterparty_id", [1i64, 2]),
                Column::from_cells("units_sold", [42972i64, 65839]),
                Column::from_cells("unit_price", [3.94, 2.91]),
                Column::from_cells("currency_id", [2i64, 3]),
                Column::from_cells("agreed_delivery_date", ["2022-11-07", "2022-11-06"]),
                Column::from_cells("agreed_payment_date", ["2022-11-08", "2022-11-07"]),
                Column::from_cells("agreed_delivery_location_id", [1i64, 2]),
            ];
            columns.extend(audit(2));
            Snapshot::new(columns).and_then(|source| transform::fact_sales_order(&source))
        }
        "fact_purchase_order" => {
            let mut columns = vec![
                Column::from_cells("purchase_order_id", [1i64]),
                Column::from_cells("staff_id", [3i64]),
                Column::from_cells("counterparty_id", [2i64]),
                Column::from_cells("item_code", ["ZDOI5EA"]),
                Column::from_cells("item_quantity", [371i64]),
                Column::from_cells("item_unit_price", [361.39]),
                Column::from_cells("currency_id", [2i64]),
                Column::from_cells("agreed_delivery_date", ["2022-11-09"]),
                Column::from_cells("agreed_payment_date", ["2022-11-07"]),
                Column::from_cells("agreed_delivery_location_id", [1i64]),
            ];
            columns.extend(audit(1));
            Snapshot::new(columns).and_then(|source| transform::fact_purchase_order(&source))
        }
        "fact_payment" => {
            let mut columns = vec![
                Column::from_cells("payment_id", [2i64]),
                Column::from_cells("transaction_id", [2i64]),
                Column::from_cells("counterparty_id", [1i64]),
                Column::from_cells("payment_amount", [552548.62]),
                Column::from_cells("currency_id", [2i64]),
                Column::from_cells("payment_type_id", [1i64]),
                Column::from_cells("paid", [false]),
                Column::from_cells("payment_date", ["2022-11-04"]),
            ];
            columns.extend(audit(1));
            Snapshot::new(columns).and_then(|source| transform::fact_payment(&source))
        }
        other => panic!("no fixture for table `{other}`"),
    };

    match snapshot {
        Ok(snapshot) => snapshot,
        Err(err) => panic!("invalid fixture for `{table_name}`: {err}"),
    }
}

/// Columns of the warehouse table `table_name` matching `snapshot`, with their value type and
/// the SQL type the warehouse schema declares for them.
///
/// Columns carrying a timestamp rule are `date` columns and columns carrying a nullable
/// integer rule are `int4` columns, which is what makes reconciliation necessary.
pub fn warehouse_columns<'a>(
    table_name: &str,
    snapshot: &'a Snapshot,
) -> Vec<(&'a str, ColumnType, &'static str)> {
    let rules = registry::reconciliation_rules_of(table_name);

    snapshot
        .columns()
        .iter()
        .map(|column| {
            let rule = rules.iter().find(|rule| rule.column == column.name);
            let (column_type, sql_type) = match (rule.map(|rule| rule.target), column.column_type) {
                (Some(TargetType::Timestamp), _) => (ColumnType::Date, "date"),
                (Some(TargetType::NullableInt), _) => (ColumnType::Int, "int4"),
                (None, ColumnType::Bool) => (ColumnType::Bool, "bool"),
                (None, ColumnType::Int | ColumnType::NullableInt) => (ColumnType::Int, "int4"),
                (None, ColumnType::Float) => (ColumnType::Float, "numeric"),
                (None, ColumnType::Date) => (ColumnType::Date, "date"),
                (None, ColumnType::Time) => (ColumnType::Time, "time"),
                (None, ColumnType::Timestamp) => (ColumnType::Timestamp, "timestamp"),
                (None, ColumnType::Text | ColumnType::Unknown) => (ColumnType::Text, "varchar"),
            };

            (column.name.as_str(), column_type, sql_type)
        })
        .collect()
}

/// Empty warehouse table with the columns of `snapshot`, typed the way the warehouse schema
/// declares them.
pub fn warehouse_table_like(table_name: &str, snapshot: &Snapshot) -> Snapshot {
    empty_table(&warehouse_columns(table_name, snapshot))
}

/// Stores the fixture snapshot of each table and creates its empty warehouse table.
pub async fn seed_tables(
    store: &MemorySnapshotStore,
    warehouse: &MemoryWarehouse,
    tables: &[&str],
) {
    for table_name in tables {
        let snapshot = snapshot_for(table_name);
        warehouse
            .create_table(table_name, warehouse_table_like(table_name, &snapshot))
            .await;
        store
            .insert(TEST_BUCKET, &snapshot_key(table_name), snapshot)
            .await;
    }
}

/// Operational tables with a CSV extract fixture.
pub const EXTRACT_SOURCES: &[&str] = &[
    "staff",
    "department",
    "address",
    "design",
    "counterparty",
    "transaction",
    "payment_type",
    "currency",
    "sales_order",
    "purchase_order",
    "payment",
];

/// A small, consistent CSV extract of the operational table `source`.
///
/// # Panics
///
/// Panics if `source` is not one of [`EXTRACT_SOURCES`].
pub fn extract_csv(source: &str) -> &'static str {
    match source {
        "staff" => "\
staff_id,first_name,last_name,department_id,email_address,created_at,last_updated
1,Jeremie,Franey,2,jeremie.franey@terrifictotes.com,2022-11-03 14:20:51.563,2022-11-03 14:20:51.563
2,Deron,Beier,1,deron.beier@terrifictotes.com,2022-11-03 14:20:51.563,2022-11-03 14:20:51.563
3,Jeanette,Erdman,2,jeanette.erdman@terrifictotes.com,2022-11-03 14:20:51.563,2022-11-03 14:20:51.563
",
        "department" => "\
department_id,department_name,location,manager,created_at,last_updated
1,Sales,Manchester,Richard Roma,2022-11-03 14:20:49.962,2022-11-03 14:20:49.962
2,Purchasing,Leeds,Naomi Lapaglia,2022-11-03 14:20:49.962,2022-11-03 14:20:49.962
",
        "address" => "\
address_id,address_line_1,address_line_2,district,city,postal_code,country,phone,created_at,last_updated
1,6826 Herzog Via,,Avon,New Patienceburgh,28441,Turkey,1803 637401,2022-11-03 14:20:49.962,2022-11-03 14:20:49.962
2,179 Alexie Cliffs,Flat 2,,Aliso Viejo,99305-7380,San Marino,9621 880720,2022-11-03 14:20:49.962,2022-11-03 14:20:49.962
",
        "design" => "\
design_id,created_at,design_name,file_location,file_name,last_updated
8,2022-11-03 14:20:49.962,Wooden,/usr,wooden-20220717-npgz.json,2022-11-03 14:20:49.962
51,2023-01-12 18:50:09.935,Bronze,/private,bronze-20221024-4dds.json,2023-01-12 18:50:09.935
",
        "counterparty" => "\
counterparty_id,counterparty_legal_name,legal_address_id,commercial_contact,delivery_contact,created_at,last_updated
1,Fahey and Sons,2,Micheal Toy,Mrs. Lucy Runolfsdottir,2022-11-03 14:20:51.563,2022-11-03 14:20:51.563
2,Leannon Ltd,1,Melba Sanford,Jean Hane III,2022-11-03 14:20:51.563,2022-11-03 14:20:51.563
",
        "transaction" => "\
transaction_id,transaction_type,sales_order_id,purchase_order_id,created_at,last_updated
1,PURCHASE,,1,2022-11-03 14:20:52.186,2022-11-03 14:20:52.186
2,SALE,2,,2022-11-03 14:20:52.187,2022-11-03 14:20:52.187
",
        "payment_type" => "\
payment_type_id,payment_type_name,created_at,last_updated
1,SALES_RECEIPT,2022-11-03 14:20:49.962,2022-11-03 14:20:49.962
2,SALES_REFUND,2022-11-03 14:20:49.962,2022-11-03 14:20:49.962
",
        "currency" => "\
currency_id,currency_code,created_at,last_updated
1,GBP,2022-11-03 14:20:49.962,2022-11-03 14:20:49.962
2,USD,2022-11-03 14:20:49.962,2022-11-03 14:20:49.962
3,EUR,2022-11-03 14:20:49.962,2022-11-03 14:20:49.962
",
        "sales_order" => "\
sales_order_id,created_at,last_updated,design_id,staff_id,counterparty_id,units_sold,unit_price,currency_id,agreed_delivery_date,agreed_payment_date,agreed_delivery_location_id
2,2022-11-03 14:20:52.186,2022-11-03 14:20:52.186,8,1,1,42972,3.94,2,2022-11-07,2022-11-08,1
3,2022-11-03 14:20:52.188,2022-11-04 09:00:00.000,51,2,2,65839,2.91,3,2022-11-06,2022-11-07,2
",
        "purchase_order" => "\
purchase_order_id,created_at,last_updated,staff_id,counterparty_id,item_code,item_quantity,item_unit_price,currency_id,agreed_delivery_date,agreed_payment_date,agreed_delivery_location_id
1,2022-11-03 14:20:52.187,2022-11-03 14:20:52.187,3,2,ZDOI5EA,371,361.39,2,2022-11-09,2022-11-07,1
",
        "payment" => "\
payment_id,created_at,last_updated,transaction_id,counterparty_id,payment_amount,currency_id,payment_type_id,paid,payment_reference,company_ac_number,counterparty_ac_number,payment_date
2,2022-11-03 14:20:52.187,2022-11-03 14:20:52.187,2,1,552548.62,2,1,false,,67305075,31622269,2022-11-04
",
        other => panic!("no extract fixture for `{other}`"),
    }
}

/// Stores the CSV extract fixture of each source in the ingestion bucket.
pub async fn seed_extracts(store: &MemorySnapshotStore, sources: &[&str]) {
    for source in sources {
        store
            .insert_object(
                TEST_INGESTION_BUCKET,
                &extract_key(source),
                extract_csv(source),
            )
            .await;
    }
}

/// Creates an empty warehouse table for each stored snapshot in [`TEST_BUCKET`].
///
/// # Panics
///
/// Panics if the snapshot of one of `tables` cannot be fetched.
pub async fn create_tables_like_stored(
    store: &MemorySnapshotStore,
    warehouse: &MemoryWarehouse,
    tables: &[&str],
) {
    for table_name in tables {
        let snapshot = match store.fetch_snapshot(TEST_BUCKET, &snapshot_key(table_name)).await {
            Ok(snapshot) => snapshot,
            Err(err) => panic!("no stored snapshot for `{table_name}`: {err}"),
        };
        warehouse
            .create_table(table_name, warehouse_table_like(table_name, &snapshot))
            .await;
    }
}
