use crate::error::EtlResult;
use crate::reconcile::cast_column;
use crate::registry::TargetType;
use crate::types::{Cell, Column, ColumnType, Snapshot};

/// Synthetic record ids `1..=num_rows`.
fn record_ids(name: &str, num_rows: usize) -> Column {
    Column::new(
        name,
        ColumnType::Int,
        (1..=num_rows as i64).map(Cell::I64).collect(),
    )
}

/// Splits a timestamp column into `{prefix}_date` and `{prefix}_time` columns.
fn split_timestamp(snapshot: &Snapshot, source: &str, prefix: &str) -> EtlResult<[Column; 2]> {
    let mut timestamps = snapshot.require_column(source)?.clone();
    cast_column(&mut timestamps, TargetType::Timestamp)?;

    let (dates, times): (Vec<Cell>, Vec<Cell>) = timestamps
        .cells
        .iter()
        .map(|cell| match cell {
            Cell::Timestamp(timestamp) => {
                (Cell::Date(timestamp.date()), Cell::Time(timestamp.time()))
            }
            _ => (Cell::Null, Cell::Null),
        })
        .unzip();

    Ok([
        Column::new(format!("{prefix}_date"), ColumnType::Date, dates),
        Column::new(format!("{prefix}_time"), ColumnType::Time, times),
    ])
}

/// Adds the record id and the audit date and time columns shared by every fact table.
fn with_fact_columns(source: &Snapshot, record_id: &str) -> EtlResult<Snapshot> {
    let [created_date, created_time] = split_timestamp(source, "created_at", "created")?;
    let [last_updated_date, last_updated_time] =
        split_timestamp(source, "last_updated", "last_updated")?;

    source
        .clone()
        .with_column(record_ids(record_id, source.num_rows()))?
        .with_column(created_date)?
        .with_column(created_time)?
        .with_column(last_updated_date)?
        .with_column(last_updated_time)
}

pub fn fact_sales_order(sales_order: &Snapshot) -> EtlResult<Snapshot> {
    let mut sales_staff_id = sales_order.require_column("staff_id")?.clone();
    sales_staff_id.name = "sales_staff_id".to_string();

    with_fact_columns(sales_order, "sales_record_id")?
        .with_column(sales_staff_id)?
        .select(&[
            "sales_record_id",
            "sales_order_id",
            "created_date",
            "created_time",
            "last_updated_date",
            "last_updated_time",
            "sales_staff_id",
            "counterparty_id",
            "units_sold",
            "unit_price",
            "currency_id",
            "design_id",
            "agreed_payment_date",
            "agreed_delivery_date",
            "agreed_delivery_location_id",
        ])
}

pub fn fact_purchase_order(purchase_order: &Snapshot) -> EtlResult<Snapshot> {
    with_fact_columns(purchase_order, "purchase_record_id")?.select(&[
        "purchase_record_id",
        "purchase_order_id",
        "created_date",
        "created_time",
        "last_updated_date",
        "last_updated_time",
        "staff_id",
        "counterparty_id",
        "item_code",
        "item_quantity",
        "item_unit_price",
        "currency_id",
        "agreed_delivery_date",
        "agreed_payment_date",
        "agreed_delivery_location_id",
    ])
}

pub fn fact_payment(payment: &Snapshot) -> EtlResult<Snapshot> {
    with_fact_columns(payment, "payment_record_id")?.select(&[
        "payment_record_id",
        "payment_id",
        "created_date",
        "created_time",
        "last_updated_date",
        "last_updated_time",
        "transaction_id",
        "counterparty_id",
        "payment_amount",
        "currency_id",
        "payment_type_id",
        "paid",
        "payment_date",
    ])
}
