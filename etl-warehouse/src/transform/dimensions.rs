use chrono::{Datelike, NaiveDate};

use crate::error::EtlResult;
use crate::reconcile::cast_column;
use crate::registry::TargetType;
use crate::types::{Cell, Column, ColumnType, Snapshot};

/// First day of the default date dimension.
pub const DIM_DATE_START: NaiveDate = match NaiveDate::from_ymd_opt(2000, 1, 1) {
    Some(date) => date,
    None => panic!("invalid date"),
};

/// Last day of the default date dimension.
pub const DIM_DATE_END: NaiveDate = match NaiveDate::from_ymd_opt(2049, 12, 31) {
    Some(date) => date,
    None => panic!("invalid date"),
};

const LOCATION_COLUMNS: &[&str] = &[
    "location_id",
    "address_line_1",
    "address_line_2",
    "district",
    "city",
    "postal_code",
    "country",
    "phone",
];

/// Staff with their department name and location.
pub fn dim_staff(staff: &Snapshot, department: &Snapshot) -> EtlResult<Snapshot> {
    staff.left_join(department, "department_id")?.select(&[
        "staff_id",
        "first_name",
        "last_name",
        "department_name",
        "location",
        "email_address",
    ])
}

pub fn dim_location(address: &Snapshot) -> EtlResult<Snapshot> {
    address
        .clone()
        .rename(&[("address_id", "location_id")])?
        .select(LOCATION_COLUMNS)
}

pub fn dim_design(design: &Snapshot) -> EtlResult<Snapshot> {
    design.select(&["design_id", "design_name", "file_location", "file_name"])
}

/// One row per day from `start` to `end`, both included. Days of the week start at Monday = 0.
pub fn dim_date(start: NaiveDate, end: NaiveDate) -> EtlResult<Snapshot> {
    let dates: Vec<NaiveDate> = start.iter_days().take_while(|date| *date <= end).collect();

    let int_column = |name: &str, value: fn(&NaiveDate) -> i32| {
        Column::new(
            name,
            ColumnType::Int,
            dates.iter().map(|date| Cell::I32(value(date))).collect(),
        )
    };
    let text_column = |name: &str, format: &str| {
        Column::new(
            name,
            ColumnType::Text,
            dates
                .iter()
                .map(|date| Cell::String(date.format(format).to_string()))
                .collect(),
        )
    };

    Snapshot::new(vec![
        Column::new(
            "date_id",
            ColumnType::Timestamp,
            dates
                .iter()
                .map(|date| date.and_hms_opt(0, 0, 0).map_or(Cell::Null, Cell::Timestamp))
                .collect(),
        ),
        int_column("year", |date| date.year()),
        int_column("month", |date| date.month() as i32),
        int_column("day", |date| date.day() as i32),
        int_column("day_of_week", |date| date.weekday().num_days_from_monday() as i32),
        text_column("day_name", "%A"),
        text_column("month_name", "%B"),
        int_column("quarter", |date| date.month0() as i32 / 3 + 1),
    ])
}

/// Full name of an ISO 4217 currency code, for the currencies the business trades in.
pub fn currency_name(code: &str) -> Option<&'static str> {
    match code {
        "GBP" => Some("British Pound sterling"),
        "USD" => Some("United States dollar"),
        "EUR" => Some("Euro"),
        _ => None,
    }
}

pub fn dim_currency(currency: &Snapshot) -> EtlResult<Snapshot> {
    let codes = currency.require_column("currency_code")?;
    let names = Column::new(
        "currency_name",
        ColumnType::Text,
        codes
            .cells
            .iter()
            .map(|code| match code {
                Cell::String(code) => Cell::from(currency_name(code)),
                _ => Cell::Null,
            })
            .collect(),
    );

    currency
        .select(&["currency_id", "currency_code"])?
        .with_column(names)
}

/// Counterparties with their legal address.
pub fn dim_counterparty(counterparty: &Snapshot, address: &Snapshot) -> EtlResult<Snapshot> {
    let legal_address = dim_location(address)?.rename(&[("location_id", "legal_address_id")])?;

    counterparty
        .left_join(&legal_address, "legal_address_id")?
        .select(&[
            "counterparty_id",
            "counterparty_legal_name",
            "address_line_1",
            "address_line_2",
            "district",
            "city",
            "postal_code",
            "country",
            "phone",
        ])?
        .rename(&[
            ("address_line_1", "counterparty_legal_address_line_1"),
            ("address_line_2", "counterparty_legal_address_line_2"),
            ("district", "counterparty_legal_district"),
            ("city", "counterparty_legal_city"),
            ("postal_code", "counterparty_legal_postal_code"),
            ("country", "counterparty_legal_country"),
            ("phone", "counterparty_legal_phone_number"),
        ])
}

/// Transactions, with the optional order references as nullable integers.
pub fn dim_transaction(transaction: &Snapshot) -> EtlResult<Snapshot> {
    let mut columns = transaction
        .select(&[
            "transaction_id",
            "transaction_type",
            "sales_order_id",
            "purchase_order_id",
        ])?
        .into_columns();

    for column in columns.iter_mut().skip(2) {
        cast_column(column, TargetType::NullableInt)?;
    }

    Snapshot::new(columns)
}

pub fn dim_payment_type(payment_type: &Snapshot) -> EtlResult<Snapshot> {
    payment_type.select(&["payment_type_id", "payment_type_name"])
}
