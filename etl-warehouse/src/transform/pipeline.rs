use std::collections::HashMap;

use chrono::NaiveDate;
use tracing::{error, info, warn};

use crate::bail;
use crate::error::{ErrorKind, EtlResult};
use crate::pipeline::snapshot_key;
use crate::registry;
use crate::report::{RunReport, TableOutcome};
use crate::storage::SnapshotStore;
use crate::transform::{
    DIM_DATE_END, DIM_DATE_START, dim_counterparty, dim_currency, dim_date, dim_design,
    dim_location, dim_payment_type, dim_staff, dim_transaction, fact_payment,
    fact_purchase_order, fact_sales_order,
};
use crate::types::Snapshot;

const AUDIT_COLUMNS: &[&str] = &["created_at", "last_updated"];

const ORDER_COLUMNS: &[&str] = &[
    "created_at",
    "last_updated",
    "agreed_delivery_date",
    "agreed_payment_date",
];

const PAYMENT_COLUMNS: &[&str] = &["created_at", "last_updated", "payment_date"];

/// Object key of the extract of the operational table `source`.
pub fn extract_key(source: &str) -> String {
    format!("{source}.csv")
}

/// Columns of the extract of `source` holding timestamps.
fn timestamp_columns_of(source: &str) -> &'static [&'static str] {
    match source {
        "sales_order" | "purchase_order" => ORDER_COLUMNS,
        "payment" => PAYMENT_COLUMNS,
        _ => AUDIT_COLUMNS,
    }
}

/// Operational tables the snapshot of `table_name` is built from.
fn sources_of(table_name: &str) -> &'static [&'static str] {
    match table_name {
        "dim_staff" => &["staff", "department"],
        "dim_location" => &["address"],
        "dim_design" => &["design"],
        "dim_currency" => &["currency"],
        "dim_counterparty" => &["counterparty", "address"],
        "dim_transaction" => &["transaction"],
        "dim_payment_type" => &["payment_type"],
        "fact_sales_order" => &["sales_order"],
        "fact_purchase_order" => &["purchase_order"],
        "fact_payment" => &["payment"],
        _ => &[],
    }
}

/// Per-table outcomes of a transform run with the number of rows written.
pub type TransformReport = RunReport<usize>;

type Extracts = HashMap<&'static str, EtlResult<Snapshot>>;

/// Reshapes the CSV extracts of the operational tables into one snapshot per warehouse table.
///
/// Every extract is fetched once. A table fails only when one of its own extracts cannot be
/// read or reshaped, or when its snapshot cannot be stored.
#[derive(Debug, Clone)]
pub struct TransformPipeline<S> {
    store: S,
    ingestion_bucket: String,
    processed_bucket: String,
    date_range: (NaiveDate, NaiveDate),
}

impl<S> TransformPipeline<S>
where
    S: SnapshotStore + Sync,
{
    pub fn new(
        store: S,
        ingestion_bucket: impl Into<String>,
        processed_bucket: impl Into<String>,
    ) -> Self {
        Self {
            store,
            ingestion_bucket: ingestion_bucket.into(),
            processed_bucket: processed_bucket.into(),
            date_range: (DIM_DATE_START, DIM_DATE_END),
        }
    }

    /// Limits the date dimension to the days from `start` to `end`, both included.
    pub fn with_date_range(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.date_range = (start, end);
        self
    }

    pub async fn run(&self) -> TransformReport {
        let tables = registry::table_names();

        info!(
            ingestion_bucket = %self.ingestion_bucket,
            processed_bucket = %self.processed_bucket,
            tables = tables.len(),
            "starting transform run"
        );

        let extracts = self.load_extracts(&tables).await;

        let mut outcomes = Vec::with_capacity(tables.len());
        for table_name in tables {
            let result = self.transform_table(table_name, &extracts).await;
            match &result {
                Ok(num_rows) => info!(table = table_name, num_rows, "table transformed"),
                Err(err) => error!(table = table_name, error = %err.summary(), "{}", err),
            }

            outcomes.push(TableOutcome {
                table_name: table_name.to_string(),
                result,
            });
        }

        let report = TransformReport::new(outcomes);
        info!(
            failed_tables = report.failed_tables().len(),
            "transform finished: {}", report
        );

        report
    }

    async fn load_extracts(&self, tables: &[&str]) -> Extracts {
        let mut extracts = Extracts::new();

        let sources = tables
            .iter()
            .flat_map(|table_name| sources_of(table_name).iter().copied());

        for source in sources {
            if extracts.contains_key(source) {
                continue;
            }

            let result = self
                .store
                .fetch_extract(
                    &self.ingestion_bucket,
                    &extract_key(source),
                    timestamp_columns_of(source),
                )
                .await;
            if let Err(err) = &result {
                warn!(source, error = %err.summary(), "extract unavailable");
            }

            extracts.insert(source, result);
        }

        extracts
    }

    async fn transform_table(&self, table_name: &str, extracts: &Extracts) -> EtlResult<usize> {
        let snapshot = self.build_table(table_name, extracts)?;

        self.store
            .put_snapshot(&self.processed_bucket, &snapshot_key(table_name), &snapshot)
            .await?;

        Ok(snapshot.num_rows())
    }

    fn build_table(&self, table_name: &str, extracts: &Extracts) -> EtlResult<Snapshot> {
        let extract = |source: &str| loaded_extract(extracts, source);

        match table_name {
            "dim_staff" => dim_staff(extract("staff")?, extract("department")?),
            "dim_location" => dim_location(extract("address")?),
            "dim_design" => dim_design(extract("design")?),
            "dim_date" => dim_date(self.date_range.0, self.date_range.1),
            "dim_currency" => dim_currency(extract("currency")?),
            "dim_counterparty" => dim_counterparty(extract("counterparty")?, extract("address")?),
            "dim_transaction" => dim_transaction(extract("transaction")?),
            "dim_payment_type" => dim_payment_type(extract("payment_type")?),
            "fact_sales_order" => fact_sales_order(extract("sales_order")?),
            "fact_purchase_order" => fact_purchase_order(extract("purchase_order")?),
            "fact_payment" => fact_payment(extract("payment")?),
            other => bail!(
                ErrorKind::ConfigError,
                "Table has no transform",
                format!("table `{other}`")
            ),
        }
    }
}

/// The loaded extract of `source`, or the error that prevented loading it.
fn loaded_extract<'a>(extracts: &'a Extracts, source: &str) -> EtlResult<&'a Snapshot> {
    match extracts.get(source) {
        Some(Ok(snapshot)) => Ok(snapshot),
        Some(Err(err)) => Err(err.clone()),
        None => bail!(
            ErrorKind::FetchError,
            "Extract was not loaded",
            format!("source `{source}`")
        ),
    }
}
