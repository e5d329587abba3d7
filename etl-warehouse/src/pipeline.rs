//! One population run over the configured tables.

use etl_config::shared::PopulatorConfig;
use futures::StreamExt;
use tracing::{error, info};

use crate::merge::{MergeSettings, MergeSummary, TableMerger};
use crate::registry;
use crate::report::{RunReport, TableOutcome};
use crate::secrets::CredentialsProvider;
use crate::storage::SnapshotStore;
use crate::warehouse::WarehouseConnector;

/// Object key of the snapshot of `table_name`.
pub fn snapshot_key(table_name: &str) -> String {
    format!("{table_name}.parquet")
}

/// Per-table outcomes of a population run. Serializes as a map from table name to success flag.
pub type PopulationReport = RunReport<MergeSummary>;

/// Fetches each table's snapshot and merges it into the warehouse.
///
/// A failing table never stops the run. Tables are processed one after another unless more
/// concurrency is configured, in which case each table still uses its own connection and
/// the report keeps the configured table order.
#[derive(Debug, Clone)]
pub struct PopulationPipeline<S, K, P> {
    store: S,
    merger: TableMerger<K, P>,
    bucket: String,
    tables: Vec<String>,
    max_concurrent_tables: usize,
}

impl<S, K, P> PopulationPipeline<S, K, P>
where
    S: SnapshotStore + Sync,
    K: WarehouseConnector + Sync,
    P: CredentialsProvider + Sync,
{
    /// Builds a pipeline for a validated configuration.
    pub fn new(config: &PopulatorConfig, store: S, connector: K, credentials: P) -> Self {
        let tables = config
            .selected_tables(&registry::table_names())
            .into_iter()
            .map(str::to_string)
            .collect();

        Self {
            store,
            merger: TableMerger::new(connector, credentials, MergeSettings::from(config)),
            bucket: config.bucket.clone(),
            tables,
            max_concurrent_tables: usize::from(config.max_concurrent_tables.max(1)),
        }
    }

    pub fn tables(&self) -> &[String] {
        &self.tables
    }

    pub async fn run(&self) -> PopulationReport {
        info!(
            bucket = %self.bucket,
            tables = self.tables.len(),
            max_concurrent_tables = self.max_concurrent_tables,
            "starting population run"
        );

        let outcomes = futures::stream::iter(&self.tables)
            .map(|table_name| self.populate_table(table_name))
            .buffered(self.max_concurrent_tables)
            .collect::<Vec<_>>()
            .await;
        let report = PopulationReport::new(outcomes);

        info!(
            failed_tables = report.failed_tables().len(),
            "population finished: {}", report
        );

        report
    }

    async fn populate_table(&self, table_name: &str) -> TableOutcome<MergeSummary> {
        let key = snapshot_key(table_name);

        let result = match self.store.fetch_snapshot(&self.bucket, &key).await {
            Ok(snapshot) => self.merger.merge(table_name, snapshot).await,
            Err(err) => {
                error!(table = table_name, error = %err.summary(), "{}", err);
                Err(err)
            }
        };

        if let Ok(summary) = &result {
            info!(
                table = table_name,
                new_rows = summary.new_rows,
                updated_rows = summary.updated_rows,
                unchanged_rows = summary.unchanged_rows,
                "table populated"
            );
        }

        TableOutcome {
            table_name: table_name.to_string(),
            result,
        }
    }
}
