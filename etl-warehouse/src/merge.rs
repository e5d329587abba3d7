//! Merge of one table snapshot into its warehouse table.

use std::time::Duration;

use etl_config::shared::PopulatorConfig;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::apply::apply;
use crate::bail;
use crate::diff::diff;
use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;
use crate::reconcile::reconcile;
use crate::registry;
use crate::secrets::CredentialsProvider;
use crate::types::Snapshot;
use crate::warehouse::{WarehouseConnection, WarehouseConnector};

const DEFAULT_SECRET_NAME: &str = "warehouse_credentials";
const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_MERGE_TIMEOUT: Duration = Duration::from_secs(300);

/// Settings shared by every table merge of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeSettings {
    /// Secret holding the warehouse credentials.
    pub secret_name: String,
    /// Time allowed to open the connection.
    pub connection_timeout: Duration,
    /// Time allowed for reading the table state and writing the changes.
    pub merge_timeout: Duration,
}

impl Default for MergeSettings {
    fn default() -> Self {
        Self {
            secret_name: DEFAULT_SECRET_NAME.to_string(),
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            merge_timeout: DEFAULT_MERGE_TIMEOUT,
        }
    }
}

impl From<&PopulatorConfig> for MergeSettings {
    fn from(config: &PopulatorConfig) -> Self {
        Self {
            secret_name: config.warehouse_secret_name.clone(),
            connection_timeout: config.connection_timeout(),
            merge_timeout: config.merge_timeout(),
        }
    }
}

/// Row counts of a successful merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeSummary {
    pub new_rows: usize,
    pub updated_rows: usize,
    pub unchanged_rows: usize,
    /// Rows reported as inserted by the warehouse.
    pub inserted: u64,
    /// Rows reported as updated by the warehouse.
    pub updated: u64,
}

/// Converges warehouse tables to their snapshots.
///
/// Each call to [`TableMerger::merge`] reads the credentials, opens its own connection, reads the
/// full table state, reconciles and diffs it with the snapshot, writes the difference and
/// releases the connection, whatever the outcome.
#[derive(Debug, Clone)]
pub struct TableMerger<K, P> {
    connector: K,
    credentials: P,
    settings: MergeSettings,
}

impl<K, P> TableMerger<K, P>
where
    K: WarehouseConnector,
    P: CredentialsProvider,
{
    pub fn new(connector: K, credentials: P, settings: MergeSettings) -> Self {
        Self {
            connector,
            credentials,
            settings,
        }
    }

    pub fn settings(&self) -> &MergeSettings {
        &self.settings
    }

    /// Merges `snapshot` into `table_name`. Failures are logged with the table name.
    ///
    /// # Panics
    ///
    /// Panics if `table_name` is not a registered table.
    pub async fn merge(&self, table_name: &str, snapshot: Snapshot) -> EtlResult<MergeSummary> {
        let result = self.try_merge(table_name, snapshot).await;

        if let Err(err) = &result {
            error!(table = table_name, error = %err.summary(), "{}", err);
        }

        result
    }

    async fn try_merge(&self, table_name: &str, snapshot: Snapshot) -> EtlResult<MergeSummary> {
        // Fails before anything is read from the warehouse.
        let primary_key = registry::primary_key_of(table_name);

        let credentials = self
            .credentials
            .warehouse_credentials(&self.settings.secret_name)
            .await?;

        let connect = self.connector.connect(&credentials);
        let timeout = self.settings.connection_timeout;
        let mut connection = match tokio::time::timeout(timeout, connect).await {
            Ok(connection) => connection?,
            Err(_) => bail!(
                ErrorKind::TimeoutError,
                "Warehouse connection timed out",
                format!(
                    "{} connection not established within {timeout:?}",
                    K::name()
                )
            ),
        };

        let merge = merge_on_connection(&mut connection, table_name, primary_key, snapshot);
        let result = match tokio::time::timeout(self.settings.merge_timeout, merge).await {
            Ok(result) => result,
            Err(_) => Err(etl_error!(
                ErrorKind::TimeoutError,
                "Table merge timed out",
                format!("{table_name} not merged within {:?}", self.settings.merge_timeout)
            )),
        };

        match connection.close().await {
            Ok(()) => info!(table = table_name, "Connection closed successfully"),
            Err(err) => warn!(
                table = table_name,
                error = %err,
                "failed to close warehouse connection"
            ),
        }

        result
    }
}

async fn merge_on_connection<C>(
    connection: &mut C,
    table_name: &str,
    primary_key: &str,
    snapshot: Snapshot,
) -> EtlResult<MergeSummary>
where
    C: WarehouseConnection,
{
    let warehouse_state = connection.fetch_table_state(table_name).await?;
    let (snapshot, warehouse_state) = reconcile(snapshot, warehouse_state, table_name)?;
    let row_diff = diff(&snapshot, &warehouse_state, primary_key)?;

    let mut summary = MergeSummary {
        new_rows: row_diff.new_rows.len(),
        updated_rows: row_diff.updated_rows.len(),
        unchanged_rows: row_diff.unchanged,
        ..MergeSummary::default()
    };

    let outcome = apply(connection, table_name, row_diff).await?;
    summary.inserted = outcome.inserted;
    summary.updated = outcome.updated;

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::memory::StaticCredentialsProvider;
    use crate::types::{Column, ColumnType};
    use crate::warehouse::memory::{Fault, MemoryWarehouse, empty_table};

    const SECRET: &str = r#"{"host": "memory", "dbname": "wh", "user": "loader"}"#;

    fn merger(
        warehouse: &MemoryWarehouse,
    ) -> TableMerger<MemoryWarehouse, StaticCredentialsProvider> {
        TableMerger::new(
            warehouse.clone(),
            StaticCredentialsProvider::new().with_secret(DEFAULT_SECRET_NAME, SECRET),
            MergeSettings::default(),
        )
    }

    fn staff_snapshot() -> Snapshot {
        Snapshot::new(vec![
            Column::from_cells("staff_id", [1i64, 2]),
            Column::from_cells("first_name", ["Jeremie", "Deron"]),
        ])
        .unwrap()
    }

    async fn staff_warehouse() -> MemoryWarehouse {
        let warehouse = MemoryWarehouse::new();
        warehouse
            .create_table(
                "dim_staff",
                empty_table(&[
                    ("staff_id", ColumnType::Int, "int4"),
                    ("first_name", ColumnType::Text, "varchar"),
                ]),
            )
            .await;
        warehouse
    }

    #[tokio::test]
    async fn merges_into_empty_table() {
        let warehouse = staff_warehouse().await;

        let summary = merger(&warehouse).merge("dim_staff", staff_snapshot()).await.unwrap();

        assert_eq!(summary.new_rows, 2);
        assert_eq!(summary.inserted, 2);
        assert_eq!(warehouse.closed_connections().await, 1);
        assert_eq!(warehouse.open_connections().await, 0);
    }

    #[tokio::test]
    async fn credentials_failure_opens_no_connection() {
        let warehouse = staff_warehouse().await;
        let merger = TableMerger::new(
            warehouse.clone(),
            StaticCredentialsProvider::new(),
            MergeSettings::default(),
        );

        let err = merger.merge("dim_staff", staff_snapshot()).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::CredentialsError);
        assert_eq!(warehouse.closed_connections().await, 0);
    }

    #[tokio::test]
    async fn connection_failure_is_reported() {
        let warehouse = staff_warehouse().await;
        warehouse.inject_fault(Fault::Connect).await;

        let err = merger(&warehouse).merge("dim_staff", staff_snapshot()).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ConnectionError);
    }

    #[tokio::test]
    async fn shape_errors_release_the_connection() {
        let warehouse = staff_warehouse().await;
        let snapshot = Snapshot::new(vec![Column::from_cells("staff_id", [1i64])]).unwrap();

        let err = merger(&warehouse).merge("dim_staff", snapshot).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::DataShapeError);
        assert_eq!(warehouse.closed_connections().await, 1);
        assert!(warehouse.statements().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_merges_time_out() {
        let warehouse = staff_warehouse().await;
        warehouse
            .inject_fault(Fault::SlowFetchTableState(
                "dim_staff".to_string(),
                Duration::from_secs(600),
            ))
            .await;

        let err = merger(&warehouse).merge("dim_staff", staff_snapshot()).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::TimeoutError);
        assert_eq!(warehouse.closed_connections().await, 1);
    }
}
