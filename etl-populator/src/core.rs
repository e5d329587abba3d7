use etl_config::shared::PopulatorConfig;
use etl_warehouse::pipeline::{PopulationPipeline, PopulationReport};
use etl_warehouse::secrets::aws::SecretsManagerCredentialsProvider;
use etl_warehouse::secrets::cached::CachedCredentialsProvider;
use etl_warehouse::storage::s3::S3SnapshotStore;
use etl_warehouse::transform::{TransformPipeline, TransformReport};
use etl_warehouse::warehouse::postgres::PgWarehouseConnector;
use tracing::info;

/// Runs one population pass against the production collaborators.
pub async fn start_populator_with_config(
    config: PopulatorConfig,
) -> anyhow::Result<PopulationReport> {
    info!("starting populator");
    log_config(&config);

    let store = S3SnapshotStore::from_env(config.s3_endpoint.as_deref()).await;
    let credentials =
        CachedCredentialsProvider::new(SecretsManagerCredentialsProvider::from_env().await);
    let connector = PgWarehouseConnector::new();

    let pipeline = PopulationPipeline::new(&config, store, connector, credentials);
    let report = pipeline.run().await;

    Ok(report)
}

/// Runs one transform pass from the ingestion bucket into the processed bucket.
pub async fn start_transform_with_config(
    config: PopulatorConfig,
) -> anyhow::Result<TransformReport> {
    info!("starting transform");
    log_config(&config);

    let ingestion_bucket = config.ingestion_bucket()?.to_string();
    let store = S3SnapshotStore::from_env(config.s3_endpoint.as_deref()).await;

    let pipeline = TransformPipeline::new(store, ingestion_bucket, config.bucket);
    let report = pipeline.run().await;

    Ok(report)
}

fn log_config(config: &PopulatorConfig) {
    info!(
        bucket = %config.bucket,
        ingestion_bucket = ?config.ingestion_bucket,
        secret_name = %config.warehouse_secret_name,
        tables = ?config.tables,
        connection_timeout_ms = config.connection_timeout_ms,
        merge_timeout_ms = config.merge_timeout_ms,
        max_concurrent_tables = config.max_concurrent_tables,
        s3_endpoint = ?config.s3_endpoint,
        "populator configuration"
    );
}
