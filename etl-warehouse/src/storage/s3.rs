use aws_config::BehaviorVersion;
use aws_config::meta::region::RegionProviderChain;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::ProvideErrorMetadata;
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use tracing::{debug, error, info};

use crate::conversions::csv::decode_csv;
use crate::conversions::parquet::{decode_snapshot, encode_snapshot};
use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;
use crate::storage::SnapshotStore;
use crate::types::Snapshot;

/// Reads extracts and reads and writes Parquet snapshots in S3 or an S3 compatible object
/// store.
#[derive(Debug, Clone)]
pub struct S3SnapshotStore {
    client: Client,
}

impl S3SnapshotStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Builds a client from the ambient AWS configuration.
    ///
    /// With a custom `endpoint`, path style addressing is used so that local object stores
    /// can be targeted.
    pub async fn from_env(endpoint: Option<&str>) -> Self {
        // The SDK refuses to build a client without a region, even with a custom endpoint.
        let region_provider = RegionProviderChain::default_provider().or_else("unspecified");
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(region_provider)
            .load()
            .await;

        let s3_config = match endpoint {
            Some(endpoint) => aws_sdk_s3::config::Builder::from(&sdk_config)
                .endpoint_url(endpoint)
                .force_path_style(true)
                .build(),
            None => aws_sdk_s3::config::Builder::from(&sdk_config).build(),
        };

        info!(endpoint, "initialized s3 snapshot store");

        Self::new(Client::from_conf(s3_config))
    }
}

impl S3SnapshotStore {
    /// Downloads an object. `description` names what is fetched in the returned error.
    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        description: &'static str,
    ) -> EtlResult<Bytes> {
        let output = match self.client.get_object().bucket(bucket).key(key).send().await {
            Ok(output) => output,
            Err(err) => {
                let detail = match err.as_service_error() {
                    Some(GetObjectError::NoSuchKey(_)) => {
                        error!(bucket, key, "Key not found in bucket");
                        format!("no object `{key}` in bucket `{bucket}`")
                    }
                    Some(service_error) if service_error.code() == Some("NoSuchBucket") => {
                        error!(bucket, "Bucket does not exist");
                        format!("bucket `{bucket}` does not exist")
                    }
                    Some(service_error) => format!(
                        "s3://{bucket}/{key}: {}",
                        service_error.code().unwrap_or("unknown error")
                    ),
                    None => format!("s3://{bucket}/{key}"),
                };

                return Err(etl_error!(
                    ErrorKind::FetchError,
                    description,
                    detail,
                    source: err
                ));
            }
        };

        let data = output.body.collect().await.map_err(|err| {
            etl_error!(
                ErrorKind::FetchError,
                description,
                format!("s3://{bucket}/{key}"),
                source: err
            )
        })?;
        let data = data.into_bytes();
        debug!(bucket, key, size = data.len(), "downloaded object");

        Ok(data)
    }
}

impl SnapshotStore for S3SnapshotStore {
    fn name() -> &'static str {
        "s3"
    }

    async fn fetch_snapshot(&self, bucket: &str, key: &str) -> EtlResult<Snapshot> {
        let data = self.get_object(bucket, key, "Failed to fetch snapshot").await?;

        decode_snapshot(data)
    }

    async fn fetch_extract(
        &self,
        bucket: &str,
        key: &str,
        timestamp_columns: &[&str],
    ) -> EtlResult<Snapshot> {
        let data = self.get_object(bucket, key, "Failed to fetch extract").await?;

        decode_csv(data, timestamp_columns)
    }

    async fn put_snapshot(&self, bucket: &str, key: &str, snapshot: &Snapshot) -> EtlResult<()> {
        let data = encode_snapshot(snapshot)?;
        let size = data.len();

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|err| {
                let detail = match err.as_service_error() {
                    Some(service_error) => format!(
                        "s3://{bucket}/{key}: {}",
                        service_error.code().unwrap_or("unknown error")
                    ),
                    None => format!("s3://{bucket}/{key}"),
                };

                etl_error!(
                    ErrorKind::UploadError,
                    "Failed to store snapshot",
                    detail,
                    source: err
                )
            })?;

        info!(bucket, key, size, "stored snapshot");

        Ok(())
    }
}
