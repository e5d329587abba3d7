use std::future::Future;

use crate::error::EtlResult;
use crate::types::Snapshot;

/// Object storage holding the CSV extracts of the operational tables and the per-table
/// snapshots the transform stage produces from them.
///
/// Objects are addressed by a bucket and a key. Implementations return
/// [`crate::error::ErrorKind::FetchError`] when an object or its bucket does not exist or
/// cannot be read, [`crate::error::ErrorKind::DataShapeError`] when its contents cannot be
/// decoded and [`crate::error::ErrorKind::UploadError`] when a snapshot cannot be stored.
pub trait SnapshotStore {
    /// Returns the name of the store.
    fn name() -> &'static str;

    /// Fetches and decodes the Parquet snapshot stored under `key` in `bucket`.
    fn fetch_snapshot(
        &self,
        bucket: &str,
        key: &str,
    ) -> impl Future<Output = EtlResult<Snapshot>> + Send;

    /// Fetches and decodes the CSV extract stored under `key` in `bucket`, parsing
    /// `timestamp_columns` as timestamps.
    fn fetch_extract(
        &self,
        bucket: &str,
        key: &str,
        timestamp_columns: &[&str],
    ) -> impl Future<Output = EtlResult<Snapshot>> + Send;

    /// Encodes `snapshot` as Parquet and stores it under `key` in `bucket`, replacing any
    /// previous object.
    fn put_snapshot(
        &self,
        bucket: &str,
        key: &str,
        snapshot: &Snapshot,
    ) -> impl Future<Output = EtlResult<()>> + Send;
}
