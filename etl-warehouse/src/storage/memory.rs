use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::Mutex;

use crate::bail;
use crate::conversions::csv::decode_csv;
use crate::conversions::parquet::{decode_snapshot, encode_snapshot};
use crate::error::{ErrorKind, EtlResult};
use crate::storage::SnapshotStore;
use crate::types::Snapshot;

type ObjectAddress = (String, String);

#[derive(Debug, Default)]
struct Inner {
    snapshots: HashMap<ObjectAddress, Snapshot>,
    objects: HashMap<ObjectAddress, Bytes>,
    missing_buckets: HashSet<String>,
    failing_keys: HashSet<ObjectAddress>,
    fetches: Vec<ObjectAddress>,
}

impl Inner {
    /// Fails like the object store does for a missing bucket or an unreadable object.
    fn check_access(&self, bucket: &str, key: &str, kind: ErrorKind) -> EtlResult<()> {
        let description = match kind {
            ErrorKind::UploadError => "Failed to store snapshot",
            _ => "Failed to fetch object",
        };

        if self.missing_buckets.contains(bucket) {
            bail!(kind, description, format!("s3://{bucket}/{key}: NoSuchBucket"));
        }

        if self
            .failing_keys
            .contains(&(bucket.to_string(), key.to_string()))
        {
            bail!(kind, description, format!("s3://{bucket}/{key}: InternalError"));
        }

        Ok(())
    }
}

/// In-memory object store for tests and development.
///
/// Snapshots can be stored already decoded with [`MemorySnapshotStore::insert`], or as raw
/// objects with [`MemorySnapshotStore::insert_object`] and [`SnapshotStore::put_snapshot`],
/// in which case they go through the same codecs as in object storage.
#[derive(Debug, Clone, Default)]
pub struct MemorySnapshotStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, bucket: &str, key: &str, snapshot: Snapshot) {
        let mut inner = self.inner.lock().await;
        inner
            .snapshots
            .insert((bucket.to_string(), key.to_string()), snapshot);
    }

    /// Stores raw object contents, such as a CSV extract.
    pub async fn insert_object(&self, bucket: &str, key: &str, data: impl Into<Bytes>) {
        let mut inner = self.inner.lock().await;
        inner
            .objects
            .insert((bucket.to_string(), key.to_string()), data.into());
    }

    pub async fn object(&self, bucket: &str, key: &str) -> Option<Bytes> {
        let inner = self.inner.lock().await;
        inner
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    /// Keys of the raw objects in `bucket`, sorted.
    pub async fn object_keys(&self, bucket: &str) -> Vec<String> {
        let inner = self.inner.lock().await;
        let mut keys: Vec<String> = inner
            .objects
            .keys()
            .filter(|(object_bucket, _)| object_bucket == bucket)
            .map(|(_, key)| key.clone())
            .collect();
        keys.sort();

        keys
    }

    /// Makes every fetch or store of `key` fail, as an unreadable object would.
    pub async fn fail_key(&self, bucket: &str, key: &str) {
        let mut inner = self.inner.lock().await;
        inner
            .failing_keys
            .insert((bucket.to_string(), key.to_string()));
    }

    /// Makes every access to `bucket` fail, as a missing bucket would.
    pub async fn remove_bucket(&self, bucket: &str) {
        let mut inner = self.inner.lock().await;
        inner.missing_buckets.insert(bucket.to_string());
    }

    /// `(bucket, key)` pairs requested so far, in request order.
    pub async fn fetches(&self) -> Vec<(String, String)> {
        let inner = self.inner.lock().await;
        inner.fetches.clone()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn name() -> &'static str {
        "memory"
    }

    async fn fetch_snapshot(&self, bucket: &str, key: &str) -> EtlResult<Snapshot> {
        let mut inner = self.inner.lock().await;
        let address = (bucket.to_string(), key.to_string());
        inner.fetches.push(address.clone());
        inner.check_access(bucket, key, ErrorKind::FetchError)?;

        if let Some(snapshot) = inner.snapshots.get(&address) {
            return Ok(snapshot.clone());
        }

        match inner.objects.get(&address) {
            Some(data) => decode_snapshot(data.clone()),
            None => bail!(
                ErrorKind::FetchError,
                "Failed to fetch snapshot",
                format!("no object `{key}` in bucket `{bucket}`")
            ),
        }
    }

    async fn fetch_extract(
        &self,
        bucket: &str,
        key: &str,
        timestamp_columns: &[&str],
    ) -> EtlResult<Snapshot> {
        let mut inner = self.inner.lock().await;
        let address = (bucket.to_string(), key.to_string());
        inner.fetches.push(address.clone());
        inner.check_access(bucket, key, ErrorKind::FetchError)?;

        match inner.objects.get(&address) {
            Some(data) => decode_csv(data.clone(), timestamp_columns),
            None => bail!(
                ErrorKind::FetchError,
                "Failed to fetch extract",
                format!("no object `{key}` in bucket `{bucket}`")
            ),
        }
    }

    async fn put_snapshot(&self, bucket: &str, key: &str, snapshot: &Snapshot) -> EtlResult<()> {
        let mut inner = self.inner.lock().await;
        inner.check_access(bucket, key, ErrorKind::UploadError)?;
        let data = encode_snapshot(snapshot)?;

        let address = (bucket.to_string(), key.to_string());
        inner.snapshots.remove(&address);
        inner.objects.insert(address, data);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Column, ColumnType};

    #[tokio::test]
    async fn fetches_stored_snapshots() {
        let store = MemorySnapshotStore::new();
        let snapshot = Snapshot::new(vec![Column::from_cells("staff_id", [1i64])]).unwrap();
        store.insert("processed", "dim_staff.parquet", snapshot.clone()).await;

        assert_eq!(
            store.fetch_snapshot("processed", "dim_staff.parquet").await.unwrap(),
            snapshot
        );
        assert_eq!(
            store.fetches().await,
            vec![("processed".to_string(), "dim_staff.parquet".to_string())]
        );
    }

    #[tokio::test]
    async fn missing_objects_and_buckets_are_fetch_errors() {
        let store = MemorySnapshotStore::new();
        store
            .insert("processed", "dim_staff.parquet", Snapshot::empty())
            .await;

        let missing_key = store.fetch_snapshot("processed", "dim_date.parquet").await;
        store.fail_key("processed", "dim_design.parquet").await;
        let failing_key = store.fetch_snapshot("processed", "dim_design.parquet").await;
        store.remove_bucket("processed").await;
        let missing_bucket = store.fetch_snapshot("processed", "dim_staff.parquet").await;

        for result in [missing_key, failing_key, missing_bucket] {
            assert_eq!(result.unwrap_err().kind(), ErrorKind::FetchError);
        }
    }

    #[tokio::test]
    async fn stored_snapshots_are_encoded_objects() {
        let store = MemorySnapshotStore::new();
        let snapshot = Snapshot::new(vec![
            Column::from_cells("currency_id", [1i64, 2]),
            Column::from_cells("currency_code", ["GBP", "USD"]),
        ])
        .unwrap();

        store
            .put_snapshot("processed", "dim_currency.parquet", &snapshot)
            .await
            .unwrap();

        assert_eq!(store.object_keys("processed").await, vec!["dim_currency.parquet"]);
        assert_eq!(
            store.fetch_snapshot("processed", "dim_currency.parquet").await.unwrap(),
            snapshot
        );
    }

    #[tokio::test]
    async fn extracts_are_decoded_as_csv() {
        let store = MemorySnapshotStore::new();
        store
            .insert_object(
                "ingestion",
                "currency.csv",
                "currency_id,currency_code,created_at\n1,GBP,2022-11-03 14:20:49.962\n",
            )
            .await;

        let extract = store
            .fetch_extract("ingestion", "currency.csv", &["created_at"])
            .await
            .unwrap();

        assert_eq!(extract.num_rows(), 1);
        assert_eq!(
            extract.column("created_at").unwrap().column_type,
            ColumnType::Timestamp
        );
        assert_eq!(
            store
                .fetch_extract("ingestion", "staff.csv", &[])
                .await
                .unwrap_err()
                .kind(),
            ErrorKind::FetchError
        );
    }

    #[tokio::test]
    async fn stores_into_missing_buckets_fail() {
        let store = MemorySnapshotStore::new();
        store.remove_bucket("processed").await;

        let snapshot = Snapshot::new(vec![Column::from_cells("staff_id", [1i64])]).unwrap();

        let err = store
            .put_snapshot("processed", "dim_staff.parquet", &snapshot)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::UploadError);
    }
}
