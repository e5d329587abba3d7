use std::collections::HashMap;
use std::sync::Arc;

use etl_config::shared::WarehouseCredentials;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::EtlResult;
use crate::secrets::CredentialsProvider;

/// Keeps credentials for the lifetime of the process once they were read successfully.
///
/// Failed lookups are not cached, the next call asks the wrapped provider again. The lock is
/// held while the wrapped provider is queried so concurrent tables trigger a single lookup.
#[derive(Debug, Clone)]
pub struct CachedCredentialsProvider<P> {
    inner: P,
    cache: Arc<Mutex<HashMap<String, WarehouseCredentials>>>,
}

impl<P> CachedCredentialsProvider<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            cache: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<P> CredentialsProvider for CachedCredentialsProvider<P>
where
    P: CredentialsProvider + Send + Sync,
{
    fn name() -> &'static str {
        P::name()
    }

    async fn warehouse_credentials(&self, secret_name: &str) -> EtlResult<WarehouseCredentials> {
        let mut cache = self.cache.lock().await;
        if let Some(credentials) = cache.get(secret_name) {
            debug!(secret_name, "using cached warehouse credentials");
            return Ok(credentials.clone());
        }

        let credentials = self.inner.warehouse_credentials(secret_name).await?;
        cache.insert(secret_name.to_string(), credentials.clone());

        Ok(credentials)
    }
}
