use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use etl_config::shared::WarehouseCredentials;

use crate::bail;
use crate::error::{ErrorKind, EtlResult};
use crate::secrets::{CredentialsProvider, parse_credentials};

/// Serves fixed secret strings, for tests and local runs.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentialsProvider {
    secrets: HashMap<String, String>,
    lookups: Arc<AtomicUsize>,
}

impl StaticCredentialsProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a secret holding the raw string, which need not be valid credentials.
    pub fn with_secret(mut self, secret_name: &str, secret: &str) -> Self {
        self.secrets
            .insert(secret_name.to_string(), secret.to_string());
        self
    }

    /// Number of lookups served so far, shared between clones.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

impl CredentialsProvider for StaticCredentialsProvider {
    fn name() -> &'static str {
        "static"
    }

    async fn warehouse_credentials(&self, secret_name: &str) -> EtlResult<WarehouseCredentials> {
        self.lookups.fetch_add(1, Ordering::SeqCst);

        match self.secrets.get(secret_name) {
            Some(secret) => parse_credentials(secret_name, secret),
            None => bail!(
                ErrorKind::CredentialsError,
                "Failed to read warehouse credentials",
                format!("secret `{secret_name}` does not exist")
            ),
        }
    }
}
