use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::Config;
use crate::shared::ValidationError;

const fn default_connection_timeout_ms() -> u64 {
    30_000
}

const fn default_merge_timeout_ms() -> u64 {
    300_000
}

const fn default_max_concurrent_tables() -> u16 {
    1
}

fn default_warehouse_secret_name() -> String {
    "warehouse_credentials".to_string()
}

/// Configuration of one population run.
///
/// Credentials are not part of this structure, they are resolved at runtime from the
/// secret named by [`PopulatorConfig::warehouse_secret_name`].
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PopulatorConfig {
    /// Bucket holding one `{table}.parquet` snapshot per warehouse table.
    pub bucket: String,
    /// Name of the secret holding the warehouse credentials.
    #[serde(default = "default_warehouse_secret_name")]
    pub warehouse_secret_name: String,
    /// Tables to populate. When absent every known table is populated in registry order.
    #[serde(default)]
    pub tables: Option<Vec<String>>,
    /// Time allowed to open a warehouse connection for one table.
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,
    /// Time allowed for reading, diffing and writing one table.
    #[serde(default = "default_merge_timeout_ms")]
    pub merge_timeout_ms: u64,
    /// Number of tables merged at once. `1` processes tables strictly one after another.
    #[serde(default = "default_max_concurrent_tables")]
    pub max_concurrent_tables: u16,
    /// Bucket holding the `{source}.csv` extracts the transform run reshapes into snapshots.
    #[serde(default)]
    pub ingestion_bucket: Option<String>,
    /// Custom object storage endpoint, addressed path style.
    #[serde(default)]
    pub s3_endpoint: Option<String>,
}

impl PopulatorConfig {
    /// Validates the configuration against the set of tables the warehouse supports.
    pub fn validate(&self, known_tables: &[&str]) -> Result<(), ValidationError> {
        if self.bucket.trim().is_empty() {
            return Err(ValidationError::EmptyBucket);
        }

        if self
            .ingestion_bucket
            .as_deref()
            .is_some_and(|bucket| bucket.trim().is_empty())
        {
            return Err(ValidationError::EmptyIngestionBucket);
        }

        if self.warehouse_secret_name.trim().is_empty() {
            return Err(ValidationError::EmptySecretName);
        }

        if self.max_concurrent_tables == 0 {
            return Err(ValidationError::MaxConcurrentTablesZero);
        }

        if self.connection_timeout_ms == 0 {
            return Err(ValidationError::TimeoutZero("connection_timeout_ms"));
        }

        if self.merge_timeout_ms == 0 {
            return Err(ValidationError::TimeoutZero("merge_timeout_ms"));
        }

        if let Some(tables) = &self.tables {
            if tables.is_empty() {
                return Err(ValidationError::EmptyTableList);
            }

            let mut seen = HashSet::with_capacity(tables.len());
            for table in tables {
                if !known_tables.contains(&table.as_str()) {
                    return Err(ValidationError::UnknownTable(table.clone()));
                }
                if !seen.insert(table.as_str()) {
                    return Err(ValidationError::DuplicateTable(table.clone()));
                }
            }
        }

        Ok(())
    }

    /// Tables to process, in processing order.
    pub fn selected_tables<'a>(&'a self, known_tables: &[&'a str]) -> Vec<&'a str> {
        match &self.tables {
            Some(tables) => tables.iter().map(String::as_str).collect(),
            None => known_tables.to_vec(),
        }
    }

    /// Bucket the transform run reads extracts from.
    pub fn ingestion_bucket(&self) -> Result<&str, ValidationError> {
        self.ingestion_bucket
            .as_deref()
            .ok_or(ValidationError::MissingIngestionBucket)
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    pub fn merge_timeout(&self) -> Duration {
        Duration::from_millis(self.merge_timeout_ms)
    }
}

impl Config for PopulatorConfig {
    const LIST_PARSE_KEYS: &'static [&'static str] = &["tables"];
}
