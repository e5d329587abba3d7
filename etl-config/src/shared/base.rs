use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// No bucket name was configured.
    #[error("`bucket` cannot be empty")]
    EmptyBucket,
    /// The transform run needs a bucket to read extracts from.
    #[error("`ingestion_bucket` is required to run the transform")]
    MissingIngestionBucket,
    /// An ingestion bucket was configured but its name is blank.
    #[error("`ingestion_bucket` cannot be empty")]
    EmptyIngestionBucket,
    /// No secret name was configured.
    #[error("`warehouse_secret_name` cannot be empty")]
    EmptySecretName,
    /// At least one table must be processed per run.
    #[error("`max_concurrent_tables` cannot be zero")]
    MaxConcurrentTablesZero,
    /// A zero timeout would fail every table.
    #[error("`{0}` cannot be zero")]
    TimeoutZero(&'static str),
    /// An explicit table list was given but it is empty.
    #[error("`tables` cannot be an empty list")]
    EmptyTableList,
    /// A configured table is not one the warehouse knows how to merge.
    #[error("unknown table `{0}` in `tables`")]
    UnknownTable(String),
    /// The same table appears twice in `tables`.
    #[error("table `{0}` is listed more than once in `tables`")]
    DuplicateTable(String),
}
