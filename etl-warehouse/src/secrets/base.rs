use std::future::Future;

use etl_config::shared::WarehouseCredentials;

use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;

/// Source of warehouse connection credentials.
///
/// Any failure, including a secret that does not describe a connection, is reported as
/// [`ErrorKind::CredentialsError`].
pub trait CredentialsProvider {
    /// Returns the name of the provider.
    fn name() -> &'static str;

    /// Returns the credentials stored under `secret_name`.
    fn warehouse_credentials(
        &self,
        secret_name: &str,
    ) -> impl Future<Output = EtlResult<WarehouseCredentials>> + Send;
}

/// Parses a secret string into credentials.
pub fn parse_credentials(secret_name: &str, secret: &str) -> EtlResult<WarehouseCredentials> {
    WarehouseCredentials::from_secret_string(secret).map_err(|err| {
        // The serde message names the offending field but never echoes values.
        etl_error!(
            ErrorKind::CredentialsError,
            "Malformed warehouse credentials",
            format!("secret `{secret_name}`: {err}"),
            source: err
        )
    })
}
