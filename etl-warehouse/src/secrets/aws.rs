use aws_config::BehaviorVersion;
use aws_config::meta::region::RegionProviderChain;
use aws_sdk_secretsmanager::Client;
use aws_sdk_secretsmanager::operation::get_secret_value::GetSecretValueError;
use etl_config::shared::WarehouseCredentials;
use tracing::{error, info};

use crate::bail;
use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;
use crate::secrets::{CredentialsProvider, parse_credentials};

/// Reads credentials from AWS Secrets Manager.
///
/// The secret must hold a JSON string, binary secrets are rejected.
#[derive(Debug, Clone)]
pub struct SecretsManagerCredentialsProvider {
    client: Client,
}

impl SecretsManagerCredentialsProvider {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub async fn from_env() -> Self {
        let region_provider = RegionProviderChain::default_provider().or_else("unspecified");
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(region_provider)
            .load()
            .await;

        Self::new(Client::new(&config))
    }
}

impl CredentialsProvider for SecretsManagerCredentialsProvider {
    fn name() -> &'static str {
        "aws_secrets_manager"
    }

    async fn warehouse_credentials(&self, secret_name: &str) -> EtlResult<WarehouseCredentials> {
        let response = self
            .client
            .get_secret_value()
            .secret_id(secret_name)
            .send()
            .await
            .map_err(|err| {
                if matches!(
                    err.as_service_error(),
                    Some(GetSecretValueError::ResourceNotFoundException(_))
                ) {
                    error!("The requested secret {secret_name} was not found");
                }

                etl_error!(
                    ErrorKind::CredentialsError,
                    "Failed to read warehouse credentials",
                    format!("secret `{secret_name}`"),
                    source: err
                )
            })?;

        let Some(secret) = response.secret_string() else {
            bail!(
                ErrorKind::CredentialsError,
                "Warehouse credentials secret has no string value",
                format!("secret `{secret_name}`")
            );
        };

        let credentials = parse_credentials(secret_name, secret)?;
        info!(secret_name, host = %credentials.host, "read warehouse credentials");

        Ok(credentials)
    }
}
