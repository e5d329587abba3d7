use std::sync::LazyLock;

use secrecy::ExposeSecret;
use tokio_postgres::{Config as TokioPgConnectOptions, config::SslMode as TokioPgSslMode};

use crate::shared::WarehouseCredentials;

const WAREHOUSE_APPLICATION_NAME: &str = "etl_populator";

/// Session settings applied to every warehouse connection.
///
/// `datestyle` and `timezone` are pinned so that values returned through the text protocol
/// have a stable format.
pub static ETL_WAREHOUSE_OPTIONS: LazyLock<PgConnectionOptions> =
    LazyLock::new(|| PgConnectionOptions {
        datestyle: "ISO".to_string(),
        extra_float_digits: 3,
        client_encoding: "UTF8".to_string(),
        timezone: "UTC".to_string(),
        statement_timeout: 300_000,
        lock_timeout: 30_000,
        application_name: WAREHOUSE_APPLICATION_NAME.to_string(),
    });

#[derive(Debug, Clone)]
pub struct PgConnectionOptions {
    pub datestyle: String,
    pub extra_float_digits: i32,
    pub client_encoding: String,
    pub timezone: String,
    pub statement_timeout: u32,
    pub lock_timeout: u32,
    pub application_name: String,
}

impl PgConnectionOptions {
    pub fn to_options_string(&self) -> String {
        format!(
            "-c datestyle={} -c extra_float_digits={} -c client_encoding={} -c timezone={} -c statement_timeout={} -c lock_timeout={}",
            self.datestyle,
            self.extra_float_digits,
            self.client_encoding,
            self.timezone,
            self.statement_timeout,
            self.lock_timeout,
        )
    }
}

/// Converts connection settings into a driver specific connect configuration.
pub trait IntoConnectOptions<Output> {
    fn without_db(&self, options: Option<&PgConnectionOptions>) -> Output;
    fn with_db(&self, options: Option<&PgConnectionOptions>) -> Output;
}

impl IntoConnectOptions<TokioPgConnectOptions> for WarehouseCredentials {
    fn without_db(&self, options: Option<&PgConnectionOptions>) -> TokioPgConnectOptions {
        let mut config = TokioPgConnectOptions::new();
        config
            .host(&self.host)
            .port(self.port)
            .user(&self.user)
            .ssl_mode(TokioPgSslMode::Disable);

        if let Some(password) = &self.password {
            config.password(password.expose_secret());
        }

        if let Some(opts) = options {
            config
                .options(&opts.to_options_string())
                .application_name(&opts.application_name);
        }

        config
    }

    fn with_db(&self, options: Option<&PgConnectionOptions>) -> TokioPgConnectOptions {
        let mut config = self.without_db(options);
        config.dbname(&self.dbname);
        config
    }
}
