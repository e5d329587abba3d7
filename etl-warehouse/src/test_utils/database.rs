use etl_config::shared::{DEFAULT_WAREHOUSE_PORT, IntoConnectOptions, WarehouseCredentials};
use pg_escape::{quote_identifier, quote_literal};
use tokio_postgres::{Client, Config, NoTls};
use uuid::Uuid;

use crate::registry;
use crate::secrets::memory::StaticCredentialsProvider;
use crate::test_utils::fixtures::{TEST_SECRET_NAME, warehouse_columns};
use crate::types::Snapshot;

/// Connects to the server described by `config` and drives the connection in the background.
///
/// # Panics
///
/// Panics if the connection cannot be established.
async fn connect(config: Config) -> Client {
    let (client, connection) = config
        .connect(NoTls)
        .await
        .expect("Failed to connect to Postgres");

    tokio::spawn(async move {
        if let Err(err) = connection.await {
            eprintln!("warning: test database connection failed: {err}");
        }
    });

    client
}

/// A uniquely named database on the local Postgres server standing in for the warehouse.
///
/// The server is read from environment variables:
/// - `TESTS_DATABASE_HOST`: Postgres server hostname. Without it no database is created.
/// - `TESTS_DATABASE_PORT`: Postgres server port, `5432` when unset.
/// - `TESTS_DATABASE_USERNAME`: Database user, `postgres` when unset.
/// - `TESTS_DATABASE_PASSWORD`: Database password (optional).
pub struct TestWarehouse {
    credentials: WarehouseCredentials,
    secret: String,
    client: Client,
}

impl TestWarehouse {
    /// Creates a fresh database, or returns [`None`] when no test server is configured.
    ///
    /// # Panics
    ///
    /// Panics if the server is configured but the database cannot be created.
    pub async fn spawn() -> Option<Self> {
        let host = std::env::var("TESTS_DATABASE_HOST").ok()?;
        let port = match std::env::var("TESTS_DATABASE_PORT") {
            Ok(port) => port
                .parse::<u16>()
                .expect("TESTS_DATABASE_PORT must be a valid port number"),
            Err(_) => DEFAULT_WAREHOUSE_PORT,
        };
        let user =
            std::env::var("TESTS_DATABASE_USERNAME").unwrap_or_else(|_| "postgres".to_string());
        let password = std::env::var("TESTS_DATABASE_PASSWORD").ok();

        let secret = serde_json::json!({
            "host": host,
            "dbname": Uuid::new_v4().to_string(),
            "user": user,
            "password": password,
            "port": port,
        })
        .to_string();
        let credentials = WarehouseCredentials::from_secret_string(&secret)
            .expect("Failed to build test credentials");

        let server = connect(credentials.without_db(None)).await;
        server
            .execute(
                &format!("create database {}", quote_identifier(&credentials.dbname)),
                &[],
            )
            .await
            .expect("Failed to create database");

        let client = connect(credentials.with_db(None)).await;

        Some(Self {
            credentials,
            secret,
            client,
        })
    }

    /// Resolves [`TEST_SECRET_NAME`] to the credentials of this database.
    pub fn credentials_provider(&self) -> StaticCredentialsProvider {
        StaticCredentialsProvider::new().with_secret(TEST_SECRET_NAME, &self.secret)
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Creates the table `table_name` with the columns of `snapshot`, typed the way the warehouse
    /// schema declares them, keyed by the registered primary key.
    ///
    /// # Panics
    ///
    /// Panics if the table is not registered or cannot be created.
    pub async fn create_table_like(&self, table_name: &str, snapshot: &Snapshot) {
        let primary_key = registry::definition_of(table_name).primary_key;

        let mut definitions: Vec<String> = warehouse_columns(table_name, snapshot)
            .into_iter()
            .map(|(name, _, sql_type)| format!("{} {sql_type}", quote_identifier(name)))
            .collect();
        definitions.push(format!("primary key ({})", quote_identifier(primary_key)));

        self.client
            .execute(
                &format!(
                    "create table {} ({})",
                    quote_identifier(table_name),
                    definitions.join(", ")
                ),
                &[],
            )
            .await
            .expect("Failed to create table");
    }

    /// Terminates every connection to the database and drops it.
    ///
    /// Cleanup failures are reported and otherwise ignored.
    pub async fn drop_database(self) {
        drop(self.client);

        let server = connect(self.credentials.without_db(None)).await;
        let dbname = &self.credentials.dbname;

        if let Err(err) = server
            .execute(
                &format!(
                    "select pg_terminate_backend(pg_stat_activity.pid)
                    from pg_stat_activity
                    where pg_stat_activity.datname = {}
                    and pid <> pg_backend_pid()",
                    quote_literal(dbname)
                ),
                &[],
            )
            .await
        {
            eprintln!("warning: failed to terminate connections for database {dbname}: {err}");
        }

        if let Err(err) = server
            .execute(
                &format!("drop database if exists {}", quote_identifier(dbname)),
                &[],
            )
            .await
        {
            eprintln!("warning: failed to drop database {dbname}: {err}");
        }
    }
}
