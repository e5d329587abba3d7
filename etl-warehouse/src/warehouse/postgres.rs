use etl_config::shared::{ETL_WAREHOUSE_OPTIONS, IntoConnectOptions, WarehouseCredentials};
use pg_escape::quote_identifier;
use tokio_postgres::tls::MakeTlsConnect;
use tokio_postgres::{Client, Config, Connection, NoTls, SimpleQueryMessage, Socket};
use tracing::{Instrument, debug, error, info};

use crate::conversions::text::{column_type_of, parse_cell};
use crate::error::{ErrorKind, EtlError, EtlResult};
use crate::sql::WriteStatement;
use crate::types::{Column, Snapshot};
use crate::warehouse::{WarehouseConnection, WarehouseConnector};

/// Spawns a background task driving a Postgres connection until it terminates.
fn spawn_postgres_connection<T>(connection: Connection<Socket, T::Stream>)
where
    T: MakeTlsConnect<Socket>,
    T::Stream: Send + 'static,
{
    let span = tracing::Span::current();
    let task = async move {
        let result = connection.await;

        match result {
            Err(err) => error!("an error occurred during the warehouse connection: {}", err),
            Ok(()) => info!("warehouse connection terminated successfully"),
        }
    }
    .instrument(span);

    // The connection ends when the `Client` that owns it is dropped.
    tokio::spawn(task);
}

/// Connects to a Postgres compatible warehouse.
#[derive(Debug, Clone, Default)]
pub struct PgWarehouseConnector;

impl PgWarehouseConnector {
    pub fn new() -> Self {
        Self
    }
}

impl WarehouseConnector for PgWarehouseConnector {
    type Connection = PgWarehouseConnection;

    fn name() -> &'static str {
        "postgres"
    }

    async fn connect(&self, credentials: &WarehouseCredentials) -> EtlResult<Self::Connection> {
        let config: Config = credentials.with_db(Some(&ETL_WAREHOUSE_OPTIONS));

        let (client, connection) = config
            .connect(NoTls)
            .await
            .map_err(|err| EtlError::from(err).with_kind(ErrorKind::ConnectionError))?;
        spawn_postgres_connection::<NoTls>(connection);

        info!(
            host = %credentials.host,
            dbname = %credentials.dbname,
            "connected to warehouse"
        );

        Ok(PgWarehouseConnection { client })
    }
}

/// A single warehouse session.
#[derive(Debug)]
pub struct PgWarehouseConnection {
    client: Client,
}

impl WarehouseConnection for PgWarehouseConnection {
    /// Reads the whole table.
    ///
    /// Column names and types come from the description of a prepared `SELECT *`. Rows are read
    /// through the simple query protocol and parsed according to those types, which keeps every
    /// warehouse type readable, including ones without a binary decoder.
    async fn fetch_table_state(&mut self, table_name: &str) -> EtlResult<Snapshot> {
        let query = format!("SELECT * FROM {}", quote_identifier(table_name));

        let statement = self.client.prepare(&query).await?;
        let column_types: Vec<_> = statement
            .columns()
            .iter()
            .map(|column| column.type_().clone())
            .collect();
        let mut columns: Vec<Column> = statement
            .columns()
            .iter()
            .map(|column| {
                Column::new(column.name(), column_type_of(column.type_()), Vec::new())
                    .with_sql_type(column.type_().name())
            })
            .collect();

        for message in self.client.simple_query(&query).await? {
            if let SimpleQueryMessage::Row(row) = message {
                for (index, column) in columns.iter_mut().enumerate() {
                    let value = row.try_get(index)?;
                    column.cells.push(parse_cell(&column_types[index], value)?);
                }
            }
        }

        let snapshot = Snapshot::new(columns)?;
        debug!(
            table = table_name,
            num_rows = snapshot.num_rows(),
            "read warehouse table state"
        );

        Ok(snapshot)
    }

    async fn execute_in_transaction(&mut self, statement: &WriteStatement) -> EtlResult<u64> {
        let transaction = self.client.transaction().await?;
        let affected = transaction.execute(statement.sql(), &[]).await?;
        transaction.commit().await?;

        Ok(affected)
    }

    async fn close(self) -> EtlResult<()> {
        // Dropping the client terminates the connection task.
        drop(self.client);

        Ok(())
    }
}
