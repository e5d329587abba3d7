use std::future::Future;

use etl_config::shared::WarehouseCredentials;

use crate::error::EtlResult;
use crate::sql::WriteStatement;
use crate::types::Snapshot;

/// Opens connections to the warehouse.
///
/// Every table merge opens its own connection, which is never shared with another table.
pub trait WarehouseConnector {
    type Connection: WarehouseConnection + Send;

    /// Returns the name of the warehouse implementation.
    fn name() -> &'static str;

    /// Establishes a new connection.
    ///
    /// Failures are reported as [`crate::error::ErrorKind::ConnectionError`].
    fn connect(
        &self,
        credentials: &WarehouseCredentials,
    ) -> impl Future<Output = EtlResult<Self::Connection>> + Send;
}

/// A connection exclusively owned by one table merge.
pub trait WarehouseConnection {
    /// Reads the full current contents of `table_name` (`SELECT *`).
    ///
    /// Column names, order and types follow the warehouse schema and every column carries its
    /// warehouse type name.
    fn fetch_table_state(
        &mut self,
        table_name: &str,
    ) -> impl Future<Output = EtlResult<Snapshot>> + Send;

    /// Runs `statement` in its own transaction and commits it, returning the affected row count.
    ///
    /// When the statement fails the transaction is rolled back and nothing is committed.
    fn execute_in_transaction(
        &mut self,
        statement: &WriteStatement,
    ) -> impl Future<Output = EtlResult<u64>> + Send;

    /// Releases the connection.
    fn close(self) -> impl Future<Output = EtlResult<()>> + Send;
}
