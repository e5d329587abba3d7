//! Configuration types shared by the populator binary and the warehouse library.

mod base;
mod connection;
mod populator;
mod warehouse;

pub use base::ValidationError;
pub use connection::{ETL_WAREHOUSE_OPTIONS, IntoConnectOptions, PgConnectionOptions};
pub use populator::PopulatorConfig;
pub use warehouse::{DEFAULT_WAREHOUSE_PORT, WarehouseCredentials};
