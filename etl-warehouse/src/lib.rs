//! Merge/upsert of transformed snapshots into the dimensional warehouse.
//!
//! A population run takes one snapshot per warehouse table from object storage and merges it
//! into the table: rows whose primary key is unknown are inserted, rows whose key exists with
//! different values are updated, identical rows are left alone. Each table succeeds or fails
//! on its own and the run reports the outcome of every table.
//!
//! The run is assembled from three collaborators, each behind a trait:
//!
//! - [`storage::SnapshotStore`] fetches snapshots ([`storage::s3`] in production).
//! - [`secrets::CredentialsProvider`] resolves the warehouse credentials
//!   ([`secrets::aws`] in production).
//! - [`warehouse::WarehouseConnector`] opens warehouse connections
//!   ([`warehouse::postgres`] in production).
//!
//! In-memory implementations of the three live next to the production ones and back the
//! test suites.

pub mod apply;
pub mod conversions;
pub mod diff;
pub mod error;
mod macros;
pub mod merge;
pub mod pipeline;
pub mod reconcile;
pub mod registry;
pub mod report;
pub mod secrets;
pub mod sql;
pub mod storage;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod transform;
pub mod types;
pub mod warehouse;
