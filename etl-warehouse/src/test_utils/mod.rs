//! Test doubles and fixtures for population tests.
//!
//! - [`database`] creates a throwaway Postgres database standing in for the warehouse.
//! - [`fixtures`] builds table snapshots, matching warehouse tables and run configurations.
//! - [`logs`] captures emitted events so tests can assert on the operational log lines.
//!
//! The collaborator doubles themselves live next to their production counterparts:
//! [`crate::warehouse::memory::MemoryWarehouse`], [`crate::storage::memory::MemorySnapshotStore`]
//! and [`crate::secrets::memory::StaticCredentialsProvider`].

pub mod database;
pub mod fixtures;
pub mod logs;
