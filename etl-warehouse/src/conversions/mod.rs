//! Conversions between wire and file representations and [`crate::types::Cell`] values.

pub mod bool;
pub mod csv;
pub mod parquet;
pub mod record_batch;
pub mod text;
