//! Reshaping of operational tables into the dimensional schema.
//!
//! Each function takes the source snapshots of one warehouse table and returns the snapshot
//! the population run merges into it. A missing input column is a
//! [`crate::error::ErrorKind::DataShapeError`].
//!
//! [`TransformPipeline`] reads the CSV extracts of the operational tables and stores one
//! Parquet snapshot per warehouse table for the population run to merge.

mod dimensions;
mod facts;
mod pipeline;

pub use dimensions::{
    DIM_DATE_END, DIM_DATE_START, currency_name, dim_counterparty, dim_currency, dim_date,
    dim_design, dim_location, dim_payment_type, dim_staff, dim_transaction,
};
pub use facts::{fact_payment, fact_purchase_order, fact_sales_order};
pub use pipeline::{TransformPipeline, TransformReport, extract_key};
