//! In-memory tabular data model shared by every stage of a merge.

mod cell;
mod column;
mod snapshot;
mod table_row;

pub(crate) use cell::CellKey;
pub use cell::Cell;
pub use column::{Column, ColumnDescriptor, ColumnType};
pub use snapshot::Snapshot;
pub use table_row::TableRow;
