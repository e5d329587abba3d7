mod base;
pub mod memory;
pub mod s3;

pub use base::SnapshotStore;
