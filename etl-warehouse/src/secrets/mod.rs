pub mod aws;
mod base;
pub mod cached;
pub mod memory;

pub use base::{CredentialsProvider, parse_credentials};
