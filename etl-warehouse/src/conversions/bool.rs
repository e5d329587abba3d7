use crate::bail;
use crate::error::{ErrorKind, EtlResult};

/// Parses a boolean in the `t`/`f` form used by the Postgres text protocol.
pub fn parse_bool(s: &str) -> EtlResult<bool> {
    if s == "t" {
        Ok(true)
    } else if s == "f" {
        Ok(false)
    } else {
        bail!(
            ErrorKind::InvalidData,
            "Invalid boolean value",
            format!("Boolean value must be 't' or 'f' (received: {s})")
        );
    }
}
