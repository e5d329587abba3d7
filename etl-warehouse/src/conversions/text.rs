use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use tokio_postgres::types::Type;

use crate::bail;
use crate::conversions::bool::parse_bool;
use crate::error::{ErrorKind, EtlResult};
use crate::types::{Cell, ColumnType};

/// Comparison type of a warehouse column.
pub fn column_type_of(typ: &Type) -> ColumnType {
    match *typ {
        Type::BOOL => ColumnType::Bool,
        Type::INT2 | Type::INT4 | Type::INT8 => ColumnType::Int,
        Type::FLOAT4 | Type::FLOAT8 | Type::NUMERIC => ColumnType::Float,
        Type::DATE => ColumnType::Date,
        Type::TIME => ColumnType::Time,
        Type::TIMESTAMP | Type::TIMESTAMPTZ => ColumnType::Timestamp,
        _ => ColumnType::Text,
    }
}

/// Parses a value returned by the text protocol into a cell of the column's type.
///
/// `None` is SQL `NULL`. Types without a dedicated representation are kept as text.
pub fn parse_cell(typ: &Type, value: Option<&str>) -> EtlResult<Cell> {
    let Some(value) = value else {
        return Ok(Cell::Null);
    };

    let cell = match *typ {
        Type::BOOL => Cell::Bool(parse_bool(value)?),
        Type::INT2 => Cell::I16(parse_number(typ, value)?),
        Type::INT4 => Cell::I32(parse_number(typ, value)?),
        Type::INT8 => Cell::I64(parse_number(typ, value)?),
        Type::FLOAT4 | Type::FLOAT8 | Type::NUMERIC => Cell::F64(parse_float(typ, value)?),
        Type::DATE => Cell::Date(parse_chrono(typ, value, |v| {
            NaiveDate::parse_from_str(v, "%Y-%m-%d")
        })?),
        Type::TIME => Cell::Time(parse_chrono(typ, value, |v| {
            NaiveTime::parse_from_str(v, "%H:%M:%S%.f")
        })?),
        Type::TIMESTAMP => Cell::Timestamp(parse_chrono(typ, value, |v| {
            NaiveDateTime::parse_from_str(v, "%Y-%m-%d %H:%M:%S%.f")
        })?),
        Type::TIMESTAMPTZ => Cell::Timestamp(parse_chrono(typ, value, |v| {
            DateTime::parse_from_str(v, "%Y-%m-%d %H:%M:%S%.f%#z")
                .map(|timestamp| timestamp.naive_utc())
        })?),
        _ => Cell::String(value.to_string()),
    };

    Ok(cell)
}

fn parse_number<T: std::str::FromStr>(typ: &Type, value: &str) -> EtlResult<T> {
    match value.parse() {
        Ok(parsed) => Ok(parsed),
        Err(_) => bail!(
            ErrorKind::InvalidData,
            "Invalid numeric value",
            format!("`{value}` is not a valid {typ}")
        ),
    }
}

/// Postgres spells the special float values `NaN`, `Infinity` and `-Infinity`, all of which
/// Rust's float parser accepts.
fn parse_float(typ: &Type, value: &str) -> EtlResult<f64> {
    parse_number(typ, value)
}

fn parse_chrono<T, E>(
    typ: &Type,
    value: &str,
    parse: impl Fn(&str) -> Result<T, E>,
) -> EtlResult<T> {
    match parse(value) {
        Ok(parsed) => Ok(parsed),
        Err(_) => bail!(
            ErrorKind::InvalidData,
            "Invalid temporal value",
            format!("`{value}` is not a valid {typ}")
        ),
    }
}
