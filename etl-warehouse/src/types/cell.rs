use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

/// Smallest `f64` that does not fit in an `i64`, `2^63`.
const I64_UPPER_BOUND_F64: f64 = 9_223_372_036_854_775_808.0;

/// A single typed value of a snapshot or warehouse table.
///
/// Missing values are always [`Cell::Null`]. A floating point `NaN` is a value of its own and
/// is only turned into [`Cell::Null`] by an explicit reconciliation.
///
/// Equality and hashing follow value semantics rather than representation: integers of any
/// width are equal when their values are, an integral float equals the same integer, `NaN`
/// equals `NaN` and `-0.0` equals `0.0`. Values of different kinds are otherwise unequal, in
/// particular a date never equals a timestamp.
#[derive(Debug, Clone)]
pub enum Cell {
    Null,
    Bool(bool),
    I16(i16),
    I32(i32),
    I64(i64),
    F64(f64),
    String(String),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
}

/// Normalized form of a [`Cell`] used for equality and hashing.
#[derive(Debug, PartialEq, Eq, Hash)]
pub(crate) enum CellKey<'a> {
    Null,
    Bool(bool),
    Int(i64),
    Float(u64),
    NaN,
    Text(&'a str),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
}

impl Cell {
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    /// Name of the variant, used in error details.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Cell::Null => "null",
            Cell::Bool(_) => "bool",
            Cell::I16(_) => "i16",
            Cell::I32(_) => "i32",
            Cell::I64(_) => "i64",
            Cell::F64(_) => "f64",
            Cell::String(_) => "string",
            Cell::Date(_) => "date",
            Cell::Time(_) => "time",
            Cell::Timestamp(_) => "timestamp",
        }
    }

    /// Returns the integer value of integer cells, widened to `i64`.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Cell::I16(v) => Some(v.into()),
            Cell::I32(v) => Some(v.into()),
            Cell::I64(v) => Some(v),
            _ => None,
        }
    }

    pub(crate) fn key(&self) -> CellKey<'_> {
        match self {
            Cell::Null => CellKey::Null,
            Cell::Bool(v) => CellKey::Bool(*v),
            Cell::I16(v) => CellKey::Int((*v).into()),
            Cell::I32(v) => CellKey::Int((*v).into()),
            Cell::I64(v) => CellKey::Int(*v),
            Cell::F64(v) => float_key(*v),
            Cell::String(v) => CellKey::Text(v),
            Cell::Date(v) => CellKey::Date(*v),
            Cell::Time(v) => CellKey::Time(*v),
            Cell::Timestamp(v) => CellKey::Timestamp(*v),
        }
    }
}

fn float_key(value: f64) -> CellKey<'static> {
    if value.is_nan() {
        return CellKey::NaN;
    }

    if value.fract() == 0.0 && (-I64_UPPER_BOUND_F64..I64_UPPER_BOUND_F64).contains(&value) {
        // Integral and in range, so the cast is exact. `-0.0` lands on `0` here.
        return CellKey::Int(value as i64);
    }

    CellKey::Float(value.to_bits())
}

impl PartialEq for Cell {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Cell {}

impl Hash for Cell {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Null => f.write_str("NULL"),
            Cell::Bool(v) => write!(f, "{v}"),
            Cell::I16(v) => write!(f, "{v}"),
            Cell::I32(v) => write!(f, "{v}"),
            Cell::I64(v) => write!(f, "{v}"),
            Cell::F64(v) => write!(f, "{v}"),
            Cell::String(v) => f.write_str(v),
            Cell::Date(v) => write!(f, "{}", v.format("%Y-%m-%d")),
            Cell::Time(v) => write!(f, "{}", v.format("%H:%M:%S%.f")),
            Cell::Timestamp(v) => write!(f, "{}", v.format("%Y-%m-%d %H:%M:%S%.f")),
        }
    }
}

impl From<bool> for Cell {
    fn from(value: bool) -> Self {
        Cell::Bool(value)
    }
}

impl From<i16> for Cell {
    fn from(value: i16) -> Self {
        Cell::I16(value)
    }
}

impl From<i32> for Cell {
    fn from(value: i32) -> Self {
        Cell::I32(value)
    }
}

impl From<i64> for Cell {
    fn from(value: i64) -> Self {
        Cell::I64(value)
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::F64(value)
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::String(value.to_string())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Cell::String(value)
    }
}

impl From<NaiveDate> for Cell {
    fn from(value: NaiveDate) -> Self {
        Cell::Date(value)
    }
}

impl From<NaiveTime> for Cell {
    fn from(value: NaiveTime) -> Self {
        Cell::Time(value)
    }
}

impl From<NaiveDateTime> for Cell {
    fn from(value: NaiveDateTime) -> Self {
        Cell::Timestamp(value)
    }
}

impl<T: Into<Cell>> From<Option<T>> for Cell {
    fn from(value: Option<T>) -> Self {
        value.map_or(Cell::Null, Into::into)
    }
}
