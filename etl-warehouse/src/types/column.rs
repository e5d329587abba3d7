use std::fmt;

use crate::types::Cell;

/// Declared element type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Bool,
    Int,
    Float,
    Text,
    Date,
    Time,
    Timestamp,
    /// Integer column whose missing values are [`Cell::Null`], stored as `i64`.
    NullableInt,
    /// Type could not be determined, e.g. a column that only holds nulls.
    Unknown,
}

impl ColumnType {
    /// Whether values of the two types can be compared for equality at all.
    ///
    /// Numeric types are mutually comparable. Dates and timestamps are not, which is why the
    /// temporal columns of some tables need a reconciliation rule.
    pub fn is_comparable_with(self, other: ColumnType) -> bool {
        use ColumnType::*;

        match (self, other) {
            (Unknown, _) | (_, Unknown) => true,
            (Int | Float | NullableInt, Int | Float | NullableInt) => true,
            (a, b) => a == b,
        }
    }

    /// Infers the type of a column from its first non null value.
    pub fn infer<'a>(cells: impl IntoIterator<Item = &'a Cell>) -> ColumnType {
        cells
            .into_iter()
            .find(|cell| !cell.is_null())
            .map_or(ColumnType::Unknown, |cell| match cell {
                Cell::Null => ColumnType::Unknown,
                Cell::Bool(_) => ColumnType::Bool,
                Cell::I16(_) | Cell::I32(_) | Cell::I64(_) => ColumnType::Int,
                Cell::F64(_) => ColumnType::Float,
                Cell::String(_) => ColumnType::Text,
                Cell::Date(_) => ColumnType::Date,
                Cell::Time(_) => ColumnType::Time,
                Cell::Timestamp(_) => ColumnType::Timestamp,
            })
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::Bool => "bool",
            ColumnType::Int => "int",
            ColumnType::Float => "float",
            ColumnType::Text => "text",
            ColumnType::Date => "date",
            ColumnType::Time => "time",
            ColumnType::Timestamp => "timestamp",
            ColumnType::NullableInt => "nullable int",
            ColumnType::Unknown => "unknown",
        };

        f.write_str(name)
    }
}

/// A named, typed column of cells.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
    /// Warehouse type name, e.g. `int4` or `timestamp`. Only set on warehouse state columns.
    pub sql_type: Option<String>,
    pub cells: Vec<Cell>,
}

impl Column {
    pub fn new(name: impl Into<String>, column_type: ColumnType, cells: Vec<Cell>) -> Self {
        Self {
            name: name.into(),
            column_type,
            sql_type: None,
            cells,
        }
    }

    /// Builds a column whose type is inferred from its values.
    pub fn from_cells<C: Into<Cell>>(
        name: impl Into<String>,
        cells: impl IntoIterator<Item = C>,
    ) -> Self {
        let cells: Vec<Cell> = cells.into_iter().map(Into::into).collect();
        let column_type = ColumnType::infer(&cells);

        Self::new(name, column_type, cells)
    }

    pub fn with_sql_type(mut self, sql_type: impl Into<String>) -> Self {
        self.sql_type = Some(sql_type.into());
        self
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Name, type and warehouse type of the column, without its values.
    pub fn descriptor(&self) -> ColumnDescriptor {
        ColumnDescriptor {
            name: self.name.clone(),
            column_type: self.column_type,
            sql_type: self.sql_type.clone(),
        }
    }
}

/// Shape of a column without its values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub name: String,
    pub column_type: ColumnType,
    pub sql_type: Option<String>,
}
