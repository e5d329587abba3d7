use crate::types::Cell;

/// One row of a table, with values in the column order of the table it is written to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableRow {
    values: Vec<Cell>,
}

impl TableRow {
    pub fn new(values: Vec<Cell>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[Cell] {
        &self.values
    }
}

impl From<Vec<Cell>> for TableRow {
    fn from(values: Vec<Cell>) -> Self {
        Self::new(values)
    }
}
