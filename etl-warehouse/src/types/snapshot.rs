use std::collections::{HashMap, HashSet};

use crate::bail;
use crate::error::{ErrorKind, EtlResult};
use crate::types::{Cell, Column, ColumnType, TableRow};

/// Suffix given to right hand columns of a join whose name is already taken.
const JOIN_COLLISION_SUFFIX: &str = "_y";

/// Column oriented table.
///
/// All columns have the same length and column names are unique. Column order is kept for
/// display and for building rows, but columns are always looked up by name.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Snapshot {
    columns: Vec<Column>,
}

impl Snapshot {
    /// Creates a snapshot, checking that names are unique and lengths are equal.
    pub fn new(columns: Vec<Column>) -> EtlResult<Self> {
        let mut names = HashSet::with_capacity(columns.len());
        for column in &columns {
            if !names.insert(column.name.as_str()) {
                bail!(
                    ErrorKind::DataShapeError,
                    "Duplicate column name in snapshot",
                    column.name
                );
            }
        }

        if let Some(first) = columns.first() {
            if let Some(column) = columns.iter().find(|column| column.len() != first.len()) {
                bail!(
                    ErrorKind::DataShapeError,
                    "Snapshot columns have different lengths",
                    format!(
                        "column `{}` has {} values, column `{}` has {}",
                        first.name,
                        first.len(),
                        column.name,
                        column.len()
                    )
                );
            }
        }

        Ok(Self { columns })
    }

    /// A snapshot without columns or rows.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn num_rows(&self) -> usize {
        self.columns.first().map_or(0, Column::len)
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows() == 0
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn into_columns(self) -> Vec<Column> {
        self.columns
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|column| column.name.as_str())
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|column| column.name == name)
    }

    pub(crate) fn column_mut(&mut self, name: &str) -> Option<&mut Column> {
        self.columns.iter_mut().find(|column| column.name == name)
    }

    /// Like [`Snapshot::column`] but a missing column is a [`ErrorKind::DataShapeError`].
    pub fn require_column(&self, name: &str) -> EtlResult<&Column> {
        match self.column(name) {
            Some(column) => Ok(column),
            None => bail!(ErrorKind::DataShapeError, "Column missing from snapshot", name),
        }
    }

    /// Returns the values of row `index` in column order.
    pub fn row(&self, index: usize) -> Option<TableRow> {
        if index >= self.num_rows() {
            return None;
        }

        Some(TableRow::new(
            self.columns
                .iter()
                .map(|column| column.cells[index].clone())
                .collect(),
        ))
    }

    pub fn rows(&self) -> impl Iterator<Item = TableRow> + '_ {
        (0..self.num_rows()).filter_map(|index| self.row(index))
    }

    /// Keeps the named columns, in the given order.
    pub fn select(&self, names: &[&str]) -> EtlResult<Snapshot> {
        let columns = names
            .iter()
            .map(|name| self.require_column(name).cloned())
            .collect::<EtlResult<Vec<_>>>()?;

        Snapshot::new(columns)
    }

    /// Renames columns. Every `from` name must exist.
    pub fn rename(mut self, renames: &[(&str, &str)]) -> EtlResult<Snapshot> {
        for (from, to) in renames {
            match self.column_mut(from) {
                Some(column) => column.name = (*to).to_string(),
                None => bail!(ErrorKind::DataShapeError, "Column to rename is missing", from),
            }
        }

        Snapshot::new(self.columns)
    }

    /// Appends a column.
    pub fn with_column(mut self, column: Column) -> EtlResult<Snapshot> {
        if self.num_columns() > 0 && column.len() != self.num_rows() {
            bail!(
                ErrorKind::DataShapeError,
                "Added column has the wrong length",
                format!(
                    "column `{}` has {} values, snapshot has {} rows",
                    column.name,
                    column.len(),
                    self.num_rows()
                )
            );
        }

        self.columns.push(column);
        Snapshot::new(self.columns)
    }

    /// Left join with `right` on the column `on`, which both sides must have.
    ///
    /// Every left row is kept. Right columns other than `on` are appended, holding the values
    /// of the matching right row or nulls when there is none. Right column names that clash
    /// with a left column get a `_y` suffix. Null keys never match.
    pub fn left_join(&self, right: &Snapshot, on: &str) -> EtlResult<Snapshot> {
        let left_keys = self.require_column(on)?;
        let right_keys = right.require_column(on)?;

        let mut right_index: HashMap<&Cell, usize> = HashMap::with_capacity(right.num_rows());
        for (index, key) in right_keys.cells.iter().enumerate() {
            if key.is_null() {
                continue;
            }
            if right_index.insert(key, index).is_some() {
                bail!(
                    ErrorKind::DataShapeError,
                    "Join key is not unique in right table",
                    format!("column `{on}` has duplicate value {key}")
                );
            }
        }

        let matches: Vec<Option<usize>> = left_keys
            .cells
            .iter()
            .map(|key| right_index.get(key).copied())
            .collect();

        let mut columns = self.columns.clone();
        for right_column in right.columns.iter().filter(|column| column.name != on) {
            let name = if self.column(&right_column.name).is_some() {
                format!("{}{JOIN_COLLISION_SUFFIX}", right_column.name)
            } else {
                right_column.name.clone()
            };

            let cells = matches
                .iter()
                .map(|matched| match matched {
                    Some(index) => right_column.cells[*index].clone(),
                    None => Cell::Null,
                })
                .collect();

            let column_type = match right_column.column_type {
                ColumnType::Int if matches.iter().any(Option::is_none) => ColumnType::NullableInt,
                other => other,
            };

            columns.push(Column {
                name,
                column_type,
                sql_type: right_column.sql_type.clone(),
                cells,
            });
        }

        Snapshot::new(columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn staff() -> Snapshot {
        Snapshot::new(vec![
            Column::from_cells("staff_id", [1i64, 2, 3]),
            Column::from_cells("department_id", [Some(10i64), Some(20), None]),
        ])
        .unwrap()
    }

    fn departments() -> Snapshot {
        Snapshot::new(vec![
            Column::from_cells("department_id", [10i64, 30]),
            Column::from_cells("department_name", ["Sales", "Purchasing"]),
            Column::from_cells("staff_id", [100i64, 200]),
        ])
        .unwrap()
    }

    #[test]
    fn rejects_duplicate_names_and_ragged_columns() {
        let duplicate = Snapshot::new(vec![
            Column::from_cells("a", [1i64]),
            Column::from_cells("a", [2i64]),
        ]);
        let ragged = Snapshot::new(vec![
            Column::from_cells("a", [1i64]),
            Column::from_cells("b", [1i64, 2]),
        ]);

        assert_eq!(duplicate.unwrap_err().kind(), ErrorKind::DataShapeError);
        assert_eq!(ragged.unwrap_err().kind(), ErrorKind::DataShapeError);
    }

    #[test]
    fn rows_follow_column_order() {
        let snapshot = staff();

        assert_eq!(snapshot.num_rows(), 3);
        assert_eq!(
            snapshot.row(1).unwrap().values(),
            &[Cell::I64(2), Cell::I64(20)]
        );
        assert!(snapshot.row(3).is_none());
        assert_eq!(snapshot.rows().count(), 3);
    }

    #[test]
    fn select_and_rename() {
        let snapshot = staff()
            .select(&["department_id", "staff_id"])
            .unwrap()
            .rename(&[("staff_id", "id")])
            .unwrap();

        assert_eq!(snapshot.column_names().collect::<Vec<_>>(), vec!["department_id", "id"]);
        assert!(staff().select(&["missing"]).is_err());
        assert!(staff().rename(&[("missing", "x")]).is_err());
    }

    #[test]
    fn left_join_keeps_every_left_row() {
        let joined = staff().left_join(&departments(), "department_id").unwrap();

        assert_eq!(
            joined.column_names().collect::<Vec<_>>(),
            vec!["staff_id", "department_id", "department_name", "staff_id_y"]
        );
        assert_eq!(
            joined.column("department_name").unwrap().cells,
            vec![Cell::from("Sales"), Cell::Null, Cell::Null]
        );
        assert_eq!(
            joined.column("staff_id_y").unwrap().column_type,
            ColumnType::NullableInt
        );
    }

    #[test]
    fn with_column_checks_length() {
        let snapshot = staff();

        assert!(snapshot.clone().with_column(Column::from_cells("x", [1i64])).is_err());
        assert_eq!(
            snapshot
                .with_column(Column::from_cells("x", [1i64, 2, 3]))
                .unwrap()
                .num_columns(),
            3
        );
    }

    #[test]
    fn empty_snapshot_has_no_rows() {
        let snapshot = Snapshot::empty();

        assert!(snapshot.is_empty());
        assert_eq!(snapshot.rows().count(), 0);
    }
}
