//! Classification of snapshot rows against the current warehouse state.

use std::collections::HashSet;

use crate::bail;
use crate::error::{ErrorKind, EtlResult};
use crate::types::{Cell, CellKey, Column, ColumnDescriptor, Snapshot, TableRow};

/// Outcome of comparing a snapshot with the warehouse state.
///
/// Rows are laid out in the warehouse column order described by `columns`.
#[derive(Debug, Clone, PartialEq)]
pub struct RowDiff {
    pub columns: Vec<ColumnDescriptor>,
    pub primary_key: String,
    /// Rows whose primary key is absent from the warehouse.
    pub new_rows: Vec<TableRow>,
    /// Rows whose primary key exists in the warehouse with different values.
    pub updated_rows: Vec<TableRow>,
    /// Number of snapshot rows identical to a warehouse row.
    pub unchanged: usize,
}

impl RowDiff {
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|column| column.name.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.new_rows.is_empty() && self.updated_rows.is_empty()
    }
}

/// Splits `snapshot` rows into unchanged, new and updated rows.
///
/// Rows are compared on every warehouse column. A snapshot row matching some warehouse row on
/// all of them is unchanged. Otherwise the row is updated when its primary key exists in the
/// warehouse and new when it does not.
///
/// A snapshot without rows yields an empty diff. Snapshot columns unknown to the warehouse are
/// ignored. A warehouse column missing from the snapshot is a [`ErrorKind::DataShapeError`],
/// as are column pairs of incomparable types and null or repeated snapshot primary keys. When
/// the warehouse state has no columns at all, every row is new and the snapshot layout is used.
pub fn diff(
    snapshot: &Snapshot,
    warehouse_state: &Snapshot,
    primary_key: &str,
) -> EtlResult<RowDiff> {
    let layout = if warehouse_state.num_columns() == 0 {
        snapshot
    } else {
        warehouse_state
    };

    // Nothing to classify. Shape checks are skipped so that an empty object is not an error.
    if snapshot.num_rows() == 0 {
        return Ok(RowDiff {
            columns: layout.columns().iter().map(Column::descriptor).collect(),
            primary_key: primary_key.to_string(),
            new_rows: Vec::new(),
            updated_rows: Vec::new(),
            unchanged: 0,
        });
    }

    let pairs = pair_columns(snapshot, layout)?;
    let Some(key_position) = pairs
        .iter()
        .position(|(_, warehouse_column)| warehouse_column.name == primary_key)
    else {
        bail!(
            ErrorKind::DataShapeError,
            "Primary key column is missing",
            primary_key
        );
    };

    let snapshot_keys = &pairs[key_position].0.cells;
    check_primary_key(snapshot_keys, primary_key)?;

    let warehouse_rows: HashSet<Vec<CellKey<'_>>> = (0..warehouse_state.num_rows())
        .map(|index| {
            pairs
                .iter()
                .map(|(_, warehouse_column)| warehouse_column.cells[index].key())
                .collect()
        })
        .collect();
    let warehouse_keys: HashSet<CellKey<'_>> = match warehouse_state.column(primary_key) {
        Some(column) => column.cells.iter().map(Cell::key).collect(),
        None => HashSet::new(),
    };

    let mut result = RowDiff {
        columns: pairs.iter().map(|(_, column)| column.descriptor()).collect(),
        primary_key: primary_key.to_string(),
        new_rows: Vec::new(),
        updated_rows: Vec::new(),
        unchanged: 0,
    };

    for index in 0..snapshot.num_rows() {
        let row_key: Vec<CellKey<'_>> = pairs
            .iter()
            .map(|(snapshot_column, _)| snapshot_column.cells[index].key())
            .collect();

        if warehouse_rows.contains(&row_key) {
            result.unchanged += 1;
            continue;
        }

        let row = TableRow::new(
            pairs
                .iter()
                .map(|(snapshot_column, _)| snapshot_column.cells[index].clone())
                .collect(),
        );

        if warehouse_keys.contains(&snapshot_keys[index].key()) {
            result.updated_rows.push(row);
        } else {
            result.new_rows.push(row);
        }
    }

    Ok(result)
}

/// Pairs every layout column with the snapshot column of the same name.
fn pair_columns<'a>(
    snapshot: &'a Snapshot,
    layout: &'a Snapshot,
) -> EtlResult<Vec<(&'a Column, &'a Column)>> {
    layout
        .columns()
        .iter()
        .map(|warehouse_column| {
            let Some(snapshot_column) = snapshot.column(&warehouse_column.name) else {
                bail!(
                    ErrorKind::DataShapeError,
                    "Warehouse column missing from snapshot",
                    warehouse_column.name
                );
            };

            if !snapshot_column
                .column_type
                .is_comparable_with(warehouse_column.column_type)
            {
                bail!(
                    ErrorKind::DataShapeError,
                    "Column types cannot be compared",
                    format!(
                        "column `{}` is {} in the snapshot and {} in the warehouse",
                        warehouse_column.name,
                        snapshot_column.column_type,
                        warehouse_column.column_type
                    )
                );
            }

            Ok((snapshot_column, warehouse_column))
        })
        .collect()
}

fn check_primary_key(keys: &[Cell], primary_key: &str) -> EtlResult<()> {
    let mut seen = HashSet::with_capacity(keys.len());

    for key in keys {
        if key.is_null() {
            bail!(
                ErrorKind::DataShapeError,
                "Null primary key in snapshot",
                primary_key
            );
        }

        if !seen.insert(key) {
            bail!(
                ErrorKind::DataShapeError,
                "Duplicate primary key in snapshot",
                format!("{primary_key} = {key}")
            );
        }
    }

    Ok(())
}
