//! Brings the snapshot and the warehouse state to a common representation before diffing.

use chrono::{NaiveDate, NaiveDateTime, SubsecRound};
use tracing::debug;

use crate::bail;
use crate::error::{ErrorKind, EtlResult};
use crate::registry::{self, ReconciliationRule, TargetType};
use crate::types::{Cell, Column, Snapshot};

/// Date-time formats accepted when a text value is cast to a timestamp.
const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Timestamps are compared and written with microsecond precision.
const TIMESTAMP_SUBSEC_DIGITS: u16 = 6;

/// Applies the reconciliation rules of `table_name` to both tables.
///
/// A rule is applied to each table that has the column. The primary key and the other columns
/// are left untouched.
pub fn reconcile(
    snapshot: Snapshot,
    warehouse_state: Snapshot,
    table_name: &str,
) -> EtlResult<(Snapshot, Snapshot)> {
    let rules = registry::reconciliation_rules_of(table_name);

    let snapshot = apply_rules(snapshot, rules)?;
    let warehouse_state = apply_rules(warehouse_state, rules)?;

    Ok((snapshot, warehouse_state))
}

fn apply_rules(mut table: Snapshot, rules: &[ReconciliationRule]) -> EtlResult<Snapshot> {
    for rule in rules {
        let Some(column) = table.column_mut(rule.column) else {
            continue;
        };

        debug!(column = rule.column, target = ?rule.target, "reconciling column");
        cast_column(column, rule.target)?;
    }

    Ok(table)
}

/// Casts every cell of `column` to `target` and updates its declared type.
///
/// The warehouse type name is kept, since it describes the destination column rather than
/// the comparison representation.
pub fn cast_column(column: &mut Column, target: TargetType) -> EtlResult<()> {
    let cast: fn(&Cell) -> Option<Cell> = match target {
        TargetType::Timestamp => cast_to_timestamp,
        TargetType::NullableInt => cast_to_nullable_int,
    };

    let mut cells = Vec::with_capacity(column.cells.len());
    for cell in &column.cells {
        match cast(cell) {
            Some(cast_cell) => cells.push(cast_cell),
            None => bail!(
                ErrorKind::DataShapeError,
                "Value cannot be reconciled",
                format!(
                    "column `{}`: {} value `{}` cannot be cast to {}",
                    column.name,
                    cell.kind_name(),
                    cell,
                    target.column_type()
                )
            ),
        }
    }

    column.cells = cells;
    column.column_type = target.column_type();

    Ok(())
}

fn cast_to_timestamp(cell: &Cell) -> Option<Cell> {
    let timestamp = match cell {
        Cell::Null => return Some(Cell::Null),
        Cell::F64(value) if value.is_nan() => return Some(Cell::Null),
        Cell::Timestamp(value) => *value,
        Cell::Date(value) => value.and_hms_opt(0, 0, 0)?,
        Cell::String(value) => parse_timestamp(value)?,
        _ => return None,
    };

    Some(Cell::Timestamp(timestamp.trunc_subsecs(TIMESTAMP_SUBSEC_DIGITS)))
}

fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();

    TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

/// Casts through the float representation: integers widen, integral floats truncate exactly,
/// `NaN` is the float form of a missing value and becomes null.
fn cast_to_nullable_int(cell: &Cell) -> Option<Cell> {
    match cell {
        Cell::Null => Some(Cell::Null),
        Cell::I16(_) | Cell::I32(_) | Cell::I64(_) => cell.as_i64().map(Cell::I64),
        Cell::F64(value) => float_to_nullable_int(*value),
        Cell::String(value) => {
            let value = value.trim();
            if value.is_empty() {
                return Some(Cell::Null);
            }

            match value.parse::<i64>() {
                Ok(parsed) => Some(Cell::I64(parsed)),
                Err(_) => value.parse::<f64>().ok().and_then(float_to_nullable_int),
            }
        }
        _ => None,
    }
}

fn float_to_nullable_int(value: f64) -> Option<Cell> {
    if value.is_nan() {
        return Some(Cell::Null);
    }

    if value.fract() != 0.0 || value < i64::MIN as f64 || value >= -(i64::MIN as f64) {
        return None;
    }

    Some(Cell::I64(value as i64))
}
