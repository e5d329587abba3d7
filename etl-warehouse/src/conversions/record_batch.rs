//! Conversions between Arrow record batches and [`Snapshot`] values, shared by the Parquet
//! and CSV codecs.

use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, AsArray, BooleanArray, Date32Array, Float64Array, Int64Array, StringArray,
    Time64MicrosecondArray, TimestampMicrosecondArray,
};
use arrow::datatypes::{
    DataType, Date32Type, Date64Type, Decimal128Type, Field, Float32Type, Float64Type, Int8Type,
    Int16Type, Int32Type, Int64Type, Schema, Time32MillisecondType, Time32SecondType,
    Time64MicrosecondType, Time64NanosecondType, TimeUnit, TimestampMicrosecondType,
    TimestampMillisecondType, TimestampNanosecondType, TimestampSecondType, UInt8Type,
    UInt16Type, UInt32Type, UInt64Type,
};
use arrow::error::ArrowError;
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use chrono::{Datelike, SubsecRound, Timelike};

use crate::bail;
use crate::error::{ErrorKind, EtlResult};
use crate::types::{Cell, Column, ColumnType, Snapshot};

/// Fractional second digits kept from nanosecond values.
const MICROSECOND_DIGITS: u16 = 6;

/// Days from 0001-01-01 to 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Collects record batches into a [`Snapshot`].
///
/// Fields for which `skip` returns true are dropped. Times and timestamps are truncated to
/// microseconds, the precision of the warehouse, and timestamps are read as naive UTC
/// whatever their time zone.
pub fn decode_record_batches<I>(
    schema: &Schema,
    batches: I,
    skip: impl Fn(&Field) -> bool,
) -> EtlResult<Snapshot>
where
    I: IntoIterator<Item = Result<RecordBatch, ArrowError>>,
{
    let mut columns = Vec::with_capacity(schema.fields().len());
    for (index, field) in schema.fields().iter().enumerate() {
        if skip(field.as_ref()) {
            continue;
        }

        let column_type = column_type_of(field.name(), field.data_type())?;
        columns.push((index, Column::new(field.name().clone(), column_type, Vec::new())));
    }

    for batch in batches {
        let batch = batch?;
        for (index, column) in columns.iter_mut() {
            append_cells(&mut column.cells, batch.column(*index).as_ref(), &column.name)?;
        }
    }

    Snapshot::new(columns.into_iter().map(|(_, column)| column).collect())
}

/// Encodes a [`Snapshot`] as one record batch.
///
/// Integers are written as `Int64`, times and timestamps with microsecond precision. Every
/// field is nullable. A column of unknown type holding only nulls is written as strings.
pub fn encode_record_batch(snapshot: &Snapshot) -> EtlResult<RecordBatch> {
    let mut fields = Vec::with_capacity(snapshot.num_columns());
    let mut arrays = Vec::with_capacity(snapshot.num_columns());
    for column in snapshot.columns() {
        let array = encode_column(column)?;
        fields.push(Field::new(column.name.clone(), array.data_type().clone(), true));
        arrays.push(array);
    }

    let options = RecordBatchOptions::new().with_row_count(Some(snapshot.num_rows()));
    let batch = RecordBatch::try_new_with_options(Arc::new(Schema::new(fields)), arrays, &options)?;

    Ok(batch)
}

fn encode_column(column: &Column) -> EtlResult<ArrayRef> {
    let column_type = match column.column_type {
        ColumnType::Unknown => ColumnType::infer(&column.cells),
        column_type => column_type,
    };

    let array: ArrayRef = match column_type {
        ColumnType::Bool => Arc::new(BooleanArray::from(column_values(column, |cell| {
            match cell {
                Cell::Bool(value) => Some(*value),
                _ => None,
            }
        })?)),
        ColumnType::Int | ColumnType::NullableInt => {
            Arc::new(Int64Array::from(column_values(column, Cell::as_i64)?))
        }
        ColumnType::Float => Arc::new(Float64Array::from(column_values(column, |cell| {
            match cell {
                Cell::F64(value) => Some(*value),
                other => other.as_i64().map(|value| value as f64),
            }
        })?)),
        ColumnType::Date => Arc::new(Date32Array::from(column_values(column, |cell| {
            match cell {
                Cell::Date(date) => Some(date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE),
                _ => None,
            }
        })?)),
        ColumnType::Time => Arc::new(Time64MicrosecondArray::from(column_values(
            column,
            |cell| match cell {
                Cell::Time(time) => Some(
                    i64::from(time.num_seconds_from_midnight()) * 1_000_000
                        + i64::from(time.nanosecond() / 1_000),
                ),
                _ => None,
            },
        )?)),
        ColumnType::Timestamp => Arc::new(TimestampMicrosecondArray::from(column_values(
            column,
            |cell| match cell {
                Cell::Timestamp(timestamp) => Some(timestamp.and_utc().timestamp_micros()),
                _ => None,
            },
        )?)),
        ColumnType::Text | ColumnType::Unknown => {
            Arc::new(StringArray::from(column_values(column, |cell| match cell {
                Cell::String(value) => Some(value.as_str()),
                _ => None,
            })?))
        }
    };

    Ok(array)
}

/// Extracts one value per cell, nulls included. A cell `value` cannot represent is a
/// [`ErrorKind::DataShapeError`].
fn column_values<'a, T>(
    column: &'a Column,
    value: impl Fn(&'a Cell) -> Option<T>,
) -> EtlResult<Vec<Option<T>>> {
    column
        .cells
        .iter()
        .enumerate()
        .map(|(index, cell)| {
            if cell.is_null() {
                return Ok(None);
            }

            match value(cell) {
                Some(value) => Ok(Some(value)),
                None => bail!(
                    ErrorKind::DataShapeError,
                    "Snapshot value does not match its column type",
                    format!(
                        "column `{}` row {index}: {} value `{cell}` in a {} column",
                        column.name,
                        cell.kind_name(),
                        column.column_type
                    )
                ),
            }
        })
        .collect()
}

fn column_type_of(name: &str, data_type: &DataType) -> EtlResult<ColumnType> {
    let column_type = match data_type {
        DataType::Null => ColumnType::Unknown,
        DataType::Boolean => ColumnType::Bool,
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64 => ColumnType::Int,
        DataType::Float32 | DataType::Float64 | DataType::Decimal128(_, _) => ColumnType::Float,
        DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View => ColumnType::Text,
        DataType::Date32 | DataType::Date64 => ColumnType::Date,
        DataType::Time32(_) | DataType::Time64(_) => ColumnType::Time,
        DataType::Timestamp(_, _) => ColumnType::Timestamp,
        other => bail!(
            ErrorKind::DataShapeError,
            "Unsupported snapshot column type",
            format!("column `{name}` has type {other}")
        ),
    };

    Ok(column_type)
}

/// Appends one cell per array slot, nulls included.
fn extend_cells(
    cells: &mut Vec<Cell>,
    array: &dyn Array,
    name: &str,
    value: impl Fn(usize) -> Option<Cell>,
) -> EtlResult<()> {
    cells.reserve(array.len());

    for index in 0..array.len() {
        if array.is_null(index) {
            cells.push(Cell::Null);
            continue;
        }

        match value(index) {
            Some(cell) => cells.push(cell),
            None => bail!(
                ErrorKind::DataShapeError,
                "Snapshot value out of range",
                format!("column `{name}` row {index} of type {}", array.data_type())
            ),
        }
    }

    Ok(())
}

fn append_cells(cells: &mut Vec<Cell>, array: &dyn Array, name: &str) -> EtlResult<()> {
    match array.data_type() {
        DataType::Null => extend_cells(cells, array, name, |_| Some(Cell::Null)),
        DataType::Boolean => {
            let values = array.as_boolean();
            extend_cells(cells, array, name, |i| Some(Cell::Bool(values.value(i))))
        }
        DataType::Int8 => {
            let values = array.as_primitive::<Int8Type>();
            extend_cells(cells, array, name, |i| Some(Cell::I16(values.value(i).into())))
        }
        DataType::Int16 => {
            let values = array.as_primitive::<Int16Type>();
            extend_cells(cells, array, name, |i| Some(Cell::I16(values.value(i))))
        }
        DataType::Int32 => {
            let values = array.as_primitive::<Int32Type>();
            extend_cells(cells, array, name, |i| Some(Cell::I32(values.value(i))))
        }
        DataType::Int64 => {
            let values = array.as_primitive::<Int64Type>();
            extend_cells(cells, array, name, |i| Some(Cell::I64(values.value(i))))
        }
        DataType::UInt8 => {
            let values = array.as_primitive::<UInt8Type>();
            extend_cells(cells, array, name, |i| Some(Cell::I16(values.value(i).into())))
        }
        DataType::UInt16 => {
            let values = array.as_primitive::<UInt16Type>();
            extend_cells(cells, array, name, |i| Some(Cell::I32(values.value(i).into())))
        }
        DataType::UInt32 => {
            let values = array.as_primitive::<UInt32Type>();
            extend_cells(cells, array, name, |i| Some(Cell::I64(values.value(i).into())))
        }
        DataType::UInt64 => {
            let values = array.as_primitive::<UInt64Type>();
            extend_cells(cells, array, name, |i| {
                i64::try_from(values.value(i)).ok().map(Cell::I64)
            })
        }
        DataType::Float32 => {
            let values = array.as_primitive::<Float32Type>();
            extend_cells(cells, array, name, |i| Some(Cell::F64(values.value(i).into())))
        }
        DataType::Float64 => {
            let values = array.as_primitive::<Float64Type>();
            extend_cells(cells, array, name, |i| Some(Cell::F64(values.value(i))))
        }
        DataType::Decimal128(_, scale) => {
            let values = array.as_primitive::<Decimal128Type>();
            let divisor = 10f64.powi(i32::from(*scale));
            extend_cells(cells, array, name, |i| {
                Some(Cell::F64(values.value(i) as f64 / divisor))
            })
        }
        DataType::Utf8 => {
            let values = array.as_string::<i32>();
            extend_cells(cells, array, name, |i| Some(Cell::from(values.value(i))))
        }
        DataType::LargeUtf8 => {
            let values = array.as_string::<i64>();
            extend_cells(cells, array, name, |i| Some(Cell::from(values.value(i))))
        }
        DataType::Utf8View => {
            let values = array.as_string_view();
            extend_cells(cells, array, name, |i| Some(Cell::from(values.value(i))))
        }
        DataType::Date32 => {
            let values = array.as_primitive::<Date32Type>();
            extend_cells(cells, array, name, |i| values.value_as_date(i).map(Cell::Date))
        }
        DataType::Date64 => {
            let values = array.as_primitive::<Date64Type>();
            extend_cells(cells, array, name, |i| values.value_as_date(i).map(Cell::Date))
        }
        DataType::Time32(TimeUnit::Second) => {
            let values = array.as_primitive::<Time32SecondType>();
            extend_cells(cells, array, name, |i| values.value_as_time(i).map(Cell::Time))
        }
        DataType::Time32(TimeUnit::Millisecond) => {
            let values = array.as_primitive::<Time32MillisecondType>();
            extend_cells(cells, array, name, |i| values.value_as_time(i).map(Cell::Time))
        }
        DataType::Time64(TimeUnit::Microsecond) => {
            let values = array.as_primitive::<Time64MicrosecondType>();
            extend_cells(cells, array, name, |i| values.value_as_time(i).map(Cell::Time))
        }
        DataType::Time64(TimeUnit::Nanosecond) => {
            let values = array.as_primitive::<Time64NanosecondType>();
            extend_cells(cells, array, name, |i| {
                values
                    .value_as_time(i)
                    .map(|time| Cell::Time(time.trunc_subsecs(MICROSECOND_DIGITS)))
            })
        }
        DataType::Timestamp(TimeUnit::Second, _) => {
            let values = array.as_primitive::<TimestampSecondType>();
            extend_cells(cells, array, name, |i| {
                values.value_as_datetime(i).map(Cell::Timestamp)
            })
        }
        DataType::Timestamp(TimeUnit::Millisecond, _) => {
            let values = array.as_primitive::<TimestampMillisecondType>();
            extend_cells(cells, array, name, |i| {
                values.value_as_datetime(i).map(Cell::Timestamp)
            })
        }
        DataType::Timestamp(TimeUnit::Microsecond, _) => {
            let values = array.as_primitive::<TimestampMicrosecondType>();
            extend_cells(cells, array, name, |i| {
                values.value_as_datetime(i).map(Cell::Timestamp)
            })
        }
        DataType::Timestamp(TimeUnit::Nanosecond, _) => {
            let values = array.as_primitive::<TimestampNanosecondType>();
            extend_cells(cells, array, name, |i| {
                values.value_as_datetime(i).map(|timestamp| {
                    Cell::Timestamp(timestamp.trunc_subsecs(MICROSECOND_DIGITS))
                })
            })
        }
        other => bail!(
            ErrorKind::DataShapeError,
            "Unsupported snapshot column type",
            format!("column `{name}` has type {other}")
        ),
    }
}
