use std::io::Cursor;
use std::sync::Arc;

use arrow::csv::ReaderBuilder;
use arrow::csv::reader::Format;
use bytes::Bytes;
use tracing::debug;

use crate::bail;
use crate::conversions::record_batch::decode_record_batches;
use crate::error::{ErrorKind, EtlResult};
use crate::reconcile::cast_column;
use crate::registry::TargetType;
use crate::types::Snapshot;

/// Decodes a CSV extract with a header row into a [`Snapshot`].
///
/// Column types are inferred from the values and empty fields are nulls. The columns named in
/// `timestamp_columns` are parsed as timestamps; a missing one is a
/// [`ErrorKind::DataShapeError`].
pub fn decode_csv(data: Bytes, timestamp_columns: &[&str]) -> EtlResult<Snapshot> {
    let data_size = data.len();
    let format = Format::default().with_header(true);
    let (schema, _) = format.infer_schema(Cursor::new(data.as_ref()), None)?;

    let reader = ReaderBuilder::new(Arc::new(schema.clone()))
        .with_header(true)
        .build(Cursor::new(data))?;
    let mut snapshot = decode_record_batches(&schema, reader, |_| false)?;

    for name in timestamp_columns {
        let Some(column) = snapshot.column_mut(name) else {
            bail!(
                ErrorKind::DataShapeError,
                "Extract is missing a timestamp column",
                format!("column `{name}` not found")
            );
        };
        cast_column(column, TargetType::Timestamp)?;
    }

    debug!(
        data_size,
        num_rows = snapshot.num_rows(),
        num_columns = snapshot.num_columns(),
        "decoded csv extract"
    );

    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::types::{Cell, ColumnType};

    const SALES_ORDER: &str = "\
sales_order_id,created_at,last_updated,design_id,staff_id,unit_price,agreed_delivery_date
2,2022-11-03 14:20:52.186,2022-11-03 14:20:52.186,3,19,3.94,2022-11-07
3,2022-11-03 14:20:52.188,2022-11-04 09:00:00,4,10,2.91,
";

    #[test]
    fn infers_types_and_parses_timestamps() {
        let snapshot = decode_csv(
            Bytes::from_static(SALES_ORDER.as_bytes()),
            &["created_at", "last_updated", "agreed_delivery_date"],
        )
        .unwrap();

        assert_eq!(snapshot.num_rows(), 2);
        assert_eq!(
            snapshot.column("sales_order_id").unwrap().cells,
            vec![Cell::I64(2), Cell::I64(3)]
        );
        assert_eq!(
            snapshot.column("unit_price").unwrap().cells,
            vec![Cell::F64(3.94), Cell::F64(2.91)]
        );

        let date = NaiveDate::from_ymd_opt(2022, 11, 3).unwrap();
        let created_at = snapshot.column("created_at").unwrap();
        assert_eq!(created_at.column_type, ColumnType::Timestamp);
        assert_eq!(
            created_at.cells[0],
            Cell::Timestamp(date.and_hms_milli_opt(14, 20, 52, 186).unwrap())
        );

        let delivery = snapshot.column("agreed_delivery_date").unwrap();
        assert_eq!(
            delivery.cells,
            vec![
                Cell::Timestamp(
                    NaiveDate::from_ymd_opt(2022, 11, 7)
                        .unwrap()
                        .and_hms_opt(0, 0, 0)
                        .unwrap()
                ),
                Cell::Null
            ]
        );
    }

    #[test]
    fn missing_timestamp_column_is_a_shape_error() {
        let err = decode_csv(
            Bytes::from_static(SALES_ORDER.as_bytes()),
            &["created_at", "payment_date"],
        )
        .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::DataShapeError);
    }

    #[test]
    fn empty_fields_are_nulls() {
        let data = "transaction_id,transaction_type,sales_order_id,purchase_order_id\n\
                    1,PURCHASE,,2\n\
                    2,SALE,3,\n";

        let snapshot = decode_csv(Bytes::from_static(data.as_bytes()), &[]).unwrap();

        assert_eq!(
            snapshot.column("sales_order_id").unwrap().cells,
            vec![Cell::Null, Cell::I64(3)]
        );
        assert_eq!(
            snapshot.column("transaction_type").unwrap().cells,
            vec![Cell::from("PURCHASE"), Cell::from("SALE")]
        );
    }
}
