use bytes::Bytes;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::basic::Compression;
use parquet::errors::ParquetError;
use parquet::file::properties::WriterProperties;
use tracing::debug;

use crate::conversions::record_batch::{decode_record_batches, encode_record_batch};
use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;
use crate::types::Snapshot;

/// Columns written by dataframe libraries to persist their row index.
const INDEX_COLUMN_PREFIX: &str = "__index_level_";

/// Decodes a Parquet file into a [`Snapshot`].
///
/// Row index columns are dropped. Timestamps are read as naive UTC whatever their time zone.
/// Times and timestamps are truncated to microseconds, the precision of the warehouse.
pub fn decode_snapshot(data: Bytes) -> EtlResult<Snapshot> {
    let data_size = data.len();
    let builder = ParquetRecordBatchReaderBuilder::try_new(data)?;
    let schema = builder.schema().clone();
    let reader = builder.build()?;

    let snapshot = decode_record_batches(&schema, reader, |field| {
        field.name().starts_with(INDEX_COLUMN_PREFIX)
    })?;
    debug!(
        data_size,
        num_rows = snapshot.num_rows(),
        num_columns = snapshot.num_columns(),
        "decoded parquet snapshot"
    );

    Ok(snapshot)
}

/// Encodes a [`Snapshot`] as a Snappy compressed Parquet file.
pub fn encode_snapshot(snapshot: &Snapshot) -> EtlResult<Bytes> {
    let batch = encode_record_batch(snapshot)?;
    let properties = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();

    let encoding_error = |err: ParquetError| {
        etl_error!(
            ErrorKind::DataShapeError,
            "Parquet snapshot could not be encoded",
            err.to_string(),
            source: err
        )
    };

    let mut buffer = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buffer, batch.schema(), Some(properties))
        .map_err(encoding_error)?;
    writer.write(&batch).map_err(encoding_error)?;
    writer.close().map_err(encoding_error)?;

    debug!(
        data_size = buffer.len(),
        num_rows = snapshot.num_rows(),
        num_columns = snapshot.num_columns(),
        "encoded parquet snapshot"
    );

    Ok(Bytes::from(buffer))
}
