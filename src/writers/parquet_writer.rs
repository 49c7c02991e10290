use crate::error::{ArchiverError, Result};
use crate::models::ExtractionRecord;
use crate::utils::constants::{
    COL_FORECAST_HOUR, COL_INIT_TIME, COL_STATION_ID, COL_VALID_TIME, COMPRESSION_GZIP,
    COMPRESSION_LZ4, COMPRESSION_NONE, COMPRESSION_SNAPPY, COMPRESSION_ZSTD,
    DEFAULT_ROW_GROUP_SIZE,
};
use arrow::array::*;
use arrow::compute::cast;
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Utc};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, GzipLevel};
use parquet::file::properties::WriterProperties;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

const KEY_COLUMNS: [&str; 4] = [COL_STATION_ID, COL_VALID_TIME, COL_FORECAST_HOUR, COL_INIT_TIME];

fn timestamp_type() -> DataType {
    DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into()))
}

/// Contents of a partition file: its variable columns and rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartitionData {
    pub variables: Vec<String>,
    pub records: Vec<ExtractionRecord>,
}

pub struct ParquetWriter {
    compression: Compression,
    row_group_size: usize,
}

impl ParquetWriter {
    pub fn new() -> Self {
        Self {
            compression: Compression::SNAPPY,
            row_group_size: DEFAULT_ROW_GROUP_SIZE,
        }
    }

    pub fn with_compression(mut self, compression: &str) -> Result<Self> {
        self.compression = match compression.to_lowercase().as_str() {
            COMPRESSION_SNAPPY => Compression::SNAPPY,
            COMPRESSION_GZIP => Compression::GZIP(GzipLevel::default()),
            COMPRESSION_LZ4 => Compression::LZ4,
            COMPRESSION_ZSTD => Compression::ZSTD(parquet::basic::ZstdLevel::default()),
            COMPRESSION_NONE => Compression::UNCOMPRESSED,
            _ => {
                return Err(ArchiverError::Config(format!(
                    "Unsupported compression: {}",
                    compression
                )))
            }
        };
        Ok(self)
    }

    pub fn with_row_group_size(mut self, size: usize) -> Self {
        self.row_group_size = size;
        self
    }

    /// Write records to a new Parquet file. Nothing is written for an empty slice.
    pub fn write_records(
        &self,
        records: &[ExtractionRecord],
        variables: &[String],
        path: &Path,
    ) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let file = File::create(path)?;
        self.write_to(records, variables, file)
    }

    /// Write records to any sink, e.g. a temporary file that is renamed
    /// into place afterwards.
    pub fn write_to<W: Write + Send>(
        &self,
        records: &[ExtractionRecord],
        variables: &[String],
        sink: W,
    ) -> Result<()> {
        let schema = self.create_schema(variables);
        let props = WriterProperties::builder()
            .set_compression(self.compression)
            .set_max_row_group_size(self.row_group_size)
            .build();

        let mut writer = ArrowWriter::try_new(sink, schema.clone(), Some(props))?;
        for chunk in records.chunks(self.row_group_size.max(1)) {
            let batch = self.records_to_batch(chunk, variables, schema.clone())?;
            writer.write(&batch)?;
        }
        writer.close()?;

        Ok(())
    }

    /// Key columns followed by one nullable Float64 column per variable
    pub fn create_schema(&self, variables: &[String]) -> Arc<Schema> {
        let mut fields = vec![
            Field::new(COL_STATION_ID, DataType::Utf8, false),
            Field::new(COL_VALID_TIME, timestamp_type(), false),
            Field::new(COL_FORECAST_HOUR, DataType::UInt32, false),
            Field::new(COL_INIT_TIME, timestamp_type(), false),
        ];
        fields.extend(
            variables
                .iter()
                .map(|name| Field::new(name.as_str(), DataType::Float64, true)),
        );

        Arc::new(Schema::new(fields))
    }

    fn records_to_batch(
        &self,
        records: &[ExtractionRecord],
        variables: &[String],
        schema: Arc<Schema>,
    ) -> Result<RecordBatch> {
        let station_ids: Vec<&str> = records.iter().map(|r| r.station_id.as_str()).collect();
        let valid_times: Vec<i64> = records.iter().map(|r| r.valid_time.timestamp_micros()).collect();
        let forecast_hours: Vec<u32> = records.iter().map(|r| r.forecast_hour).collect();
        let init_times: Vec<i64> = records.iter().map(|r| r.init_time.timestamp_micros()).collect();

        let mut columns: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from(station_ids)),
            Arc::new(TimestampMicrosecondArray::from(valid_times).with_timezone("UTC")),
            Arc::new(UInt32Array::from(forecast_hours)),
            Arc::new(TimestampMicrosecondArray::from(init_times).with_timezone("UTC")),
        ];
        for name in variables {
            let values: Vec<Option<f64>> = records.iter().map(|r| r.value(name)).collect();
            columns.push(Arc::new(Float64Array::from(values)));
        }

        Ok(RecordBatch::try_new(schema, columns)?)
    }

    /// Read a whole partition. Key columns are cast to the archive types so
    /// files written with other integer or timestamp units still load.
    pub fn read_partition(&self, path: &Path) -> Result<PartitionData> {
        self.read_limited(path, usize::MAX)
    }

    pub fn read_sample_records(&self, path: &Path, limit: usize) -> Result<Vec<ExtractionRecord>> {
        Ok(self.read_limited(path, limit)?.records)
    }

    fn read_limited(&self, path: &Path, limit: usize) -> Result<PartitionData> {
        let file = File::open(path)?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;

        let variables: Vec<String> = builder
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .filter(|name| !KEY_COLUMNS.contains(&name.as_str()))
            .collect();
        let reader = builder.with_batch_size(limit.clamp(1, 8192)).build()?;

        let mut records = Vec::new();
        for batch_result in reader {
            let batch = batch_result?;
            let remaining = limit - records.len();
            self.batch_to_records(&batch, &variables, remaining, &mut records)?;
            if records.len() >= limit {
                break;
            }
        }

        Ok(PartitionData { variables, records })
    }

    fn batch_to_records(
        &self,
        batch: &RecordBatch,
        variables: &[String],
        limit: usize,
        out: &mut Vec<ExtractionRecord>,
    ) -> Result<()> {
        let station_ids = column_as(batch, COL_STATION_ID, &DataType::Utf8)?;
        let station_ids = downcast::<StringArray>(&station_ids, COL_STATION_ID)?;
        let valid_times = column_as(batch, COL_VALID_TIME, &timestamp_type())?;
        let valid_times = downcast::<TimestampMicrosecondArray>(&valid_times, COL_VALID_TIME)?;
        let forecast_hours = column_as(batch, COL_FORECAST_HOUR, &DataType::UInt32)?;
        let forecast_hours = downcast::<UInt32Array>(&forecast_hours, COL_FORECAST_HOUR)?;
        let init_times = column_as(batch, COL_INIT_TIME, &timestamp_type())?;
        let init_times = downcast::<TimestampMicrosecondArray>(&init_times, COL_INIT_TIME)?;

        let mut value_columns = Vec::with_capacity(variables.len());
        for name in variables {
            value_columns.push((name, column_as(batch, name, &DataType::Float64)?));
        }
        let mut value_arrays = Vec::with_capacity(value_columns.len());
        for (name, array) in &value_columns {
            value_arrays.push((*name, downcast::<Float64Array>(array, name)?));
        }

        for i in 0..batch.num_rows().min(limit) {
            let mut values = BTreeMap::new();
            for (name, array) in &value_arrays {
                if array.is_valid(i) {
                    values.insert((*name).clone(), array.value(i));
                }
            }

            out.push(ExtractionRecord {
                station_id: station_ids.value(i).to_string(),
                valid_time: micros_to_datetime(valid_times.value(i))?,
                forecast_hour: forecast_hours.value(i),
                init_time: micros_to_datetime(init_times.value(i))?,
                values,
            });
        }

        Ok(())
    }

    /// Get file statistics
    pub fn get_file_info(&self, path: &Path) -> Result<ParquetFileInfo> {
        use parquet::file::reader::{FileReader, SerializedFileReader};

        let file = File::open(path)?;
        let reader = SerializedFileReader::new(file)?;
        let metadata = reader.metadata();

        let file_metadata = metadata.file_metadata();
        let row_groups = metadata.num_row_groups();
        let total_rows = file_metadata.num_rows();
        let file_size = std::fs::metadata(path)?.len();
        let columns = file_metadata
            .schema_descr()
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();

        let mut row_group_sizes = Vec::new();
        for i in 0..row_groups {
            row_group_sizes.push(metadata.row_group(i).num_rows());
        }

        Ok(ParquetFileInfo {
            total_rows,
            row_groups: row_groups as i32,
            row_group_sizes,
            file_size,
            columns,
            compression: self.compression,
        })
    }
}

impl Default for ParquetWriter {
    fn default() -> Self {
        Self::new()
    }
}

fn column_as(batch: &RecordBatch, name: &str, data_type: &DataType) -> Result<ArrayRef> {
    let column = batch.column_by_name(name).ok_or_else(|| {
        ArchiverError::InvalidFormat(format!("Partition is missing column '{}'", name))
    })?;
    if column.data_type() == data_type {
        return Ok(Arc::clone(column));
    }
    Ok(cast(column, data_type)?)
}

fn downcast<'a, T: 'static>(array: &'a ArrayRef, name: &str) -> Result<&'a T> {
    array
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| ArchiverError::InvalidFormat(format!("Invalid {} column type", name)))
}

fn micros_to_datetime(micros: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| ArchiverError::InvalidFormat(format!("Timestamp out of range: {}", micros)))
}

#[derive(Debug)]
pub struct ParquetFileInfo {
    pub total_rows: i64,
    pub row_groups: i32,
    pub row_group_sizes: Vec<i64>,
    pub file_size: u64,
    pub columns: Vec<String>,
    pub compression: Compression,
}

impl ParquetFileInfo {
    pub fn summary(&self) -> String {
        format!(
            "Parquet File Summary:\n\
            - Total rows: {}\n\
            - Row groups: {}\n\
            - File size: {:.2} MB\n\
            - Compression: {:?}\n\
            - Columns: {}",
            self.total_rows,
            self.row_groups,
            self.file_size as f64 / 1_048_576.0,
            self.compression,
            self.columns.join(", ")
        )
    }
}
