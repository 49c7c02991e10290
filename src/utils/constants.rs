/// Sidecar index suffix appended to a data file URL
pub const INDEX_SUFFIX: &str = ".idx";

/// Persisted partition key columns
pub const COL_STATION_ID: &str = "station_id";
pub const COL_VALID_TIME: &str = "valid_time";
pub const COL_FORECAST_HOUR: &str = "forecast_hour";
pub const COL_INIT_TIME: &str = "init_time";

/// Unit conversion factors
pub const MS_TO_KNOTS: f64 = 1.94384;
pub const MM_TO_INCHES: f64 = 0.0393701;
pub const KELVIN_TO_FAHRENHEIT_FACTOR: f64 = 1.8;
pub const KELVIN_TO_FAHRENHEIT_OFFSET: f64 = -459.67;

/// Rounding precision (decimal places)
pub const PRECISION_RATE: u32 = 2;
pub const PRECISION_ANGLE: u32 = 0;
pub const PRECISION_TEMPERATURE: u32 = 1;
pub const MAX_PRECISION: u32 = 6;

/// Processing defaults
pub const DEFAULT_MAX_WORKERS: usize = 8;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_ROW_GROUP_SIZE: usize = 10000;
pub const DEFAULT_OUTPUT_DIR: &str = "archive";

/// Parquet compression options
pub const COMPRESSION_SNAPPY: &str = "snappy";
pub const COMPRESSION_GZIP: &str = "gzip";
pub const COMPRESSION_LZ4: &str = "lz4";
pub const COMPRESSION_ZSTD: &str = "zstd";
pub const COMPRESSION_NONE: &str = "none";
