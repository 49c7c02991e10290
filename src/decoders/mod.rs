//! Boundary to the gridded-file decoder.

pub mod grib_decoder;
pub mod parameters;
pub mod sections;

pub use grib_decoder::GribDecoder;
pub use parameters::ParameterTable;
pub use sections::{scan_submessages, SubmessageInfo};

use crate::error::Result;
use crate::models::GridField;

/// Turns a buffer of one or more self-describing gridded records into named
/// 2-D fields with their coordinates. Fields whose time metadata the decoder
/// cannot determine leave `step_hours`/`valid_time` unset.
pub trait GridDecoder: Send + Sync {
    fn decode(&self, buffer: &[u8]) -> Result<Vec<GridField>>;
}
