pub mod constants;
pub mod filename;
pub mod geo;
pub mod progress;

pub use constants::*;
pub use filename::PartitionKey;
pub use geo::{chebyshev_distance, normalize_longitude, round_to};
pub use progress::ProgressReporter;
