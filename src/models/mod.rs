pub mod descriptor;
pub mod grid;
pub mod record;
pub mod station;

pub use descriptor::{Element, Model, RemoteFileDescriptor};
pub use grid::{Cell, GridField, GridGeometry, GridSignature};
pub use record::{ExtractionRecord, ExtractionRecordBuilder};
pub use station::Station;
