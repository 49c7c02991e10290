pub mod index_catalog;
pub mod station_reader;

pub use index_catalog::{ByteRange, FieldMatch, FieldSelection, IndexCatalog, IndexEntry};
pub use station_reader::StationReader;
