pub mod cli;
pub mod decoders;
pub mod error;
pub mod models;
pub mod processors;
pub mod readers;
pub mod registry;
pub mod remote;
pub mod utils;
pub mod writers;

pub use error::{ArchiverError, ExtractionError, Result, SkipStage};
