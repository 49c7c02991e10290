use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ArchiverError>;

#[derive(Error, Debug)]
pub enum ArchiverError {
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Date parsing error: {0}")]
    DateParse(#[from] chrono::ParseError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP status {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Configuration file error: {0}")]
    ConfigFile(#[from] config::ConfigError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("No extraction spec registered for model '{model}' element '{element}'")]
    MissingSpec { model: String, element: String },

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    #[error("Data merge error: {0}")]
    DataMerge(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Async task error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

/// Pipeline stage at which a remote file was abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum SkipStage {
    Index,
    FieldMatch,
    Fetch,
    Decode,
    Worker,
}

impl std::fmt::Display for SkipStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SkipStage::Index => "index",
            SkipStage::FieldMatch => "field-match",
            SkipStage::Fetch => "fetch",
            SkipStage::Decode => "decode",
            SkipStage::Worker => "worker",
        };
        f.write_str(name)
    }
}

/// Per-file failures. These never abort a batch: the worker converts them
/// into a skipped-file entry in the run report.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExtractionError {
    #[error("index unavailable for {url}: {reason}")]
    IndexUnavailable { url: String, reason: String },

    #[error("incomplete field match for {url}: matched {matched:?} of {requested:?}")]
    IncompleteFieldMatch {
        url: String,
        matched: Vec<String>,
        requested: Vec<String>,
    },

    #[error("no index lines matched {requested:?} in {url}")]
    NoFieldsMatched { url: String, requested: Vec<String> },

    #[error("range fetch failed for {url} ({range}): {reason}")]
    RangeFetchFailure {
        url: String,
        range: String,
        reason: String,
    },

    #[error("decode failed for {url}: {reason}")]
    DecodeFailure { url: String, reason: String },
}

impl ExtractionError {
    pub fn stage(&self) -> SkipStage {
        match self {
            ExtractionError::IndexUnavailable { .. } => SkipStage::Index,
            ExtractionError::IncompleteFieldMatch { .. }
            | ExtractionError::NoFieldsMatched { .. } => SkipStage::FieldMatch,
            ExtractionError::RangeFetchFailure { .. } => SkipStage::Fetch,
            ExtractionError::DecodeFailure { .. } => SkipStage::Decode,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_mapping() {
        let incomplete = ExtractionError::IncompleteFieldMatch {
            url: "u".to_string(),
            matched: vec![":WIND:".to_string()],
            requested: vec![":WIND:".to_string(), ":GUST:".to_string()],
        };
        assert_eq!(incomplete.stage(), SkipStage::FieldMatch);

        let unavailable = ExtractionError::IndexUnavailable {
            url: "u".to_string(),
            reason: "404".to_string(),
        };
        assert_eq!(unavailable.stage(), SkipStage::Index);
        assert_ne!(incomplete.stage(), unavailable.stage());
    }
}
