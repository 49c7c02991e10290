use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ArchiverError;
use crate::utils::constants::INDEX_SUFFIX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Model {
    Nbm,
    Nbmqmd,
    NbmqmdExp,
    Hrrr,
    Urma,
    Rtma,
    Gfs,
}

impl Model {
    pub const ALL: [Model; 7] = [
        Model::Nbm,
        Model::Nbmqmd,
        Model::NbmqmdExp,
        Model::Hrrr,
        Model::Urma,
        Model::Rtma,
        Model::Gfs,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Model::Nbm => "nbm",
            Model::Nbmqmd => "nbmqmd",
            Model::NbmqmdExp => "nbmqmd_exp",
            Model::Hrrr => "hrrr",
            Model::Urma => "urma",
            Model::Rtma => "rtma",
            Model::Gfs => "gfs",
        }
    }

    /// Analysis-only products publish a single valid time per cycle and
    /// carry no forecast hour in their file names.
    pub fn is_analysis(&self) -> bool {
        matches!(self, Model::Urma | Model::Rtma)
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Model {
    type Err = ArchiverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_lowercase();
        Model::ALL
            .iter()
            .copied()
            .find(|m| m.as_str() == lowered)
            .ok_or_else(|| ArchiverError::Config(format!("Unknown model: '{}'", s)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Element {
    Wind,
    Gust,
    Precip24hr,
    Maxt,
    Mint,
}

impl Element {
    pub const ALL: [Element; 5] = [
        Element::Wind,
        Element::Gust,
        Element::Precip24hr,
        Element::Maxt,
        Element::Mint,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Element::Wind => "wind",
            Element::Gust => "gust",
            Element::Precip24hr => "precip24hr",
            Element::Maxt => "maxt",
            Element::Mint => "mint",
        }
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Element {
    type Err = ArchiverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_lowercase();
        Element::ALL
            .iter()
            .copied()
            .find(|e| e.as_str() == lowered)
            .ok_or_else(|| ArchiverError::Config(format!("Unknown element: '{}'", s)))
    }
}

/// One remote gridded file to extract from. Produced by a file lister,
/// consumed (never mutated) by the extraction pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFileDescriptor {
    pub url: String,
    pub model: Model,
    pub element: Element,
    pub init_time: DateTime<Utc>,
    pub forecast_hour: u32,
}

impl RemoteFileDescriptor {
    pub fn new(
        url: impl Into<String>,
        model: Model,
        element: Element,
        init_time: DateTime<Utc>,
        forecast_hour: u32,
    ) -> Self {
        Self {
            url: url.into(),
            model,
            element,
            init_time,
            forecast_hour,
        }
    }

    pub fn valid_time(&self) -> DateTime<Utc> {
        self.init_time + Duration::hours(i64::from(self.forecast_hour))
    }

    /// URL of the sidecar index that accompanies the data file.
    pub fn index_url(&self) -> String {
        format!("{}{}", self.url, INDEX_SUFFIX)
    }

    pub fn file_name(&self) -> &str {
        self.url.rsplit('/').next().unwrap_or(&self.url)
    }
}
