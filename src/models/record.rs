use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One station's forecast at one lead time, with a value per requested
/// variable keyed by its canonical name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionRecord {
    pub station_id: String,
    pub valid_time: DateTime<Utc>,
    pub forecast_hour: u32,
    pub init_time: DateTime<Utc>,
    pub values: BTreeMap<String, f64>,
}

impl ExtractionRecord {
    pub fn builder() -> ExtractionRecordBuilder {
        ExtractionRecordBuilder::default()
    }

    pub fn value(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }
}

#[derive(Default)]
pub struct ExtractionRecordBuilder {
    station_id: Option<String>,
    init_time: Option<DateTime<Utc>>,
    valid_time: Option<DateTime<Utc>>,
    forecast_hour: Option<u32>,
    values: BTreeMap<String, f64>,
}

impl ExtractionRecordBuilder {
    pub fn station_id(mut self, station_id: impl Into<String>) -> Self {
        self.station_id = Some(station_id.into());
        self
    }

    pub fn init_time(mut self, init_time: DateTime<Utc>) -> Self {
        self.init_time = Some(init_time);
        self
    }

    pub fn valid_time(mut self, valid_time: DateTime<Utc>) -> Self {
        self.valid_time = Some(valid_time);
        self
    }

    pub fn forecast_hour(mut self, forecast_hour: u32) -> Self {
        self.forecast_hour = Some(forecast_hour);
        self
    }

    pub fn value(mut self, name: impl Into<String>, value: f64) -> Self {
        self.values.insert(name.into(), value);
        self
    }

    /// Fills whichever of init/valid time is missing from the other and the
    /// forecast hour. Returns `None` when neither time is set.
    pub fn build(self) -> Option<ExtractionRecord> {
        let station_id = self.station_id?;
        let forecast_hour = self.forecast_hour.unwrap_or(0);
        let lead = Duration::hours(i64::from(forecast_hour));

        let (init_time, valid_time) = match (self.init_time, self.valid_time) {
            (Some(init), Some(valid)) => (init, valid),
            (Some(init), None) => (init, init + lead),
            (None, Some(valid)) => (valid - lead, valid),
            (None, None) => return None,
        };

        Some(ExtractionRecord {
            station_id,
            valid_time,
            forecast_hour,
            init_time,
            values: self.values,
        })
    }
}
