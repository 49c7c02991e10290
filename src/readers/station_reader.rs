use crate::error::{ArchiverError, Result};
use crate::models::Station;
use crate::utils::geo::normalize_longitude;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, warn};
use validator::Validate;

/// Row of the station metadata CSV (`stid,name,latitude,longitude,elevation`).
#[derive(Debug, Deserialize)]
struct StationRow {
    stid: String,
    #[serde(default)]
    latitude: Option<f64>,
    #[serde(default)]
    longitude: Option<f64>,
}

pub struct StationReader {
    strict: bool,
}

impl StationReader {
    pub fn new() -> Self {
        Self { strict: false }
    }

    /// In strict mode out-of-range coordinates fail the whole roster instead
    /// of dropping the row.
    pub fn with_strict(strict: bool) -> Self {
        Self { strict }
    }

    /// Read the station roster. Rows without coordinates are dropped, as are
    /// repeated station ids after their first occurrence.
    pub fn read_stations(&self, path: &Path) -> Result<Vec<Station>> {
        let file = File::open(path)?;
        let stations = self.read_from(file)?;
        debug!("Read {} stations from {}", stations.len(), path.display());
        Ok(stations)
    }

    pub fn read_from<R: Read>(&self, reader: R) -> Result<Vec<Station>> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(reader);

        let mut stations = Vec::new();
        let mut seen = HashSet::new();

        for row in csv_reader.deserialize::<StationRow>() {
            let row = row?;

            let (latitude, longitude) = match (row.latitude, row.longitude) {
                (Some(lat), Some(lon)) => (lat, normalize_longitude(lon)),
                _ => {
                    debug!("Station {} has no coordinates, skipping", row.stid);
                    continue;
                }
            };

            let station = Station::new(row.stid, latitude, longitude);
            if let Err(e) = station.validate() {
                if self.strict {
                    return Err(ArchiverError::InvalidFormat(format!(
                        "Station {}: {}",
                        station.id, e
                    )));
                }
                warn!("Dropping station {}: {}", station.id, e);
                continue;
            }

            if !seen.insert(station.id.clone()) {
                warn!("Duplicate station id {}, keeping first entry", station.id);
                continue;
            }

            stations.push(station);
        }

        Ok(stations)
    }
}

impl Default for StationReader {
    fn default() -> Self {
        Self::new()
    }
}
