use rayon::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

use super::nearest_neighbor::NearestNeighborIndex;
use crate::decoders::GridDecoder;
use crate::error::{ExtractionError, SkipStage};
use crate::models::{
    Cell, ExtractionRecord, GridField, GridSignature, RemoteFileDescriptor, Station,
};
use crate::readers::IndexCatalog;
use crate::registry::ExtractionSpec;
use crate::remote::{RangeFetcher, RemoteSource};

/// A station dropped from one step of one file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationFailure {
    pub station_id: String,
    pub forecast_hour: u32,
    pub reason: String,
}

/// What a worker produced for one remote file. A skipped file has no
/// records and carries the error of the stage that failed.
#[derive(Debug, Clone)]
pub struct FileOutcome {
    pub url: String,
    pub records: Vec<ExtractionRecord>,
    pub station_failures: Vec<StationFailure>,
    pub error: Option<ExtractionError>,
}

impl FileOutcome {
    pub fn skipped(url: impl Into<String>, error: ExtractionError) -> Self {
        Self {
            url: url.into(),
            records: Vec::new(),
            station_failures: Vec::new(),
            error: Some(error),
        }
    }

    pub fn is_skipped(&self) -> bool {
        self.error.is_some()
    }

    pub fn skip_stage(&self) -> Option<SkipStage> {
        self.error.as_ref().map(ExtractionError::stage)
    }
}

#[derive(Debug, Default)]
struct Extraction {
    records: Vec<ExtractionRecord>,
    station_failures: Vec<StationFailure>,
}

/// Extracts station point values from one remote file at a time. Cheap to
/// share: all state is behind `Arc`s.
pub struct ExtractionWorker {
    source: Arc<dyn RemoteSource>,
    fetcher: RangeFetcher,
    decoder: Arc<dyn GridDecoder>,
    cells: Arc<NearestNeighborIndex>,
    stations: Arc<Vec<Station>>,
}

impl ExtractionWorker {
    pub fn new(
        source: Arc<dyn RemoteSource>,
        decoder: Arc<dyn GridDecoder>,
        stations: Arc<Vec<Station>>,
    ) -> Self {
        Self {
            fetcher: RangeFetcher::new(Arc::clone(&source)),
            source,
            decoder,
            cells: Arc::new(NearestNeighborIndex::new()),
            stations,
        }
    }

    /// Share a cell index with other workers or runs.
    pub fn with_cell_index(mut self, cells: Arc<NearestNeighborIndex>) -> Self {
        self.cells = cells;
        self
    }

    pub fn cell_index(&self) -> &Arc<NearestNeighborIndex> {
        &self.cells
    }

    /// Never fails: any stage error becomes a skipped outcome.
    pub async fn extract(
        &self,
        descriptor: &RemoteFileDescriptor,
        spec: Arc<ExtractionSpec>,
    ) -> FileOutcome {
        match self.try_extract(descriptor, spec).await {
            Ok(extraction) => {
                debug!(
                    url = %descriptor.url,
                    records = extraction.records.len(),
                    station_failures = extraction.station_failures.len(),
                    "Extracted file"
                );
                FileOutcome {
                    url: descriptor.url.clone(),
                    records: extraction.records,
                    station_failures: extraction.station_failures,
                    error: None,
                }
            }
            Err(e) => {
                warn!(url = %descriptor.url, stage = %e.stage(), "Skipping file: {}", e);
                FileOutcome::skipped(descriptor.url.clone(), e)
            }
        }
    }

    async fn try_extract(
        &self,
        descriptor: &RemoteFileDescriptor,
        spec: Arc<ExtractionSpec>,
    ) -> Result<Extraction, ExtractionError> {
        let index_url = descriptor.index_url();
        let unavailable = |reason: String| ExtractionError::IndexUnavailable {
            url: index_url.clone(),
            reason,
        };

        let text = self
            .source
            .get_text(&index_url)
            .await
            .map_err(|e| unavailable(e.to_string()))?;
        let catalog = IndexCatalog::parse(&text).map_err(|e| unavailable(e.to_string()))?;

        let selection = catalog.select(&spec.rule, &descriptor.url)?;
        debug!(url = %descriptor.url, ranges = selection.len(), "Matched index lines");

        // Every variable the index offered has to come back from the decoder
        let expected: Vec<String> = spec
            .variables
            .iter()
            .filter(|v| {
                spec.rule.require_all_matches
                    || selection
                        .matches
                        .iter()
                        .any(|m| m.parameter.as_deref() == Some(v.raw_name.as_str()))
            })
            .map(|v| v.raw_name.clone())
            .collect();

        let buffer = self
            .fetcher
            .fetch(&descriptor.url, &selection.ranges())
            .await?;

        let decoder = Arc::clone(&self.decoder);
        let cells = Arc::clone(&self.cells);
        let stations = Arc::clone(&self.stations);
        let descriptor = descriptor.clone();
        let url = descriptor.url.clone();

        // Decode and the grid search are CPU bound
        tokio::task::spawn_blocking(move || {
            let fields = decoder
                .decode(&buffer)
                .map_err(|e| ExtractionError::DecodeFailure {
                    url: descriptor.url.clone(),
                    reason: e.to_string(),
                })?;
            assemble(&fields, &stations, &cells, &spec, &expected, &descriptor)
        })
        .await
        .map_err(|e| ExtractionError::DecodeFailure {
            url,
            reason: format!("decode task failed: {}", e),
        })?
    }
}

/// Turn decoded fields into one record per (station, step). A step that
/// lacks any of the `expected` raw names fails the whole file.
fn assemble(
    fields: &[GridField],
    stations: &[Station],
    cells: &NearestNeighborIndex,
    spec: &ExtractionSpec,
    expected: &[String],
    descriptor: &RemoteFileDescriptor,
) -> Result<Extraction, ExtractionError> {
    // step -> raw name -> field; the first field of a name in a step wins
    let mut steps: BTreeMap<u32, HashMap<&str, &GridField>> = BTreeMap::new();
    for field in fields {
        if spec.variable(&field.name).is_none() {
            debug!(field = %field.name, "Ignoring unrequested field");
            continue;
        }
        let step = field.step_hours.unwrap_or(descriptor.forecast_hour);
        let by_name = steps.entry(step).or_default();
        if by_name.contains_key(field.name.as_str()) {
            debug!(field = %field.name, step, "Ignoring repeated field");
            continue;
        }
        by_name.insert(field.name.as_str(), field);
    }

    if steps.is_empty() {
        return Err(ExtractionError::DecodeFailure {
            url: descriptor.url.clone(),
            reason: format!(
                "decoded {} fields, none of {:?}",
                fields.len(),
                spec.variables.iter().map(|v| &v.raw_name).collect::<Vec<_>>()
            ),
        });
    }

    for (step, by_name) in &steps {
        let missing: Vec<&str> = expected
            .iter()
            .map(String::as_str)
            .filter(|name| !by_name.contains_key(name))
            .collect();
        if !missing.is_empty() {
            return Err(ExtractionError::DecodeFailure {
                url: descriptor.url.clone(),
                reason: format!("step {} missing {:?}", step, missing),
            });
        }
    }

    let mut located: HashMap<GridSignature, Vec<Option<Cell>>> = HashMap::new();
    for field in steps.values().flat_map(|by_name| by_name.values()) {
        let geometry = &field.geometry;
        located
            .entry(geometry.signature())
            .or_insert_with(|| cells.locate_all(geometry, stations));
    }

    let mut extraction = Extraction::default();
    for (&step, by_name) in &steps {
        let valid_time = by_name
            .values()
            .find_map(|f| f.valid_time)
            .unwrap_or_else(|| descriptor.init_time + chrono::Duration::hours(i64::from(step)));

        let rows: Vec<Result<ExtractionRecord, StationFailure>> = stations
            .par_iter()
            .enumerate()
            .map(|(i, station)| {
                let mut builder = ExtractionRecord::builder()
                    .station_id(station.id.as_str())
                    .valid_time(valid_time)
                    .forecast_hour(step);

                for variable in &spec.variables {
                    let Some(field) = by_name.get(variable.raw_name.as_str()) else {
                        continue;
                    };
                    let cell = located
                        .get(&field.geometry.signature())
                        .and_then(|cells| cells.get(i).copied().flatten());
                    let value = cell.and_then(|c| field.value_at(c));

                    match value {
                        Some(raw) => {
                            builder = builder
                                .value(variable.canonical_name.as_str(), variable.convert(f64::from(raw)));
                        }
                        None => {
                            return Err(StationFailure {
                                station_id: station.id.clone(),
                                forecast_hour: step,
                                reason: format!("missing {} value", variable.raw_name),
                            });
                        }
                    }
                }

                builder.build().ok_or_else(|| StationFailure {
                    station_id: station.id.clone(),
                    forecast_hour: step,
                    reason: "record has no time".to_string(),
                })
            })
            .collect();

        for row in rows {
            match row {
                Ok(record) => extraction.records.push(record),
                Err(failure) => {
                    debug!(
                        station = %failure.station_id,
                        step = failure.forecast_hour,
                        "Station omitted: {}",
                        failure.reason
                    );
                    extraction.station_failures.push(failure);
                }
            }
        }
    }

    Ok(extraction)
}
