use rayon::prelude::*;
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::debug;

use crate::models::{Cell, GridGeometry, GridSignature, Station};
use crate::utils::geo::{chebyshev_distance, normalize_longitude};

/// Station id to nearest cell for one grid. `None` records a station for
/// which no cell had finite coordinates.
pub type StationCellIndex = HashMap<String, Option<Cell>>;

/// Nearest cell by Chebyshev distance in degrees. Ties go to the first cell
/// in row-major order. Points outside the grid land on the closest edge cell.
pub fn nearest_cell(geometry: &GridGeometry, latitude: f64, longitude: f64) -> Option<Cell> {
    let longitude = normalize_longitude(longitude);
    let mut best: Option<(usize, f64)> = None;

    for (idx, (&lat, &lon)) in geometry
        .latitudes()
        .iter()
        .zip(geometry.longitudes())
        .enumerate()
    {
        if !lat.is_finite() || !lon.is_finite() {
            continue;
        }
        let distance = chebyshev_distance(latitude, longitude, lat, lon);
        match best {
            Some((_, best_distance)) if distance >= best_distance => {}
            _ => best = Some((idx, distance)),
        }
    }

    best.map(|(idx, _)| geometry.cell_of(idx))
}

/// Station-to-cell cache partitioned by grid signature, shared across
/// workers. Concurrent inserts for the same key always carry the same value,
/// so the last writer winning is harmless.
#[derive(Debug, Default)]
pub struct NearestNeighborIndex {
    grids: RwLock<HashMap<GridSignature, StationCellIndex>>,
}

impl NearestNeighborIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn locate(&self, geometry: &GridGeometry, station: &Station) -> Option<Cell> {
        let signature = geometry.signature();
        {
            let grids = self.grids.read().unwrap_or_else(|e| e.into_inner());
            if let Some(cell) = grids.get(&signature).and_then(|index| index.get(&station.id)) {
                return *cell;
            }
        }

        let cell = nearest_cell(geometry, station.latitude, station.longitude);
        let mut grids = self.grids.write().unwrap_or_else(|e| e.into_inner());
        grids
            .entry(signature)
            .or_default()
            .insert(station.id.clone(), cell);
        cell
    }

    /// Cells for a whole roster, in roster order. Stations not yet cached
    /// for this grid are searched in parallel.
    pub fn locate_all(&self, geometry: &GridGeometry, stations: &[Station]) -> Vec<Option<Cell>> {
        let signature = geometry.signature();

        let missing: Vec<&Station> = {
            let grids = self.grids.read().unwrap_or_else(|e| e.into_inner());
            let index = grids.get(&signature);
            stations
                .iter()
                .filter(|s| index.map_or(true, |i| !i.contains_key(&s.id)))
                .collect()
        };

        if !missing.is_empty() {
            debug!(
                grid = signature.value(),
                stations = missing.len(),
                "Searching nearest cells"
            );
            let found: Vec<(String, Option<Cell>)> = missing
                .par_iter()
                .map(|s| (s.id.clone(), nearest_cell(geometry, s.latitude, s.longitude)))
                .collect();

            let mut grids = self.grids.write().unwrap_or_else(|e| e.into_inner());
            grids.entry(signature).or_default().extend(found);
        }

        let grids = self.grids.read().unwrap_or_else(|e| e.into_inner());
        let index = grids.get(&signature);
        stations
            .iter()
            .map(|s| index.and_then(|i| i.get(&s.id).copied().flatten()))
            .collect()
    }

    /// Number of distinct grids with cached cells.
    pub fn grid_count(&self) -> usize {
        self.grids.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn cached_stations(&self, signature: GridSignature) -> usize {
        self.grids
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&signature)
            .map_or(0, |index| index.len())
    }
}
