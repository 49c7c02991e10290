use chrono::{DateTime, Utc};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::error::{ArchiverError, Result};
use crate::utils::geo::normalize_longitude;

/// Row/column of a grid cell, row-major.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cell {
    pub row: usize,
    pub col: usize,
}

impl Cell {
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

/// Identity of a grid's shape and registration. Two grids with the same
/// signature map every station to the same cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GridSignature(u64);

impl GridSignature {
    pub fn value(&self) -> u64 {
        self.0
    }
}

/// Cell-centre coordinates of a grid, stored per cell in row-major order so
/// projected grids (where latitude varies along a row) are handled the same
/// way as regular latitude/longitude meshes.
#[derive(Debug, Clone, PartialEq)]
pub struct GridGeometry {
    rows: usize,
    cols: usize,
    latitudes: Vec<f64>,
    longitudes: Vec<f64>,
    signature: GridSignature,
}

impl GridGeometry {
    /// Build from per-cell coordinates. Longitudes are normalized to
    /// (-180, 180] so they compare directly with signed station longitudes.
    pub fn new(
        rows: usize,
        cols: usize,
        latitudes: Vec<f64>,
        longitudes: Vec<f64>,
    ) -> Result<Self> {
        let expected = rows * cols;
        if expected == 0 {
            return Err(ArchiverError::InvalidFormat(
                "Grid must have at least one cell".to_string(),
            ));
        }
        if latitudes.len() != expected || longitudes.len() != expected {
            return Err(ArchiverError::InvalidFormat(format!(
                "Grid {}x{} expects {} coordinates, got {} latitudes and {} longitudes",
                rows,
                cols,
                expected,
                latitudes.len(),
                longitudes.len()
            )));
        }

        let longitudes: Vec<f64> = longitudes.into_iter().map(normalize_longitude).collect();
        let signature = Self::compute_signature(rows, cols, &latitudes, &longitudes);

        Ok(Self {
            rows,
            cols,
            latitudes,
            longitudes,
            signature,
        })
    }

    /// Build a regular mesh from 1-D latitude (rows) and longitude (columns) axes.
    pub fn regular(latitudes: &[f64], longitudes: &[f64]) -> Result<Self> {
        let rows = latitudes.len();
        let cols = longitudes.len();
        let mut lat_grid = Vec::with_capacity(rows * cols);
        let mut lon_grid = Vec::with_capacity(rows * cols);

        for &lat in latitudes {
            for &lon in longitudes {
                lat_grid.push(lat);
                lon_grid.push(lon);
            }
        }

        Self::new(rows, cols, lat_grid, lon_grid)
    }

    fn compute_signature(
        rows: usize,
        cols: usize,
        latitudes: &[f64],
        longitudes: &[f64],
    ) -> GridSignature {
        let mut hasher = DefaultHasher::new();
        rows.hash(&mut hasher);
        cols.hash(&mut hasher);

        let last = rows * cols - 1;
        let probes = [0, cols - 1, last + 1 - cols, last, last / 2];
        for idx in probes {
            latitudes[idx].to_bits().hash(&mut hasher);
            longitudes[idx].to_bits().hash(&mut hasher);
        }

        let (lat_min, lat_max) = bounds(latitudes);
        let (lon_min, lon_max) = bounds(longitudes);
        for v in [lat_min, lat_max, lon_min, lon_max] {
            v.to_bits().hash(&mut hasher);
        }

        GridSignature(hasher.finish())
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn latitudes(&self) -> &[f64] {
        &self.latitudes
    }

    pub fn longitudes(&self) -> &[f64] {
        &self.longitudes
    }

    pub fn signature(&self) -> GridSignature {
        self.signature
    }

    pub fn cell_of(&self, flat_index: usize) -> Cell {
        Cell::new(flat_index / self.cols, flat_index % self.cols)
    }

    pub fn flat_index(&self, cell: Cell) -> usize {
        cell.row * self.cols + cell.col
    }
}

fn bounds(values: &[f64]) -> (f64, f64) {
    values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        })
}

/// One decoded 2-D field.
#[derive(Debug, Clone)]
pub struct GridField {
    pub name: String,
    pub values: Vec<f32>,
    pub geometry: Arc<GridGeometry>,
    pub valid_time: Option<DateTime<Utc>>,
    pub step_hours: Option<u32>,
}

impl GridField {
    pub fn new(name: impl Into<String>, values: Vec<f32>, geometry: Arc<GridGeometry>) -> Result<Self> {
        let name = name.into();
        if values.len() != geometry.len() {
            return Err(ArchiverError::InvalidFormat(format!(
                "Field '{}' has {} values for a grid of {} cells",
                name,
                values.len(),
                geometry.len()
            )));
        }

        Ok(Self {
            name,
            values,
            geometry,
            valid_time: None,
            step_hours: None,
        })
    }

    pub fn with_step_hours(mut self, step_hours: u32) -> Self {
        self.step_hours = Some(step_hours);
        self
    }

    pub fn with_valid_time(mut self, valid_time: DateTime<Utc>) -> Self {
        self.valid_time = Some(valid_time);
        self
    }

    /// Value at a cell; `None` for missing (bitmapped) points.
    pub fn value_at(&self, cell: Cell) -> Option<f32> {
        self.values
            .get(self.geometry.flat_index(cell))
            .copied()
            .filter(|v| v.is_finite())
    }
}
