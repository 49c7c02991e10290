use std::io::Cursor;
use std::sync::Arc;
use tracing::{debug, warn};

use super::parameters::ParameterTable;
use super::sections::{scan_submessages, SubmessageInfo};
use super::GridDecoder;
use crate::error::{ArchiverError, Result};
use crate::models::{GridField, GridGeometry};

/// Grid templates whose coordinates are only computed with the `proj` feature.
const PROJECTED_GRIDS: [(u16, &str); 3] = [
    (10, "Mercator"),
    (20, "polar stereographic"),
    (30, "Lambert conformal"),
];

/// Why a grid cannot be located in this build, if it cannot.
fn missing_projection_support(template: u16, proj_enabled: bool) -> Option<String> {
    if proj_enabled {
        return None;
    }
    PROJECTED_GRIDS
        .iter()
        .find(|(t, _)| *t == template)
        .map(|(t, name)| {
            format!(
                "{} grid (template 3.{}) needs the `proj` feature; rebuild with `--features proj`",
                name, t
            )
        })
}

fn apply_times(mut field: GridField, info: Option<&SubmessageInfo>) -> GridField {
    if let Some(info) = info {
        if let Some(step) = info.step_hours {
            field = field.with_step_hours(step);
        }
        if let Some(valid_time) = info.valid_time {
            field = field.with_valid_time(valid_time);
        }
    }
    field
}

/// Decodes GRIB2 messages (as concatenated by the range fetcher) into named
/// fields. Field names are the GRIB2 short names from [`ParameterTable`];
/// step and valid time come from sections 1 and 4 when present.
#[derive(Debug, Clone, Default)]
pub struct GribDecoder {
    parameters: ParameterTable,
}

impl GribDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parameters(parameters: ParameterTable) -> Self {
        Self { parameters }
    }
}

fn grib_error(context: &str, err: impl std::fmt::Display) -> ArchiverError {
    ArchiverError::InvalidFormat(format!("{}: {}", context, err))
}

impl GridDecoder for GribDecoder {
    fn decode(&self, buffer: &[u8]) -> Result<Vec<GridField>> {
        let grib2 = grib::from_reader(Cursor::new(buffer))
            .map_err(|e| grib_error("GRIB2 parse failed", e))?;

        let infos = scan_submessages(buffer);
        let mut fields = Vec::new();
        let mut geometries: Vec<Arc<GridGeometry>> = Vec::new();

        for (position, ((message, submessage_index), submessage)) in grib2.iter().enumerate() {
            let info = infos.get(position);
            let discipline = submessage.indicator().discipline;
            let prod_def = submessage.prod_def();
            let (category, number) = match (prod_def.parameter_category(), prod_def.parameter_number()) {
                (Some(category), Some(number)) => (category, number),
                _ => {
                    warn!(message, submessage_index, "Submessage without parameter codes, skipping");
                    continue;
                }
            };
            let name = self.parameters.name(discipline, category, number);

            if let Some(reason) = info
                .and_then(|i| i.grid_template)
                .and_then(|t| missing_projection_support(t, cfg!(feature = "proj")))
            {
                return Err(ArchiverError::InvalidFormat(reason));
            }

            let (ni, nj) = submessage
                .grid_shape()
                .map_err(|e| grib_error("unsupported grid", e))?;
            let (latitudes, longitudes): (Vec<f64>, Vec<f64>) = submessage
                .latlons()
                .map_err(|e| grib_error("grid coordinates unavailable", e))?
                .map(|(lat, lon)| (f64::from(lat), f64::from(lon)))
                .unzip();
            let geometry = GridGeometry::new(nj, ni, latitudes, longitudes)?;

            // Fields of one file nearly always share a grid
            let geometry = match geometries.iter().find(|g| ***g == geometry) {
                Some(existing) => Arc::clone(existing),
                None => {
                    let shared = Arc::new(geometry);
                    geometries.push(Arc::clone(&shared));
                    shared
                }
            };

            let decoder = grib::Grib2SubmessageDecoder::from(submessage)
                .map_err(|e| grib_error("unsupported packing", e))?;
            let values: Vec<f32> = decoder
                .dispatch()
                .map_err(|e| grib_error("value decode failed", e))?
                .collect();

            debug!(
                field = %name,
                rows = nj,
                cols = ni,
                step = ?info.and_then(|i| i.step_hours),
                "Decoded GRIB2 field"
            );
            fields.push(apply_times(GridField::new(name, values, geometry)?, info));
        }

        if fields.is_empty() {
            return Err(ArchiverError::InvalidFormat(
                "buffer held no decodable GRIB2 fields".to_string(),
            ));
        }

        Ok(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_rejects_non_grib_buffer() {
        let decoder = GribDecoder::new();
        assert!(decoder.decode(b"definitely not a grib message").is_err());
        assert!(decoder.decode(&[]).is_err());
    }

    #[test]
    fn test_projected_grids_need_proj_feature() {
        let reason = missing_projection_support(20, false).unwrap();
        assert!(reason.contains("polar stereographic"));
        assert!(reason.contains("--features proj"));
        assert!(missing_projection_support(30, false).is_some());

        assert_eq!(missing_projection_support(20, true), None);
        // Regular lat/lon needs no projection
        assert_eq!(missing_projection_support(0, false), None);
    }

    #[test]
    fn test_times_applied_from_sections() {
        let geometry = Arc::new(GridGeometry::regular(&[60.0], &[210.0]).unwrap());
        let valid = Utc.with_ymd_and_hms(2025, 1, 2, 12, 0, 0).unwrap();
        let info = SubmessageInfo {
            grid_template: Some(0),
            reference_time: Some(Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap()),
            step_hours: Some(24),
            valid_time: Some(valid),
        };

        let field = apply_times(
            GridField::new("APCP", vec![1.0], Arc::clone(&geometry)).unwrap(),
            Some(&info),
        );
        assert_eq!(field.step_hours, Some(24));
        assert_eq!(field.valid_time, Some(valid));

        let bare = apply_times(GridField::new("APCP", vec![1.0], geometry).unwrap(), None);
        assert_eq!(bare.step_hours, None);
        assert_eq!(bare.valid_time, None);
    }
}
