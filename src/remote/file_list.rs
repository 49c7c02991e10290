use chrono::{DateTime, Duration, NaiveDate, TimeZone, Timelike, Utc};
use std::sync::Arc;
use tracing::debug;

use crate::error::{ArchiverError, Result};
use crate::models::{Element, Model, RemoteFileDescriptor};
use crate::registry::{ModelRegistry, ModelSource};

/// Generates descriptors for a model/element over a range of cycles from
/// the registry's path templates.
pub struct FileLister {
    registry: Arc<ModelRegistry>,
}

impl FileLister {
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self { registry }
    }

    /// Every cycle in `[start, end]` aligned to the model's cycle length,
    /// crossed with the element's forecast hours.
    pub fn list(
        &self,
        model: Model,
        element: Element,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<RemoteFileDescriptor>> {
        if end < start {
            return Err(ArchiverError::Config(format!(
                "End {} precedes start {}",
                end, start
            )));
        }

        let source = self.registry.source(model)?;
        let spec = self.registry.spec(model, element)?;

        let mut descriptors = Vec::new();
        for cycle in cycles(source.cycle_hours, start, end) {
            for &hour in &spec.forecast_hours {
                let url = expand_url(source, cycle, hour);
                descriptors.push(RemoteFileDescriptor::new(url, model, element, cycle, hour));
            }
        }

        debug!(
            model = %model,
            element = %element,
            files = descriptors.len(),
            "Listed remote files"
        );
        Ok(descriptors)
    }
}

fn cycles(cycle_hours: u32, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<DateTime<Utc>> {
    let step = cycle_hours.max(1);
    let aligned_hour = start.hour() - start.hour() % step;
    let mut cycle = Utc.from_utc_datetime(
        &start
            .date_naive()
            .and_hms_opt(aligned_hour, 0, 0)
            .unwrap_or_default(),
    );
    if cycle < start {
        cycle += Duration::hours(i64::from(step));
    }

    let mut out = Vec::new();
    while cycle <= end {
        out.push(cycle);
        cycle += Duration::hours(i64::from(step));
    }
    out
}

/// Fill a source's path template for one cycle and forecast hour.
pub fn expand_url(source: &ModelSource, cycle: DateTime<Utc>, forecast_hour: u32) -> String {
    let path = source
        .path_template
        .replace("{date}", &cycle.format("%Y%m%d").to_string())
        .replace("{cycle}", &cycle.format("%H").to_string())
        .replace("{fhour3}", &format!("{:03}", forecast_hour))
        .replace("{fhour2}", &format!("{:02}", forecast_hour))
        .replace("{domain}", &source.domain);

    format!("{}/{}", source.base_url.trim_end_matches('/'), path)
}

/// Recover the cycle time and forecast hour from a model file URL such as
/// `.../blend.20250101/12/core/blend.t12z.core.f036.ak.grib2`.
pub fn descriptor_from_url(
    url: &str,
    model: Model,
    element: Element,
) -> Result<RemoteFileDescriptor> {
    let invalid = |what: &str| ArchiverError::InvalidFormat(format!("No {} in URL '{}'", what, url));

    let file_name = url.rsplit('/').next().unwrap_or(url);
    let date = url
        .split('/')
        .find_map(date_in_segment)
        .ok_or_else(|| invalid("YYYYMMDD date"))?;
    let hour = cycle_hour(file_name).ok_or_else(|| invalid("tHHz cycle"))?;
    let forecast_hour = forecast_hour(file_name)
        .or_else(|| model.is_analysis().then_some(0))
        .ok_or_else(|| invalid("fNNN forecast hour"))?;

    let init = date
        .and_hms_opt(hour, 0, 0)
        .map(|naive| Utc.from_utc_datetime(&naive))
        .ok_or_else(|| invalid("valid cycle hour"))?;

    Ok(RemoteFileDescriptor::new(url, model, element, init, forecast_hour))
}

fn date_in_segment(segment: &str) -> Option<NaiveDate> {
    let candidate = segment.rsplit('.').next()?;
    if candidate.len() != 8 || !candidate.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    NaiveDate::parse_from_str(candidate, "%Y%m%d").ok()
}

/// `tHHz`
fn cycle_hour(file_name: &str) -> Option<u32> {
    let bytes = file_name.as_bytes();
    bytes.windows(4).find_map(|w| {
        if w[0] == b't' && w[3] == b'z' && w[1].is_ascii_digit() && w[2].is_ascii_digit() {
            let hour = u32::from(w[1] - b'0') * 10 + u32::from(w[2] - b'0');
            (hour < 24).then_some(hour)
        } else {
            None
        }
    })
}

/// `fNN.` or `fNNN.`, last occurrence
fn forecast_hour(file_name: &str) -> Option<u32> {
    let bytes = file_name.as_bytes();
    let mut found = None;

    for (i, &b) in bytes.iter().enumerate() {
        if b != b'f' {
            continue;
        }
        let digits: usize = bytes[i + 1..]
            .iter()
            .take_while(|c| c.is_ascii_digit())
            .count();
        let terminated = bytes.get(i + 1 + digits) == Some(&b'.');
        if (2..=3).contains(&digits) && terminated {
            found = file_name[i + 1..i + 1 + digits].parse().ok();
        }
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_descriptor_from_nbm_url() {
        let url = "https://noaa-nbm-grib2-pds.s3.amazonaws.com/blend.20250101/12/core/blend.t12z.core.f036.ak.grib2";
        let descriptor = descriptor_from_url(url, Model::Nbm, Element::Wind).unwrap();

        assert_eq!(
            descriptor.init_time,
            Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap()
        );
        assert_eq!(descriptor.forecast_hour, 36);
        assert_eq!(
            descriptor.valid_time(),
            Utc.with_ymd_and_hms(2025, 1, 3, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_descriptor_from_hrrr_url() {
        let url = "https://noaa-hrrr-bdp-pds.s3.amazonaws.com/hrrr.20240229/alaska/hrrr.t06z.wrfsfcf18.ak.grib2";
        let descriptor = descriptor_from_url(url, Model::Hrrr, Element::Wind).unwrap();

        assert_eq!(
            descriptor.init_time,
            Utc.with_ymd_and_hms(2024, 2, 29, 6, 0, 0).unwrap()
        );
        assert_eq!(descriptor.forecast_hour, 18);
    }

    #[test]
    fn test_descriptor_from_unrecognised_url() {
        assert!(descriptor_from_url("https://example.com/file.grib2", Model::Nbm, Element::Wind).is_err());
        assert!(descriptor_from_url(
            "https://example.com/blend.20250101/blend.t12z.core.ak.grib2",
            Model::Nbm,
            Element::Wind
        )
        .is_err());
    }

    #[test]
    fn test_list_aligns_cycles_and_expands_template() {
        let registry = Arc::new(ModelRegistry::builtin().unwrap());
        let lister = FileLister::new(registry.clone());

        let start = Utc.with_ymd_and_hms(2025, 1, 1, 1, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
        let files = lister.list(Model::Nbm, Element::Wind, start, end).unwrap();

        let hours = registry
            .spec(Model::Nbm, Element::Wind)
            .unwrap()
            .forecast_hours
            .len();
        // cycles 06 and 12
        assert_eq!(files.len(), 2 * hours);
        assert_eq!(
            files[0].url,
            "https://noaa-nbm-grib2-pds.s3.amazonaws.com/blend.20250101/06/core/blend.t06z.core.f005.ak.grib2"
        );
        assert_eq!(files[0].init_time, Utc.with_ymd_and_hms(2025, 1, 1, 6, 0, 0).unwrap());

        let round_trip = descriptor_from_url(&files[0].url, Model::Nbm, Element::Wind).unwrap();
        assert_eq!(round_trip, files[0]);
    }

    #[test]
    fn test_list_urma_analysis_cycles() {
        let lister = FileLister::new(Arc::new(ModelRegistry::builtin().unwrap()));
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 1, 1, 6, 0, 0).unwrap();

        let files = lister.list(Model::Urma, Element::Wind, start, end).unwrap();
        // cycles 00, 03 and 06, analysis only
        assert_eq!(files.len(), 3);
        assert!(files.iter().all(|f| f.forecast_hour == 0));
        assert_eq!(
            files[1].url,
            "https://noaa-urma-pds.s3.amazonaws.com/akurma.20250101/akurma.t03z.2dvaranl_ndfd_3p0.grb2"
        );

        let round_trip = descriptor_from_url(&files[1].url, Model::Urma, Element::Wind).unwrap();
        assert_eq!(round_trip, files[1]);
        assert_eq!(round_trip.valid_time(), round_trip.init_time);
        // A forecast model still needs its hour
        assert!(descriptor_from_url(&files[1].url, Model::Nbm, Element::Wind).is_err());
    }

    #[test]
    fn test_list_rejects_reversed_range_and_unknown_pair() {
        let lister = FileLister::new(Arc::new(ModelRegistry::builtin().unwrap()));
        let start = Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();

        assert!(lister.list(Model::Nbm, Element::Wind, start, end).is_err());
        assert!(lister.list(Model::Gfs, Element::Wind, end, start).is_err());
    }
}
