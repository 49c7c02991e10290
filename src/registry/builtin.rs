use crate::models::{Element, Model};
use crate::utils::constants::{
    KELVIN_TO_FAHRENHEIT_FACTOR, KELVIN_TO_FAHRENHEIT_OFFSET, MM_TO_INCHES, MS_TO_KNOTS,
    PRECISION_ANGLE, PRECISION_RATE, PRECISION_TEMPERATURE,
};

use super::spec::{ExtractionSpec, FieldMatchRule, ModelSource, VariableSpec};

const NBM_BUCKET: &str = "https://noaa-nbm-grib2-pds.s3.amazonaws.com";
const NBM_PARA_BUCKET: &str = "https://noaa-nbm-para-pds.s3.amazonaws.com";
const HRRR_BUCKET: &str = "https://noaa-hrrr-bdp-pds.s3.amazonaws.com";
const URMA_BUCKET: &str = "https://noaa-urma-pds.s3.amazonaws.com";

const CORE_TEMPLATE: &str = "blend.{date}/{cycle}/core/blend.t{cycle}z.core.f{fhour3}.{domain}.grib2";
const QMD_TEMPLATE: &str = "blend.{date}/{cycle}/qmd/blend.t{cycle}z.qmd.f{fhour3}.{domain}.grib2";
const HRRR_TEMPLATE: &str = "hrrr.{date}/alaska/hrrr.t{cycle}z.wrfsfcf{fhour2}.{domain}.grib2";
const URMA_TEMPLATE: &str = "{domain}urma.{date}/{domain}urma.t{cycle}z.2dvaranl_ndfd_3p0.grb2";

const ENSEMBLE_SPREAD: &str = "ens std dev";
const PERCENTILE: &str = "% level";
const PROBABILITY: &str = "prob";

pub(super) fn sources() -> Vec<ModelSource> {
    vec![
        source(Model::Nbm, NBM_BUCKET, CORE_TEMPLATE, 6),
        source(Model::Nbmqmd, NBM_BUCKET, QMD_TEMPLATE, 12),
        source(Model::NbmqmdExp, NBM_PARA_BUCKET, QMD_TEMPLATE, 12),
        source(Model::Hrrr, HRRR_BUCKET, HRRR_TEMPLATE, 6),
        source(Model::Urma, URMA_BUCKET, URMA_TEMPLATE, 3),
    ]
}

fn source(model: Model, base_url: &str, path_template: &str, cycle_hours: u32) -> ModelSource {
    ModelSource {
        model,
        base_url: base_url.to_string(),
        path_template: path_template.to_string(),
        domain: "ak".to_string(),
        cycle_hours,
    }
}

fn every_six_hours_from(first: u32, last: u32) -> Vec<u32> {
    (first..=last).step_by(6).collect()
}

fn ten_metre_wind(model: Model, forecast_hours: Vec<u32>) -> ExtractionSpec {
    ExtractionSpec {
        model,
        element: Element::Wind,
        rule: FieldMatchRule::new(&[":WIND:10 m above", ":WDIR:10 m above", ":GUST:10 m above"])
            .with_must_contain(&["10 m above ground"])
            .with_must_not_contain(&[ENSEMBLE_SPREAD]),
        forecast_hours,
        variables: vec![
            wind_speed(),
            VariableSpec::new("WDIR", "wind_dir_deg", 1.0, PRECISION_ANGLE),
            wind_gust(),
        ],
    }
}

fn wind_speed() -> VariableSpec {
    VariableSpec::new("WIND", "wind_speed_kt", MS_TO_KNOTS, PRECISION_RATE)
}

fn wind_gust() -> VariableSpec {
    VariableSpec::new("GUST", "wind_gust_kt", MS_TO_KNOTS, PRECISION_RATE)
}

fn temperature(canonical_name: &str) -> VariableSpec {
    VariableSpec::new(
        "TMP",
        canonical_name,
        KELVIN_TO_FAHRENHEIT_FACTOR,
        PRECISION_TEMPERATURE,
    )
    .with_offset(KELVIN_TO_FAHRENHEIT_OFFSET)
}

fn precip24(model: Model) -> ExtractionSpec {
    ExtractionSpec {
        model,
        element: Element::Precip24hr,
        rule: FieldMatchRule::new(&[":APCP:surface:"])
            .with_must_contain(&["APCP:surface", "acc fcst"])
            .with_must_not_contain(&[ENSEMBLE_SPREAD, PERCENTILE, PROBABILITY]),
        forecast_hours: (1..=7).map(|day| day * 24).collect(),
        variables: vec![VariableSpec::new(
            "APCP",
            "precip_accum_24hr_in",
            MM_TO_INCHES,
            PRECISION_RATE,
        )],
    }
}

fn extreme_temperature(model: Model, element: Element, canonical_name: &str) -> ExtractionSpec {
    ExtractionSpec {
        model,
        element,
        rule: FieldMatchRule::new(&[":TMP:2 m above ground:"])
            .with_must_not_contain(&[ENSEMBLE_SPREAD, PERCENTILE, PROBABILITY]),
        forecast_hours: (1..=7).map(|day| day * 24).collect(),
        variables: vec![temperature(canonical_name)],
    }
}

pub(super) fn specs() -> Vec<ExtractionSpec> {
    let mut specs = vec![
        ten_metre_wind(Model::Nbm, every_six_hours_from(5, 167)),
        // Analysis only
        ten_metre_wind(Model::Urma, vec![0]),
        ExtractionSpec {
            model: Model::NbmqmdExp,
            element: Element::Wind,
            rule: FieldMatchRule::new(&[":WIND:10 m above"])
                .with_must_not_contain(&[ENSEMBLE_SPREAD, PERCENTILE, PROBABILITY]),
            forecast_hours: every_six_hours_from(5, 167),
            variables: vec![wind_speed()],
        },
        ExtractionSpec {
            model: Model::NbmqmdExp,
            element: Element::Gust,
            rule: FieldMatchRule::new(&[":GUST:10 m above"])
                .with_must_not_contain(&[ENSEMBLE_SPREAD, PERCENTILE, PROBABILITY]),
            forecast_hours: every_six_hours_from(5, 167),
            variables: vec![wind_gust()],
        },
        ExtractionSpec {
            model: Model::Hrrr,
            element: Element::Wind,
            rule: FieldMatchRule::new(&[":UGRD:10 m above", ":VGRD:10 m above", ":GUST:surface"])
                .with_must_not_contain(&[ENSEMBLE_SPREAD]),
            forecast_hours: every_six_hours_from(0, 48),
            variables: vec![
                VariableSpec::new("UGRD", "u_wind_kt", MS_TO_KNOTS, PRECISION_RATE),
                VariableSpec::new("VGRD", "v_wind_kt", MS_TO_KNOTS, PRECISION_RATE),
                wind_gust(),
            ],
        },
    ];

    for model in [Model::Nbmqmd, Model::NbmqmdExp] {
        specs.push(precip24(model));
        specs.push(extreme_temperature(model, Element::Maxt, "max_temp_f"));
        specs.push(extreme_temperature(model, Element::Mint, "min_temp_f"));
    }

    specs
}
