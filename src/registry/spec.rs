use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use validator::Validate;

use crate::error::{ArchiverError, Result};
use crate::models::{Element, Model};
use crate::utils::constants::MAX_PRECISION;
use crate::utils::geo::round_to;

fn default_true() -> bool {
    true
}

fn default_factor() -> f64 {
    1.0
}

fn default_precision() -> u32 {
    crate::utils::constants::PRECISION_RATE
}

/// Selects lines of a sidecar index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMatchRule {
    /// Every phrase must appear in a line for it to be considered
    #[serde(default)]
    pub must_contain: Vec<String>,
    /// Any phrase appearing in a line excludes it
    #[serde(default)]
    pub must_not_contain: Vec<String>,
    /// A considered line is selected when it contains one of these
    pub field_tokens: Vec<String>,
    #[serde(default = "default_true")]
    pub require_all_matches: bool,
}

impl FieldMatchRule {
    pub fn new(field_tokens: &[&str]) -> Self {
        Self {
            must_contain: Vec::new(),
            must_not_contain: Vec::new(),
            field_tokens: field_tokens.iter().map(|s| s.to_string()).collect(),
            require_all_matches: true,
        }
    }

    pub fn with_must_contain(mut self, phrases: &[&str]) -> Self {
        self.must_contain = phrases.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_must_not_contain(mut self, phrases: &[&str]) -> Self {
        self.must_not_contain = phrases.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_require_all_matches(mut self, require_all_matches: bool) -> Self {
        self.require_all_matches = require_all_matches;
        self
    }
}

/// Rename, unit conversion and rounding for one decoded field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct VariableSpec {
    /// Field name as produced by the decoder (GRIB2 abbreviation)
    #[validate(length(min = 1))]
    pub raw_name: String,

    /// Column name in the archive
    #[validate(length(min = 1))]
    pub canonical_name: String,

    #[serde(default = "default_factor")]
    pub unit_factor: f64,

    #[serde(default)]
    pub unit_offset: f64,

    /// Decimal places kept after conversion
    #[serde(default = "default_precision")]
    #[validate(range(max = 6))]
    pub precision: u32,
}

impl VariableSpec {
    pub fn new(raw_name: &str, canonical_name: &str, unit_factor: f64, precision: u32) -> Self {
        Self {
            raw_name: raw_name.to_string(),
            canonical_name: canonical_name.to_string(),
            unit_factor,
            unit_offset: 0.0,
            precision,
        }
    }

    pub fn with_offset(mut self, unit_offset: f64) -> Self {
        self.unit_offset = unit_offset;
        self
    }

    /// Apply the unit conversion and round to the documented precision.
    pub fn convert(&self, raw: f64) -> f64 {
        round_to(raw * self.unit_factor + self.unit_offset, self.precision)
    }
}

/// Everything needed to extract one element from one model's files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionSpec {
    pub model: Model,
    pub element: Element,
    pub rule: FieldMatchRule,
    #[serde(default)]
    pub forecast_hours: Vec<u32>,
    pub variables: Vec<VariableSpec>,
}

impl ExtractionSpec {
    pub fn variable(&self, raw_name: &str) -> Option<&VariableSpec> {
        self.variables.iter().find(|v| v.raw_name == raw_name)
    }

    pub fn canonical_names(&self) -> Vec<&str> {
        self.variables
            .iter()
            .map(|v| v.canonical_name.as_str())
            .collect()
    }

    pub fn validate_spec(&self) -> Result<()> {
        let label = format!("{}/{}", self.model, self.element);

        if self.rule.field_tokens.is_empty() {
            return Err(ArchiverError::Config(format!(
                "{}: at least one field token is required",
                label
            )));
        }
        if self.rule.field_tokens.iter().any(|t| t.is_empty()) {
            return Err(ArchiverError::Config(format!(
                "{}: field tokens must not be empty",
                label
            )));
        }
        if self.variables.is_empty() {
            return Err(ArchiverError::Config(format!(
                "{}: at least one variable is required",
                label
            )));
        }

        let mut canonical = HashSet::new();
        let mut raw = HashSet::new();
        for variable in &self.variables {
            variable.validate()?;

            if !variable.unit_factor.is_finite() || variable.unit_factor == 0.0 {
                return Err(ArchiverError::Config(format!(
                    "{}: unit factor for '{}' must be finite and non-zero",
                    label, variable.canonical_name
                )));
            }
            if !variable.unit_offset.is_finite() {
                return Err(ArchiverError::Config(format!(
                    "{}: unit offset for '{}' must be finite",
                    label, variable.canonical_name
                )));
            }
            if variable.precision > MAX_PRECISION {
                return Err(ArchiverError::Config(format!(
                    "{}: precision for '{}' exceeds {}",
                    label, variable.canonical_name, MAX_PRECISION
                )));
            }
            if !canonical.insert(variable.canonical_name.as_str()) {
                return Err(ArchiverError::Config(format!(
                    "{}: duplicate canonical name '{}'",
                    label, variable.canonical_name
                )));
            }
            if !raw.insert(variable.raw_name.as_str()) {
                return Err(ArchiverError::Config(format!(
                    "{}: duplicate raw name '{}'",
                    label, variable.raw_name
                )));
            }
        }

        Ok(())
    }
}

/// Where a model's files live and how often it cycles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSource {
    pub model: Model,
    pub base_url: String,
    /// Path below `base_url`; placeholders `{date}`, `{cycle}`, `{fhour3}`,
    /// `{fhour2}` and `{domain}`
    pub path_template: String,
    #[serde(default)]
    pub domain: String,
    pub cycle_hours: u32,
}

impl ModelSource {
    pub fn validate_source(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(ArchiverError::Config(format!(
                "{}: base_url must not be empty",
                self.model
            )));
        }
        if self.cycle_hours == 0 || 24 % self.cycle_hours != 0 {
            return Err(ArchiverError::Config(format!(
                "{}: cycle_hours must divide 24, got {}",
                self.model, self.cycle_hours
            )));
        }
        Ok(())
    }
}
