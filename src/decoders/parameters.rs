//! GRIB2 (discipline, category, number) to short-name lookup.
//!
//! Short names follow the NCEP abbreviations that appear in the parameter
//! column of sidecar indexes, so decoded fields can be matched against the
//! same names the index rules use.

use std::collections::HashMap;

/// Lookup key for parameter: (discipline, category, number)
pub type ParamKey = (u8, u8, u8);

const METEOROLOGICAL: &[(ParamKey, &str)] = &[
    ((0, 0, 0), "TMP"),
    ((0, 0, 4), "TMAX"),
    ((0, 0, 5), "TMIN"),
    ((0, 0, 6), "DPT"),
    ((0, 1, 1), "RH"),
    ((0, 1, 7), "PRATE"),
    ((0, 1, 8), "APCP"),
    ((0, 1, 29), "ASNOW"),
    ((0, 2, 0), "WDIR"),
    ((0, 2, 1), "WIND"),
    ((0, 2, 2), "UGRD"),
    ((0, 2, 3), "VGRD"),
    ((0, 2, 22), "GUST"),
    ((0, 3, 0), "PRES"),
    ((0, 3, 1), "PRMSL"),
    ((0, 3, 5), "HGT"),
    ((0, 6, 1), "TCDC"),
    ((0, 19, 0), "VIS"),
];

#[derive(Debug, Clone)]
pub struct ParameterTable {
    names: HashMap<ParamKey, String>,
}

impl ParameterTable {
    pub fn new() -> Self {
        let names = METEOROLOGICAL
            .iter()
            .map(|&(key, name)| (key, name.to_string()))
            .collect();
        Self { names }
    }

    pub fn add_parameter(&mut self, discipline: u8, category: u8, number: u8, name: &str) {
        self.names
            .insert((discipline, category, number), name.to_string());
    }

    /// Short name, or `VAR{d}_{c}_{n}` for codes not in the table.
    pub fn name(&self, discipline: u8, category: u8, number: u8) -> String {
        self.names
            .get(&(discipline, category, number))
            .cloned()
            .unwrap_or_else(|| format!("VAR{}_{}_{}", discipline, category, number))
    }
}

impl Default for ParameterTable {
    fn default() -> Self {
        Self::new()
    }
}
