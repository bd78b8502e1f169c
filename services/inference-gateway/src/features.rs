//! Flight feature row: the inference input, its fixed column order, and the
//! transport-side validation that produces it.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Column order handed to every model. Artifacts refer to columns by these names.
pub const FEATURE_COLUMNS: [&str; 7] = ["dep_time", "dep_delay", "origin", "dest", "carrier", "distance", "month"];

/// Columns holding category codes rather than numbers.
pub const CATEGORICAL_COLUMNS: [&str; 3] = ["origin", "dest", "carrier"];

/// Validated inference input, stored verbatim as the ledger payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightFeatureRow {
    /// Local departure clock time encoded as `hours * 100 + minutes`.
    pub dep_time: u32,
    /// Departure delay in minutes; negative for early departures.
    pub dep_delay: f64,
    pub origin: String,
    pub dest: String,
    pub carrier: String,
    pub distance: f64,
    pub month: u8,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FeatureValue<'a> {
    Number(f64),
    Category(&'a str),
}

/// Single-row input frame: the seven row fields in [`FEATURE_COLUMNS`] order.
#[derive(Debug, Clone)]
pub struct FeatureFrame<'a> {
    values: [FeatureValue<'a>; 7],
}

impl<'a> FeatureFrame<'a> {
    pub fn from_row(row: &'a FlightFeatureRow) -> Self {
        Self {
            values: [
                FeatureValue::Number(row.dep_time as f64),
                FeatureValue::Number(row.dep_delay),
                FeatureValue::Category(&row.origin),
                FeatureValue::Category(&row.dest),
                FeatureValue::Category(&row.carrier),
                FeatureValue::Number(row.distance),
                FeatureValue::Number(row.month as f64),
            ],
        }
    }

    pub fn get(&self, column: &str) -> Option<FeatureValue<'a>> {
        FEATURE_COLUMNS.iter().position(|c| *c == column).map(|i| self.values[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, FeatureValue<'a>)> + '_ {
        FEATURE_COLUMNS.iter().copied().zip(self.values.iter().copied())
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("dep_time must be non-negative and at most {max}, got {got}", max = u32::MAX)]
    DepTime { got: f64 },
    #[error("month must be between 1 and 12, got {0}")]
    Month(f64),
    #[error("{0} must be a whole number")]
    NotWhole(&'static str),
    #[error("distance must be a non-negative number, got {0}")]
    Distance(f64),
    #[error("{0} must be a finite number")]
    NotFinite(&'static str),
    #[error("{0} must not be empty")]
    Empty(&'static str),
}

/// Request body for `POST /model/predict/`, before range checks.
///
/// Integer fields are read as numbers so `1345.0` is accepted; a fractional
/// part is rejected during validation.
#[derive(Debug, Clone, Deserialize)]
pub struct FlightInfo {
    pub dep_time: f64,
    pub dep_delay: f64,
    pub origin: String,
    pub dest: String,
    pub carrier: String,
    pub distance: f64,
    pub month: f64,
}

fn whole(name: &'static str, v: f64) -> Result<f64, ValidationError> {
    if !v.is_finite() { return Err(ValidationError::NotFinite(name)); }
    if v.fract() != 0.0 { return Err(ValidationError::NotWhole(name)); }
    Ok(v)
}

impl FlightInfo {
    pub fn validate(self) -> Result<FlightFeatureRow, ValidationError> {
        let dep_time = whole("dep_time", self.dep_time)?;
        if !(0.0..=u32::MAX as f64).contains(&dep_time) { return Err(ValidationError::DepTime { got: dep_time }); }
        let month = whole("month", self.month)?;
        if !self.dep_delay.is_finite() { return Err(ValidationError::NotFinite("dep_delay")); }
        if !self.distance.is_finite() { return Err(ValidationError::NotFinite("distance")); }
        if self.distance < 0.0 { return Err(ValidationError::Distance(self.distance)); }
        if !(1.0..=12.0).contains(&month) { return Err(ValidationError::Month(month)); }
        for (name, value) in [("origin", &self.origin), ("dest", &self.dest), ("carrier", &self.carrier)] {
            if value.trim().is_empty() { return Err(ValidationError::Empty(name)); }
        }
        Ok(FlightFeatureRow {
            dep_time: dep_time as u32,
            dep_delay: self.dep_delay,
            origin: self.origin,
            dest: self.dest,
            carrier: self.carrier,
            distance: self.distance,
            month: month as u8,
        })
    }
}

#[cfg(test)]
pub(crate) fn sample_row() -> FlightFeatureRow {
    FlightFeatureRow { dep_time: 1345, dep_delay: 10.5, origin: "JFK".into(), dest: "LAX".into(), carrier: "AA".into(), distance: 2475.0, month: 7 }
}
