//! Model runtime: turns artifact bytes into a predict-capable object.
//!
//! The lifecycle manager only sees [`ModelRuntime`] and [`Predictor`]; it never
//! interprets why an artifact failed to decode. [`JsonModelRuntime`] is the
//! runtime shipped with the gateway and understands two artifact kinds, tagged
//! by `kind`: `linear` and `gradient_boosting`.

mod boosting;
mod linear;

pub use boosting::BoostedTrees;
pub use linear::LinearModel;

use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;

use crate::features::{FeatureFrame, FeatureValue, CATEGORICAL_COLUMNS, FEATURE_COLUMNS};

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("artifact is not a valid model document: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid model artifact: {0}")]
    Invalid(String),
}

#[derive(Debug, Error, PartialEq)]
pub enum PredictError {
    #[error("column {column} expects a {expected} value")]
    TypeMismatch { column: &'static str, expected: &'static str },
    #[error("found unknown category {value:?} in column {column}")]
    UnknownCategory { column: &'static str, value: String },
    #[error("{0}")]
    Other(String),
}

/// Anything that maps one feature frame to one number.
pub trait Predictor: Send + Sync {
    fn predict(&self, frame: &FeatureFrame<'_>) -> Result<f64, PredictError>;
    /// Short label recorded in the model audit trail.
    fn kind(&self) -> &'static str;
}

pub trait ModelRuntime: Send + Sync {
    fn deserialize(&self, artifact: &[u8]) -> Result<Arc<dyn Predictor>, ArtifactError>;
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum ModelArtifact {
    Linear(linear::LinearSpec),
    GradientBoosting(boosting::BoostingSpec),
}

/// Runtime for JSON model documents.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonModelRuntime;

impl ModelRuntime for JsonModelRuntime {
    fn deserialize(&self, artifact: &[u8]) -> Result<Arc<dyn Predictor>, ArtifactError> {
        let predictor: Arc<dyn Predictor> = match serde_json::from_slice::<ModelArtifact>(artifact)? {
            ModelArtifact::Linear(spec) => Arc::new(LinearModel::compile(spec)?),
            ModelArtifact::GradientBoosting(spec) => Arc::new(BoostedTrees::compile(spec)?),
        };
        Ok(predictor)
    }
}

/// A column reference inside an artifact: a numeric column, or a one-hot
/// indicator written `column=VALUE` over a categorical column.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ColumnRef {
    Numeric(&'static str),
    Indicator { column: &'static str, value: String },
}

impl ColumnRef {
    pub(crate) fn parse(name: &str) -> Result<Self, ArtifactError> {
        match name.split_once('=') {
            Some((column, value)) => Ok(Self::Indicator { column: categorical_column(column)?, value: value.to_string() }),
            None => Ok(Self::Numeric(numeric_column(name)?)),
        }
    }

    pub(crate) fn eval(&self, frame: &FeatureFrame<'_>) -> Result<f64, PredictError> {
        match self {
            Self::Numeric(column) => number(frame, *column),
            Self::Indicator { column, value } => Ok(if category(frame, *column)? == value.as_str() { 1.0 } else { 0.0 }),
        }
    }
}

pub(crate) fn numeric_column(name: &str) -> Result<&'static str, ArtifactError> {
    FEATURE_COLUMNS
        .iter()
        .copied()
        .find(|c| *c == name && !CATEGORICAL_COLUMNS.contains(c))
        .ok_or_else(|| ArtifactError::Invalid(format!("unknown numeric column {name:?}")))
}

pub(crate) fn categorical_column(name: &str) -> Result<&'static str, ArtifactError> {
    CATEGORICAL_COLUMNS
        .iter()
        .copied()
        .find(|c| *c == name)
        .ok_or_else(|| ArtifactError::Invalid(format!("unknown categorical column {name:?}")))
}

pub(crate) fn number(frame: &FeatureFrame<'_>, column: &'static str) -> Result<f64, PredictError> {
    match frame.get(column) {
        Some(FeatureValue::Number(v)) => Ok(v),
        _ => Err(PredictError::TypeMismatch { column, expected: "numeric" }),
    }
}

pub(crate) fn category<'a>(frame: &FeatureFrame<'a>, column: &'static str) -> Result<&'a str, PredictError> {
    match frame.get(column) {
        Some(FeatureValue::Category(v)) => Ok(v),
        _ => Err(PredictError::TypeMismatch { column, expected: "categorical" }),
    }
}

pub(crate) fn ensure_finite(what: &str, v: f64) -> Result<f64, ArtifactError> {
    if v.is_finite() { Ok(v) } else { Err(ArtifactError::Invalid(format!("{what} must be finite"))) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::sample_row;

    #[test]
    fn column_refs_resolve_against_row_schema() {
        assert_eq!(ColumnRef::parse("dep_delay").unwrap(), ColumnRef::Numeric("dep_delay"));
        assert_eq!(ColumnRef::parse("origin=JFK").unwrap(), ColumnRef::Indicator { column: "origin", value: "JFK".into() });
        assert!(ColumnRef::parse("origin").is_err());
        assert!(ColumnRef::parse("month=7").is_err());
        assert!(ColumnRef::parse("tail_number").is_err());
    }

    #[test]
    fn indicator_evaluates_to_one_hot() {
        let row = sample_row();
        let frame = FeatureFrame::from_row(&row);
        assert_eq!(ColumnRef::parse("dest=LAX").unwrap().eval(&frame).unwrap(), 1.0);
        assert_eq!(ColumnRef::parse("dest=SFO").unwrap().eval(&frame).unwrap(), 0.0);
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        let err = JsonModelRuntime.deserialize(b"arquivo corrompido").err().unwrap();
        assert!(matches!(err, ArtifactError::Decode(_)));
    }

    #[test]
    fn unknown_kind_fails_to_decode() {
        let err = JsonModelRuntime.deserialize(br#"{"kind":"svm"}"#).err().unwrap();
        assert!(matches!(err, ArtifactError::Decode(_)));
    }

    #[test]
    fn dispatches_on_kind() {
        let lin = JsonModelRuntime.deserialize(br#"{"kind":"linear","intercept":2.0}"#).unwrap();
        assert_eq!(lin.kind(), "linear");
        let gb = JsonModelRuntime
            .deserialize(br#"{"kind":"gradient_boosting","init":1.0,"learning_rate":0.5,"trees":[{"nodes":[{"value":2.0}]}]}"#)
            .unwrap();
        assert_eq!(gb.kind(), "gradient_boosting");
        let row = sample_row();
        assert_eq!(gb.predict(&FeatureFrame::from_row(&row)).unwrap(), 2.0);
    }
}
