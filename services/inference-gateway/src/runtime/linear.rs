use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};

use super::{categorical_column, category, ensure_finite, number, numeric_column, ArtifactError, PredictError, Predictor};
use crate::features::FeatureFrame;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(super) struct LinearSpec {
    intercept: f64,
    #[serde(default)]
    numeric: BTreeMap<String, NumericTerm>,
    #[serde(default)]
    categorical: BTreeMap<String, BTreeMap<String, f64>>,
    #[serde(default)]
    handle_unknown: HandleUnknown,
}

/// `coef * (x - mean) / scale`
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
struct NumericTerm {
    coef: f64,
    #[serde(default)]
    mean: f64,
    #[serde(default = "unit_scale")]
    scale: f64,
}

fn unit_scale() -> f64 { 1.0 }

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum HandleUnknown {
    /// Unseen categories contribute nothing.
    #[default]
    Ignore,
    /// Unseen categories fail the prediction.
    Error,
}

/// Standardised linear regression over numeric columns plus one-hot encoded categories.
#[derive(Debug)]
pub struct LinearModel {
    intercept: f64,
    numeric: Vec<(&'static str, NumericTerm)>,
    categorical: Vec<(&'static str, HashMap<String, f64>)>,
    handle_unknown: HandleUnknown,
}

impl LinearModel {
    pub(super) fn compile(spec: LinearSpec) -> Result<Self, ArtifactError> {
        let intercept = ensure_finite("intercept", spec.intercept)?;
        let mut numeric = Vec::with_capacity(spec.numeric.len());
        for (name, term) in spec.numeric {
            let column = numeric_column(&name)?;
            ensure_finite(&format!("{name}.coef"), term.coef)?;
            ensure_finite(&format!("{name}.mean"), term.mean)?;
            if !(term.scale.is_finite() && term.scale > 0.0) {
                return Err(ArtifactError::Invalid(format!("{name}.scale must be a positive number")));
            }
            numeric.push((column, term));
        }
        let mut categorical = Vec::with_capacity(spec.categorical.len());
        for (name, levels) in spec.categorical {
            let column = categorical_column(&name)?;
            for (level, coef) in &levels { ensure_finite(&format!("{name}={level}"), *coef)?; }
            categorical.push((column, levels.into_iter().collect()));
        }
        Ok(Self { intercept, numeric, categorical, handle_unknown: spec.handle_unknown })
    }
}

impl Predictor for LinearModel {
    fn predict(&self, frame: &FeatureFrame<'_>) -> Result<f64, PredictError> {
        let mut acc = self.intercept;
        for (column, term) in &self.numeric {
            let x = number(frame, *column)?;
            acc += term.coef * (x - term.mean) / term.scale;
        }
        for (column, levels) in &self.categorical {
            let value = category(frame, *column)?;
            match levels.get(value) {
                Some(coef) => acc += coef,
                None if self.handle_unknown == HandleUnknown::Error => {
                    return Err(PredictError::UnknownCategory { column: *column, value: value.to_string() });
                }
                None => {}
            }
        }
        Ok(acc)
    }

    fn kind(&self) -> &'static str { "linear" }
}
