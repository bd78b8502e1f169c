//! Error types for the model lifecycle manager, ledger and inference path.

use thiserror::Error;

use crate::store::StoreError;

/// Errors surfaced by the core operations (`load_model`, `infer`, `history`).
#[derive(Debug, Error)]
pub enum CoreError {
    /// The artifact could not be turned into a predict-capable object.
    /// The previously active model, if any, stays active.
    #[error("failed to load model: {0}")]
    ModelLoad(String),

    /// No model has been loaded yet (the initial state of every process).
    #[error("no model loaded")]
    NoModelLoaded,

    /// The active model rejected the row it was given.
    #[error("error while attempting to predict: {0}")]
    PredictionExecution(String),

    /// The audit store could not be written or read.
    #[error("audit store unavailable: {0}")]
    Ledger(#[from] StoreError),
}

/// Stable classification of [`CoreError`], used for logs, metric labels and transport mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ModelLoad,
    NoModelLoaded,
    PredictionExecution,
    LedgerUnavailable,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ModelLoad => "model_load_error",
            Self::NoModelLoaded => "no_model_loaded",
            Self::PredictionExecution => "prediction_execution_error",
            Self::LedgerUnavailable => "ledger_unavailable",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(self.as_str()) }
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ModelLoad(_) => ErrorKind::ModelLoad,
            Self::NoModelLoaded => ErrorKind::NoModelLoaded,
            Self::PredictionExecution(_) => ErrorKind::PredictionExecution,
            Self::Ledger(_) => ErrorKind::LedgerUnavailable,
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_distinct_and_stable() {
        assert_eq!(CoreError::ModelLoad("bad".into()).kind().as_str(), "model_load_error");
        assert_eq!(CoreError::NoModelLoaded.kind().as_str(), "no_model_loaded");
        assert_eq!(CoreError::PredictionExecution("shape".into()).kind().as_str(), "prediction_execution_error");
        assert_eq!(CoreError::Ledger(StoreError::Codec("x".into())).kind().as_str(), "ledger_unavailable");
    }

    #[test]
    fn messages_carry_underlying_description() {
        let e = CoreError::ModelLoad("expected value at line 1 column 1".into());
        assert!(e.to_string().contains("expected value at line 1"));
    }
}
