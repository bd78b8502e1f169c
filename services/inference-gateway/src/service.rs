//! Inference orchestration: active model → predict → ledger append.

use std::sync::Arc;
use tracing::{error, instrument, warn};

use crate::clock::now_stamp;
use crate::error::{CoreError, CoreResult};
use crate::features::{FeatureFrame, FlightFeatureRow};
use crate::ledger::{PredictionEntry, PredictionLedger};
use crate::manager::{ModelManager, ModelRecord};
use crate::runtime::ModelRuntime;
use crate::store::{AuditStore, StoreError};

pub struct InferenceService {
    manager: ModelManager,
    ledger: PredictionLedger,
}

impl InferenceService {
    pub fn new(manager: ModelManager, ledger: PredictionLedger) -> Self { Self { manager, ledger } }

    /// Wire a manager and ledger onto the two collections of `store`.
    pub fn from_store(runtime: Arc<dyn ModelRuntime>, store: &AuditStore) -> Result<Self, StoreError> {
        Ok(Self::new(ModelManager::new(runtime, store.models.clone())?, PredictionLedger::new(store.predictions.clone())))
    }

    pub fn manager(&self) -> &ModelManager { &self.manager }

    pub fn ledger(&self) -> &PredictionLedger { &self.ledger }

    pub fn load_model(&self, artifact: &[u8]) -> CoreResult<ModelRecord> {
        self.manager.load_model(artifact)
    }

    /// Predict with the active model and record the result.
    ///
    /// The ledger entry carries the id of the model object that actually
    /// computed the value, even if a load swaps the slot mid-call. A value that
    /// cannot be recorded is not returned: the call fails with `Ledger`.
    #[instrument(skip_all, fields(origin = %row.origin, dest = %row.dest))]
    pub fn infer(&self, row: FlightFeatureRow) -> CoreResult<f64> {
        let active = self.manager.get_active_model()?;
        let value = active
            .predictor
            .predict(&FeatureFrame::from_row(&row))
            .map_err(|e| {
                warn!(model_id = %active.record.model_id, error = %e, "model rejected row");
                CoreError::PredictionExecution(e.to_string())
            })?;
        if !value.is_finite() {
            warn!(model_id = %active.record.model_id, "non-finite prediction discarded");
            return Err(CoreError::PredictionExecution(format!("model produced a non-finite prediction ({value})")));
        }

        let entry = PredictionEntry {
            model_id: active.record.model_id.clone(),
            prediction_time: now_stamp(),
            payload: row,
            prediction_value: value,
        };
        if let Err(e) = self.ledger.record(&entry) {
            error!(model_id = %entry.model_id, prediction_value = value, error = %e, "prediction not recorded; failing request");
            return Err(e.into());
        }
        Ok(value)
    }

    pub fn history(&self) -> CoreResult<Vec<PredictionEntry>> {
        Ok(self.ledger.history()?)
    }

    pub fn history_page(&self, offset: usize, limit: usize) -> CoreResult<Vec<PredictionEntry>> {
        Ok(self.ledger.history_page(offset, limit)?)
    }
}
