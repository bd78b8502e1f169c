//! Prediction ledger: append-only record of every successful inference.

use once_cell::sync::OnceCell;
use prometheus::IntGauge;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::features::FlightFeatureRow;
use crate::store::{Collection, StoreError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionEntry {
    /// Id of the model that computed `prediction_value`.
    pub model_id: String,
    pub prediction_time: String,
    /// The exact row the model saw.
    pub payload: FlightFeatureRow,
    pub prediction_value: f64,
}

#[derive(Clone)]
pub struct PredictionLedger {
    entries: Collection<PredictionEntry>,
    size: Arc<OnceCell<IntGauge>>,
}

impl PredictionLedger {
    pub fn new(entries: Collection<PredictionEntry>) -> Self { Self { entries, size: Arc::default() } }

    /// Keep `gauge` equal to the number of entries from now on. Only the first gauge sticks.
    pub fn track_size(&self, gauge: IntGauge) {
        gauge.set(self.len() as i64);
        let _ = self.size.set(gauge);
    }

    pub fn record(&self, entry: &PredictionEntry) -> Result<(), StoreError> {
        self.entries.append(entry)?;
        if let Some(gauge) = self.size.get() { gauge.inc(); }
        Ok(())
    }

    /// Every entry, oldest first.
    pub fn history(&self) -> Result<Vec<PredictionEntry>, StoreError> {
        self.entries.scan()
    }

    pub fn history_page(&self, offset: usize, limit: usize) -> Result<Vec<PredictionEntry>, StoreError> {
        self.entries.range(offset, limit)
    }

    pub fn len(&self) -> usize { self.entries.len() }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    /// Bulk clear for test isolation.
    pub fn clear(&self) -> Result<(), StoreError> {
        self.entries.clear()?;
        if let Some(gauge) = self.size.get() { gauge.set(0); }
        Ok(())
    }
}
