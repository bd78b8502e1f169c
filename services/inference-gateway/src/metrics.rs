use prometheus::{Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts, Registry};
use std::time::Duration;

/// Gateway counters, registered on the registry served at `/metrics`.
#[derive(Clone)]
pub struct GatewayMetrics {
    pub model_loads: IntCounterVec,
    pub predictions: IntCounterVec,
    pub predict_latency: Histogram,
    /// Driven by the ledger itself, see `PredictionLedger::track_size`.
    pub ledger_entries: IntGauge,
}

impl GatewayMetrics {
    pub fn register(registry: &Registry) -> prometheus::Result<Self> {
        let model_loads = IntCounterVec::new(Opts::new("gateway_model_loads_total", "Model load attempts by outcome"), &["outcome"])?;
        let predictions = IntCounterVec::new(Opts::new("gateway_predictions_total", "Prediction requests by outcome"), &["outcome"])?;
        let predict_latency = Histogram::with_opts(
            HistogramOpts::new("gateway_predict_latency_seconds", "Inference latency including the ledger append")
                .buckets(vec![0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]),
        )?;
        let ledger_entries = IntGauge::new("gateway_ledger_entries", "Entries in the prediction ledger")?;

        registry.register(Box::new(model_loads.clone()))?;
        registry.register(Box::new(predictions.clone()))?;
        registry.register(Box::new(predict_latency.clone()))?;
        registry.register(Box::new(ledger_entries.clone()))?;
        Ok(Self { model_loads, predictions, predict_latency, ledger_entries })
    }

    pub fn observe_load(&self, outcome: &str) {
        self.model_loads.with_label_values(&[outcome]).inc();
    }

    pub fn observe_prediction(&self, outcome: &str, elapsed: Duration) {
        self.predictions.with_label_values(&[outcome]).inc();
        self.predict_latency.observe(elapsed.as_secs_f64());
    }
}
