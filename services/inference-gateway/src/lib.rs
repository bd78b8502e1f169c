//! Flight-delay inference gateway.
//!
//! A [`ModelManager`] owns the single active model and its audit trail, a
//! [`PredictionLedger`] records every successful prediction, and
//! [`InferenceService`] ties the two together. [`http`] puts an axum front on
//! top; [`run`] is the whole process after tracing and config are set up.

pub mod clock;
pub mod config;
pub mod error;
pub mod features;
pub mod http;
pub mod ledger;
pub mod manager;
pub mod metrics;
pub mod runtime;
pub mod service;
pub mod store;

pub use config::GatewayConfig;
pub use error::{CoreError, CoreResult, ErrorKind};
pub use features::{FlightFeatureRow, FlightInfo};
pub use ledger::{PredictionEntry, PredictionLedger};
pub use manager::{ActiveModel, IdSource, ModelManager, ModelRecord, RandomIds, SequenceIds};
pub use runtime::{JsonModelRuntime, ModelRuntime, Predictor};
pub use service::InferenceService;
pub use store::AuditStore;

use anyhow::{Context, Result};
use axum::Router;
use prometheus::Registry;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::http::AppState;
use crate::metrics::GatewayMetrics;

/// Open the audit store named by `store.path`, or an in-memory one.
pub fn open_store(cfg: &GatewayConfig) -> Result<AuditStore> {
    match &cfg.store.path {
        Some(path) => AuditStore::open(path).with_context(|| format!("opening audit store at {}", path.display())),
        None => {
            warn!("store.path unset; audit trail and ledger are in-memory");
            Ok(AuditStore::in_memory())
        }
    }
}

/// Load the configured bootstrap artifact. A bad artifact is logged, not fatal.
pub fn bootstrap(service: &InferenceService, path: &Path) {
    let loaded = std::fs::read(path)
        .map_err(|e| e.to_string())
        .and_then(|bytes| service.load_model(&bytes).map_err(|e| e.to_string()));
    match loaded {
        Ok(record) => info!(model_id = %record.model_id, path = %path.display(), "bootstrap model loaded"),
        Err(e) => warn!(path = %path.display(), error = %e, "bootstrap model not loaded; starting without a model"),
    }
}

/// Model routes plus the shared health and metrics routes.
pub fn app(service: Arc<InferenceService>, cfg: &GatewayConfig, registry: Registry) -> Result<Router> {
    let metrics = GatewayMetrics::register(&registry)?;
    service.ledger().track_size(metrics.ledger_entries.clone());
    let health = serving_core::HealthState::new(&cfg.service_name, cfg.config_version.clone(), registry);
    Ok(http::router(AppState::new(service, metrics, cfg), cfg.server.max_artifact_bytes).merge(serving_core::health_router(health)))
}

pub async fn run(cfg: GatewayConfig) -> Result<()> {
    let store = open_store(&cfg)?;
    let service = Arc::new(InferenceService::from_store(Arc::new(JsonModelRuntime), &store)?);
    if let Some(path) = &cfg.model.bootstrap_path {
        bootstrap(&service, path);
    }
    let app = app(Arc::clone(&service), &cfg, Registry::new())?;

    let listener = tokio::net::TcpListener::bind((cfg.server.host.as_str(), cfg.server.port))
        .await
        .with_context(|| format!("binding {}:{}", cfg.server.host, cfg.server.port))?;
    info!(addr = %listener.local_addr()?, persistent = store.is_persistent(), "inference gateway listening");
    serving_core::mark_ready();
    axum::serve(listener, app).with_graceful_shutdown(serving_core::shutdown_signal()).await?;
    info!("inference gateway stopped");
    Ok(())
}
