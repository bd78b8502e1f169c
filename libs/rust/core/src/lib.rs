//! Core shared utilities for the serving services.
//!
//! Everything here is process plumbing: tracing setup, the layered config
//! builder, liveness/readiness flags and the health + metrics routes. Domain
//! state never lives here; services construct it and pass it around.

use anyhow::Result;
use axum::{extract::State, http::{header, StatusCode}, response::IntoResponse, routing::get, Json, Router};
use config::builder::DefaultState;
use config::ConfigBuilder;
use once_cell::sync::OnceCell;
use prometheus::{Encoder, Registry, TextEncoder};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::prelude::*;

static TRACING_INIT: OnceCell<()> = OnceCell::new();
static NODE_LIVENESS: AtomicBool = AtomicBool::new(true);
static NODE_READINESS: AtomicBool = AtomicBool::new(false);

pub fn mark_ready() { NODE_READINESS.store(true, Ordering::SeqCst); }
pub fn clear_ready() { NODE_READINESS.store(false, Ordering::SeqCst); }
pub fn mark_not_live() { NODE_LIVENESS.store(false, Ordering::SeqCst); }
pub fn is_ready() -> bool { NODE_READINESS.load(Ordering::SeqCst) }

/// Environment variable naming an optional config file (yaml/toml/json by extension).
pub const CONFIG_FILE_ENV: &str = "SERVING_CONFIG_FILE";
/// Prefix for environment overrides, e.g. `SERVING__SERVER__PORT=9000`.
pub const CONFIG_ENV_PREFIX: &str = "SERVING";

/// Install the global subscriber. `SERVING_JSON_LOG=1` switches to flattened JSON lines.
/// Calling this more than once is a no-op.
pub fn init_tracing(service: &str) -> Result<()> {
    TRACING_INIT.get_or_try_init(|| -> Result<()> {
        let json = std::env::var("SERVING_JSON_LOG").ok().map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false);
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        let registry = tracing_subscriber::registry().with(env_filter);
        if json {
            registry
                .with(tracing_subscriber::fmt::layer().json().flatten_event(true).with_current_span(true).with_span_list(false))
                .try_init()?;
        } else {
            registry
                .with(tracing_subscriber::fmt::layer().with_target(true).with_thread_ids(false).with_line_number(true))
                .try_init()?;
        }
        Ok(())
    })?;
    info!(target: "serving_core", service, "tracing initialized");
    Ok(())
}

/// Layered config builder: defaults < optional file (`SERVING_CONFIG_FILE`) < `SERVING__*` env.
///
/// Services add their own defaults on the returned builder and deserialize the result.
pub fn config_builder(service: &str) -> Result<ConfigBuilder<DefaultState>> {
    let mut builder = config::Config::builder()
        .set_default("service_name", service)?
        .set_default("config_version", "0")?;
    if let Ok(file) = std::env::var(CONFIG_FILE_ENV) {
        builder = builder.add_source(config::File::with_name(&file).required(false));
    }
    builder = builder.add_source(
        config::Environment::with_prefix(CONFIG_ENV_PREFIX)
            .separator("__")
            .try_parsing(true),
    );
    Ok(builder)
}

/// State shared by the health routes.
#[derive(Clone)]
pub struct HealthState {
    service: Arc<str>,
    config_version: Option<String>,
    registry: Registry,
}

impl HealthState {
    pub fn new(service: &str, config_version: Option<String>, registry: Registry) -> Self {
        Self { service: Arc::from(service), config_version, registry }
    }
}

/// `/health`, `/live`, `/ready`, `/status` and `/metrics`.
pub fn health_router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "ok"})) }))
        .route("/live", get(|| async { Json(serde_json::json!({"live": NODE_LIVENESS.load(Ordering::SeqCst)})) }))
        .route("/ready", get(|| async { Json(serde_json::json!({"ready": NODE_READINESS.load(Ordering::SeqCst)})) }))
        .route("/status", get(status_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

async fn status_handler(State(state): State<HealthState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "service": &*state.service,
        "live": NODE_LIVENESS.load(Ordering::SeqCst),
        "ready": NODE_READINESS.load(Ordering::SeqCst),
        "config_version": state.config_version,
    }))
}

async fn metrics_handler(State(state): State<HealthState>) -> axum::response::Response {
    let metric_families = state.registry.gather();
    let mut buf = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&metric_families, &mut buf) {
        return (StatusCode::INTERNAL_SERVER_ERROR, format!("encode error: {e}")).into_response();
    }
    (StatusCode::OK, [(header::CONTENT_TYPE, "text/plain; version=0.0.4")], buf).into_response()
}

/// Resolves on Ctrl-C; clears readiness first so load balancers drain.
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "ctrl_c handler failed; shutting down");
    }
    clear_ready();
    info!(target: "serving_core", "shutdown signal received");
}
