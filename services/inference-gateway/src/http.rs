//! axum routes for model upload, prediction and the audit views.

use axum::{
    extract::{rejection::{JsonRejection, QueryRejection}, DefaultBodyLimit, Multipart, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::config::GatewayConfig;
use crate::error::{CoreError, CoreResult, ErrorKind};
use crate::features::FlightInfo;
use crate::ledger::PredictionEntry;
use crate::manager::ModelRecord;
use crate::metrics::GatewayMetrics;
use crate::service::InferenceService;

#[derive(Clone)]
pub struct AppState {
    service: Arc<InferenceService>,
    metrics: GatewayMetrics,
    artifact_extension: Arc<str>,
    predict_timeout: Duration,
    load_timeout: Duration,
}

impl AppState {
    pub fn new(service: Arc<InferenceService>, metrics: GatewayMetrics, cfg: &GatewayConfig) -> Self {
        Self {
            service,
            metrics,
            artifact_extension: Arc::from(cfg.artifact_extension()),
            predict_timeout: cfg.limits.predict_timeout(),
            load_timeout: cfg.limits.load_timeout(),
        }
    }
}

pub fn router(state: AppState, max_artifact_bytes: usize) -> Router {
    Router::new()
        .route("/model/load", post(load_model))
        .route("/model/load/", post(load_model))
        .route("/model/predict", post(predict))
        .route("/model/predict/", post(predict))
        .route("/model/history", get(history))
        .route("/model/history/", get(history))
        .route("/model/active", get(active))
        .route("/model/active/", get(active))
        .route("/model/audit", get(audit))
        .route("/model/audit/", get(audit))
        .layer(DefaultBodyLimit::max(max_artifact_bytes))
        .with_state(state)
}

/// `{"error": kind, "detail": message}` with a mapped status.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    kind: &'static str,
    detail: String,
}

impl ApiError {
    fn new(status: StatusCode, kind: &'static str, detail: impl Into<String>) -> Self {
        Self { status, kind, detail: detail.into() }
    }

    fn invalid_input(status: StatusCode, detail: impl Into<String>) -> Self {
        Self::new(status, "invalid_input", detail)
    }
}

impl From<CoreError> for ApiError {
    fn from(e: CoreError) -> Self {
        let status = match e.kind() {
            ErrorKind::ModelLoad => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::NoModelLoaded => StatusCode::BAD_REQUEST,
            ErrorKind::PredictionExecution => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::LedgerUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        };
        Self::new(status, e.kind().as_str(), e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({"error": self.kind, "detail": self.detail}))).into_response()
    }
}

/// Run a blocking core call off the async workers, bounded by `limit`.
/// A call that times out keeps running and may still record its effects.
async fn run_blocking<T, F>(op: &'static str, limit: Duration, f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> CoreResult<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::time::timeout(limit, tokio::task::spawn_blocking(f)).await {
        Ok(Ok(result)) => result.map_err(ApiError::from),
        Ok(Err(join)) => Err(ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", format!("{op} task failed: {join}"))),
        Err(_) => {
            warn!(op, limit_ms = limit.as_millis() as u64, "core call timed out");
            Err(ApiError::new(StatusCode::GATEWAY_TIMEOUT, "timeout", format!("{op} exceeded {}ms", limit.as_millis())))
        }
    }
}

fn outcome<T>(result: &Result<T, ApiError>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(e) => e.kind,
    }
}

fn has_extension(filename: &str, extension: &str) -> bool {
    filename
        .rsplit_once('.')
        .map(|(stem, ext)| !stem.is_empty() && ext.eq_ignore_ascii_case(extension))
        .unwrap_or(false)
}

async fn load_model(State(state): State<AppState>, mut multipart: Multipart) -> Result<Json<Value>, ApiError> {
    let result = read_artifact(&state, &mut multipart).await;
    let result = match result {
        Ok(bytes) => {
            let service = Arc::clone(&state.service);
            run_blocking("load_model", state.load_timeout, move || service.load_model(&bytes)).await
        }
        Err(e) => Err(e),
    };
    state.metrics.observe_load(outcome(&result));
    let record = result?;
    info!(model_id = %record.model_id, "model uploaded");
    Ok(Json(json!({
        "message": "model loaded successfully",
        "model_id": record.model_id,
        "load_time": record.load_time,
    })))
}

async fn read_artifact(state: &AppState, multipart: &mut Multipart) -> Result<Vec<u8>, ApiError> {
    let malformed = |e: axum::extract::multipart::MultipartError| ApiError::new(e.status(), "invalid_upload", e.body_text());
    while let Some(field) = multipart.next_field().await.map_err(malformed)? {
        if field.name() != Some("file") { continue; }
        let filename = field.file_name().unwrap_or_default().to_string();
        if !has_extension(&filename, &state.artifact_extension) {
            return Err(ApiError::new(
                StatusCode::BAD_REQUEST,
                "invalid_artifact_type",
                format!("the file must be a .{} file, got {filename:?}", state.artifact_extension),
            ));
        }
        return Ok(field.bytes().await.map_err(malformed)?.to_vec());
    }
    Err(ApiError::new(StatusCode::BAD_REQUEST, "invalid_upload", "missing multipart field `file`"))
}

async fn predict(State(state): State<AppState>, payload: Result<Json<FlightInfo>, JsonRejection>) -> Result<Json<Value>, ApiError> {
    let started = Instant::now();
    let result = match payload {
        Ok(Json(info)) => match info.validate() {
            Ok(row) => {
                let service = Arc::clone(&state.service);
                run_blocking("infer", state.predict_timeout, move || service.infer(row)).await
            }
            Err(e) => Err(ApiError::invalid_input(StatusCode::UNPROCESSABLE_ENTITY, e.to_string())),
        },
        Err(rejection) => Err(ApiError::invalid_input(rejection.status(), rejection.body_text())),
    };
    state.metrics.observe_prediction(outcome(&result), started.elapsed());
    Ok(Json(json!({"predicted_arrival_delay": result?})))
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryParams {
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

async fn history(
    State(state): State<AppState>,
    params: Result<Query<HistoryParams>, QueryRejection>,
) -> Result<Json<Vec<PredictionEntry>>, ApiError> {
    let Query(params) = params.map_err(|rejection| ApiError::invalid_input(rejection.status(), rejection.body_text()))?;
    let service = Arc::clone(&state.service);
    let entries = run_blocking("history", state.load_timeout, move || match (params.offset, params.limit) {
        (None, None) => service.history(),
        (offset, limit) => service.history_page(offset.unwrap_or(0), limit.unwrap_or(usize::MAX)),
    })
    .await?;
    Ok(Json(entries))
}

async fn active(State(state): State<AppState>) -> Result<Json<ModelRecord>, ApiError> {
    let record = state.service.manager().active_record().ok_or(CoreError::NoModelLoaded)?;
    Ok(Json(record))
}

async fn audit(State(state): State<AppState>) -> Result<Json<Vec<ModelRecord>>, ApiError> {
    let service = Arc::clone(&state.service);
    let trail = run_blocking("audit", state.load_timeout, move || Ok(service.manager().audit_trail()?)).await?;
    Ok(Json(trail))
}
