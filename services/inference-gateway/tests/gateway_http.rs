use std::net::SocketAddr;
use std::sync::Arc;

use inference_gateway::{AuditStore, GatewayConfig, InferenceService, JsonModelRuntime, ModelManager, PredictionLedger, SequenceIds};
use prometheus::Registry;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

const MODEL: &[u8] = br#"{"kind":"linear","intercept":1.0,"numeric":{"dep_delay":{"coef":2.0}}}"#;

async fn spawn_gateway(ids: &[&str]) -> (SocketAddr, tokio::task::JoinHandle<()>) {
    spawn_gateway_with(ids, GatewayConfig::default()).await
}

async fn spawn_gateway_with(ids: &[&str], cfg: GatewayConfig) -> (SocketAddr, tokio::task::JoinHandle<()>) {
    let store = AuditStore::in_memory();
    let manager = ModelManager::new(Arc::new(JsonModelRuntime), store.models.clone())
        .unwrap()
        .with_id_source(SequenceIds::new(ids.iter().copied()));
    let service = Arc::new(InferenceService::new(manager, PredictionLedger::new(store.predictions.clone())));
    let app = inference_gateway::app(service, &cfg, Registry::new()).unwrap();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, handle)
}

async fn upload(client: &Client, addr: SocketAddr, filename: &str, bytes: &[u8]) -> reqwest::Response {
    let form = Form::new().part("file", Part::bytes(bytes.to_vec()).file_name(filename.to_string()));
    client.post(format!("http://{addr}/model/load/")).multipart(form).send().await.unwrap()
}

fn flight() -> Value {
    json!({"dep_time": 1345, "dep_delay": 10.5, "origin": "JFK", "dest": "LAX", "carrier": "AA", "distance": 2475, "month": 7})
}

#[tokio::test]
async fn load_predict_and_read_history() {
    let (addr, server) = spawn_gateway(&["abc12345"]).await;
    let client = Client::new();

    let resp = upload(&client, addr, "delay_model.json", MODEL).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["model_id"], "abc12345");
    let stamp = regex::Regex::new(r"^\d{2}/\d{2}/\d{4} \d{2}:\d{2}:\d{2}$").unwrap();
    assert!(stamp.is_match(body["load_time"].as_str().unwrap()), "bad load_time {body}");

    let resp = client.post(format!("http://{addr}/model/predict/")).json(&flight()).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["predicted_arrival_delay"].as_f64(), Some(22.0));

    let history: Vec<Value> = client.get(format!("http://{addr}/model/history/")).send().await.unwrap().json().await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["model_id"], "abc12345");
    assert_eq!(history[0]["payload"], json!({"dep_time": 1345, "dep_delay": 10.5, "origin": "JFK", "dest": "LAX", "carrier": "AA", "distance": 2475.0, "month": 7}));
    assert_eq!(history[0]["prediction_value"], 22.0);
    assert!(stamp.is_match(history[0]["prediction_time"].as_str().unwrap()));

    let active: Value = client.get(format!("http://{addr}/model/active")).send().await.unwrap().json().await.unwrap();
    assert_eq!(active["model_id"], "abc12345");
    assert_eq!(active["kind"], "linear");

    let metrics = client.get(format!("http://{addr}/metrics")).send().await.unwrap().text().await.unwrap();
    assert!(metrics.contains(r#"gateway_predictions_total{outcome="ok"} 1"#), "{metrics}");
    assert!(metrics.contains("gateway_ledger_entries 1"));
    server.abort();
}

#[tokio::test]
async fn predict_without_model_is_rejected() {
    let (addr, server) = spawn_gateway(&[]).await;
    let client = Client::new();

    let resp = client.post(format!("http://{addr}/model/predict")).json(&flight()).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "no_model_loaded");

    let resp = client.get(format!("http://{addr}/model/active/")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let history: Vec<Value> = client.get(format!("http://{addr}/model/history")).send().await.unwrap().json().await.unwrap();
    assert!(history.is_empty());
    server.abort();
}

#[tokio::test]
async fn corrupted_upload_keeps_serving_previous_model() {
    let (addr, server) = spawn_gateway(&["abc12345", "def67890"]).await;
    let client = Client::new();
    assert_eq!(upload(&client, addr, "good.json", MODEL).await.status(), StatusCode::OK);

    let resp = upload(&client, addr, "broken.json", b"{ this is not a model").await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "model_load_error");

    let resp = client.post(format!("http://{addr}/model/predict/")).json(&flight()).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let history: Vec<Value> = client.get(format!("http://{addr}/model/history/")).send().await.unwrap().json().await.unwrap();
    assert_eq!(history[0]["model_id"], "abc12345");

    let audit: Vec<Value> = client.get(format!("http://{addr}/model/audit/")).send().await.unwrap().json().await.unwrap();
    assert_eq!(audit.len(), 1);
    server.abort();
}

#[tokio::test]
async fn wrong_extension_is_refused_before_loading() {
    let (addr, server) = spawn_gateway(&[]).await;
    let client = Client::new();
    let resp = upload(&client, addr, "model.pkl", MODEL).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "invalid_artifact_type");

    let audit: Vec<Value> = client.get(format!("http://{addr}/model/audit")).send().await.unwrap().json().await.unwrap();
    assert!(audit.is_empty());
    server.abort();
}

#[tokio::test]
async fn invalid_rows_are_422_and_not_recorded() {
    let (addr, server) = spawn_gateway(&[]).await;
    let client = Client::new();
    assert_eq!(upload(&client, addr, "m.json", MODEL).await.status(), StatusCode::OK);

    let mut bad_month = flight();
    bad_month["month"] = json!(13);
    let mut negative_time = flight();
    negative_time["dep_time"] = json!(-5);
    let mut missing = flight();
    missing.as_object_mut().unwrap().remove("carrier");

    for row in [bad_month, negative_time, missing] {
        let resp = client.post(format!("http://{addr}/model/predict/")).json(&row).send().await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY, "row {row}");
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["error"], "invalid_input");
    }

    let history: Vec<Value> = client.get(format!("http://{addr}/model/history/")).send().await.unwrap().json().await.unwrap();
    assert!(history.is_empty());
    server.abort();
}

#[tokio::test]
async fn history_pages_with_offset_and_limit() {
    let (addr, server) = spawn_gateway(&[]).await;
    let client = Client::new();
    assert_eq!(upload(&client, addr, "m.json", MODEL).await.status(), StatusCode::OK);
    for delay in [1.0, 2.0, 3.0, 4.0] {
        let mut row = flight();
        row["dep_delay"] = json!(delay);
        assert!(client.post(format!("http://{addr}/model/predict/")).json(&row).send().await.unwrap().status().is_success());
    }

    let page: Vec<Value> = client.get(format!("http://{addr}/model/history/?offset=1&limit=2")).send().await.unwrap().json().await.unwrap();
    let delays: Vec<_> = page.iter().map(|e| e["payload"]["dep_delay"].as_f64().unwrap()).collect();
    assert_eq!(delays, [2.0, 3.0]);
    server.abort();
}

#[tokio::test]
async fn bad_history_query_gets_json_error() {
    let (addr, server) = spawn_gateway(&[]).await;
    let resp = Client::new().get(format!("http://{addr}/model/history/?offset=abc")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "invalid_input");
    assert!(body["detail"].as_str().unwrap().contains("query"), "{body}");
    server.abort();
}

#[tokio::test]
async fn whole_float_dep_time_is_accepted() {
    let (addr, server) = spawn_gateway(&[]).await;
    let client = Client::new();
    assert_eq!(upload(&client, addr, "m.json", MODEL).await.status(), StatusCode::OK);

    let mut row = flight();
    row["dep_time"] = json!(1345.0);
    let resp = client.post(format!("http://{addr}/model/predict/")).json(&row).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    row["dep_time"] = json!(1345.5);
    let resp = client.post(format!("http://{addr}/model/predict/")).json(&row).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let history: Vec<Value> = client.get(format!("http://{addr}/model/history/")).send().await.unwrap().json().await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["payload"]["dep_time"], 1345);
    server.abort();
}

#[tokio::test]
async fn ledger_gauge_counts_predictions_that_outlive_their_timeout() {
    let mut cfg = GatewayConfig::default();
    cfg.limits.predict_timeout_ms = 0;
    let (addr, server) = spawn_gateway_with(&[], cfg).await;
    let client = Client::new();
    assert_eq!(upload(&client, addr, "m.json", MODEL).await.status(), StatusCode::OK);

    let status = client.post(format!("http://{addr}/model/predict/")).json(&flight()).send().await.unwrap().status();
    assert!(status == StatusCode::GATEWAY_TIMEOUT || status == StatusCode::OK, "status {status}");

    // the blocking call keeps running after the timeout and still records
    let mut recorded = 0;
    for _ in 0..50 {
        let history: Vec<Value> = client.get(format!("http://{addr}/model/history/")).send().await.unwrap().json().await.unwrap();
        recorded = history.len();
        if recorded == 1 { break; }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert_eq!(recorded, 1);

    let metrics = client.get(format!("http://{addr}/metrics")).send().await.unwrap().text().await.unwrap();
    assert!(metrics.contains("gateway_ledger_entries 1"), "{metrics}");
    server.abort();
}
