use anyhow::Result;
use inference_gateway::config::{GatewayConfig, SERVICE_NAME};
use serving_core::init_tracing;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing(SERVICE_NAME)?;
    let cfg = GatewayConfig::load()?;
    info!(target: "inference-gateway", port = cfg.server.port, config_version = ?cfg.config_version, "Starting inference-gateway service");
    inference_gateway::run(cfg).await
}
