use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

pub const SERVICE_NAME: &str = "inference-gateway";

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    pub service_name: String,
    pub config_version: Option<String>,
    pub server: ServerConfig,
    pub model: ModelConfig,
    #[serde(default)]
    pub store: StoreConfig,
    pub limits: LimitsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Upper bound on an uploaded artifact, in bytes.
    pub max_artifact_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    /// Required file extension of uploaded artifacts, without the dot.
    pub artifact_extension: String,
    /// Artifact loaded before the listener opens.
    pub bootstrap_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreConfig {
    /// sled directory; in-memory when unset.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    pub predict_timeout_ms: u64,
    pub load_timeout_ms: u64,
}

impl LimitsConfig {
    pub fn predict_timeout(&self) -> Duration { Duration::from_millis(self.predict_timeout_ms) }
    pub fn load_timeout(&self) -> Duration { Duration::from_millis(self.load_timeout_ms) }
}

impl GatewayConfig {
    /// Defaults, then `SERVING_CONFIG_FILE`, then `SERVING__*` environment overrides.
    pub fn load() -> anyhow::Result<Self> {
        let cfg = serving_core::config_builder(SERVICE_NAME)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080_i64)?
            .set_default("server.max_artifact_bytes", 64_i64 * 1024 * 1024)?
            .set_default("model.artifact_extension", "json")?
            .set_default("limits.predict_timeout_ms", 2_000_i64)?
            .set_default("limits.load_timeout_ms", 10_000_i64)?
            .build()?;
        Ok(cfg.try_deserialize()?)
    }

    /// `artifact_extension` with any leading dot removed, lowercased.
    pub fn artifact_extension(&self) -> String {
        self.model.artifact_extension.trim_start_matches('.').to_ascii_lowercase()
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            service_name: SERVICE_NAME.to_string(),
            config_version: Some("0".to_string()),
            server: ServerConfig { host: "0.0.0.0".into(), port: 8080, max_artifact_bytes: 64 * 1024 * 1024 },
            model: ModelConfig { artifact_extension: "json".into(), bootstrap_path: None },
            store: StoreConfig::default(),
            limits: LimitsConfig { predict_timeout_ms: 2_000, load_timeout_ms: 10_000 },
        }
    }
}
