use inference::InferenceConfig;
use std::env;

pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_BODY_LIMIT_BYTES: usize = 32 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub listen_addr: String,
    /// Larger request bodies are answered with 413 before the handler runs.
    pub body_limit_bytes: usize,
    pub inference: InferenceConfig,
}

impl GatewayConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let listen_addr = env::var("LISTEN_ADDR")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string());

        let body_limit_bytes = match env::var("BODY_LIMIT_BYTES") {
            Ok(raw) => raw.trim().parse().map_err(|e| {
                anyhow::anyhow!("BODY_LIMIT_BYTES must be a byte count, got {:?}: {}", raw, e)
            })?,
            Err(_) => DEFAULT_BODY_LIMIT_BYTES,
        };

        Ok(Self {
            listen_addr,
            body_limit_bytes,
            inference: InferenceConfig::from_env()?,
        })
    }
}
