use gateway::{
    config::GatewayConfig, logging::setup_logging, server::run_server, state::AppState,
};
use inference::OrtDetector;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = GatewayConfig::from_env()?;

    let _telemetry = setup_logging(&config)?;

    tracing::info!(
        config = ?config,
        "Loaded configuration"
    );

    tracing::info!(path = %config.inference.model_path, "Loading detection model");
    let detector = OrtDetector::load(&config.inference)?;
    tracing::info!("Model loaded successfully");

    let state = AppState::new(Arc::new(detector));
    run_server(&config, state).await
}
