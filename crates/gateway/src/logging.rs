use crate::config::GatewayConfig;
use common::TelemetryGuard;

const SERVICE_NAME: &str = "gateway";

/// Export traces and metrics when an OTLP endpoint is configured, otherwise
/// log locally. Keep the guard alive for the process lifetime.
pub fn setup_logging(config: &GatewayConfig) -> anyhow::Result<Option<TelemetryGuard>> {
    let environment = config.inference.environment;

    match config.inference.otel_endpoint.as_deref() {
        Some(endpoint) => {
            let guard = TelemetryGuard::init(SERVICE_NAME, endpoint, environment)?;
            tracing::info!(endpoint, "OpenTelemetry export enabled");
            Ok(Some(guard))
        }
        None => {
            common::setup_logging(environment);
            Ok(None)
        }
    }
}
