use crate::config::GatewayConfig;
use crate::state::AppState;
use axum::{
    Router,
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{HeaderMap, Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::any,
};
use inference::{ContentType, RawPayload, Reply, handle};
use std::time::Instant;
use tower_http::cors::CorsLayer;

/// Axum response wrapper for a handler [`Reply`].
pub struct HttpReply(pub Reply);

impl IntoResponse for HttpReply {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        (
            status,
            [(header::CONTENT_TYPE, self.0.content_type.as_str())],
            self.0.body,
        )
            .into_response()
    }
}

/// Every method on every path reaches the detection handler.
pub fn router(state: AppState, body_limit_bytes: usize) -> Router {
    Router::new()
        .route("/", any(invoke))
        .fallback(invoke)
        .layer(DefaultBodyLimit::max(body_limit_bytes))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn invoke(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> HttpReply {
    let started = Instant::now();

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    let payload = RawPayload::from_body(content_type, body.to_vec());

    let detector = state.detector.clone();
    let method_name = method.as_str().to_owned();

    // decode and inference are CPU-bound
    let reply = tokio::task::spawn_blocking(move || {
        handle(&method_name, payload, detector.as_ref())
    })
    .await
    .unwrap_or_else(|e| {
        tracing::error!(error = %e, "Detection task failed (task panicked or cancelled)");
        Reply {
            status_code: 500,
            content_type: ContentType::Text,
            body: format!("Detection task failed: {}", e),
        }
    });

    let elapsed = started.elapsed().as_secs_f64();
    state.metrics.record(reply.status_code, elapsed);
    tracing::debug!(
        status = reply.status_code,
        elapsed_ms = elapsed * 1000.0,
        "Request served"
    );

    HttpReply(reply)
}

/// Serve until ctrl-c, then drain in-flight requests.
pub async fn run_server(config: &GatewayConfig, state: AppState) -> anyhow::Result<()> {
    let app = router(state, config.body_limit_bytes);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "Detection server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Detection server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
