use crate::backend::Detector;
use crate::detection::{NormalizedDetection, run_detection};
use crate::errors::{InferenceFailure, ServiceError};
use crate::materialize::materialize;
use crate::request::{Decoded, RawPayload, decode_request};

pub const HEALTH_MESSAGE: &str = "Detection service is up and running!";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Json,
    Text,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Json => "application/json",
            ContentType::Text => "text/plain; charset=utf-8",
        }
    }
}

/// Transport-neutral response; the host maps it onto its own types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status_code: u16,
    pub content_type: ContentType,
    pub body: String,
}

impl Reply {
    pub fn health() -> Self {
        Self {
            status_code: 200,
            content_type: ContentType::Text,
            body: HEALTH_MESSAGE.to_string(),
        }
    }

    pub fn json(detections: &[NormalizedDetection]) -> Result<Self, InferenceFailure> {
        let body = serde_json::to_string(detections)
            .map_err(|e| InferenceFailure::new(format!("Failed to serialize detections: {}", e)))?;

        Ok(Self {
            status_code: 200,
            content_type: ContentType::Json,
            body,
        })
    }
}

impl From<ServiceError> for Reply {
    fn from(err: ServiceError) -> Self {
        Self {
            status_code: err.status_code(),
            content_type: ContentType::Text,
            body: err.to_string(),
        }
    }
}

/// Serve one invocation: a health probe, or decode, detect, and serialize.
///
/// Never panics on bad input; every failure becomes a 4xx or 5xx reply.
pub fn handle(method: &str, payload: RawPayload, detector: &dyn Detector) -> Reply {
    tracing::info!(method, "Run detection handler");

    match detect(method, payload, detector) {
        Ok(reply) => reply,
        Err(err) => {
            if err.is_client_error() {
                tracing::warn!(status = err.status_code(), error = %err, "Rejected request");
            } else {
                tracing::error!(status = err.status_code(), error = %err, "Detection failed");
            }
            Reply::from(err)
        }
    }
}

fn detect(method: &str, payload: RawPayload, detector: &dyn Detector) -> Result<Reply, ServiceError> {
    let blob = match decode_request(method, payload)? {
        Decoded::Probe => return Ok(Reply::health()),
        Decoded::Image(blob) => blob,
    };

    let image = materialize(blob)?;
    let detections = run_detection(detector, &image)?;

    tracing::info!(count = detections.len(), "Detections returned");

    Ok(Reply::json(&detections)?)
}
