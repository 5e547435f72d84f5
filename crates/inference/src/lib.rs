pub mod backend;
pub mod config;
pub mod detection;
pub mod errors;
pub mod handler;
pub mod materialize;
pub mod names;
pub mod processing;
pub mod request;

// Re-export commonly used types for convenience
pub use backend::Detector;
pub use config::{ExecutionProvider, InferenceConfig};
pub use detection::{Detections, NormalizedDetection, normalize, run_detection};
pub use errors::ServiceError;
pub use handler::{ContentType, HEALTH_MESSAGE, Reply, handle};
pub use names::ClassNames;
pub use request::RawPayload;

#[cfg(feature = "ort-backend")]
pub use backend::ort::OrtDetector;
