use std::env;
use std::str::FromStr;

pub use common::Environment;

pub const DEFAULT_MODEL_PATH: &str = "/opt/nuclio/best.onnx";
pub const DEFAULT_INPUT_SIZE: u32 = 640;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionProvider {
    Cpu,
    Cuda,
}

impl FromStr for ExecutionProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cpu" => Ok(Self::Cpu),
            "cuda" | "gpu" => Ok(Self::Cuda),
            other => anyhow::bail!(
                "{} is not a supported execution provider. Use either `cpu` or `cuda`.",
                other
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct InferenceConfig {
    pub environment: Environment,
    pub model_path: String,
    pub class_names_path: Option<String>,
    pub input_size: u32,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
    pub execution_provider: ExecutionProvider,
    pub otel_endpoint: Option<String>,
}

impl InferenceConfig {
    /// Load configuration from environment variables with sensible defaults
    pub fn from_env() -> anyhow::Result<Self> {
        let environment = Environment::from_env();

        let model_path =
            env::var("MODEL_PATH").unwrap_or_else(|_| DEFAULT_MODEL_PATH.to_string());

        let class_names_path = non_empty_var("CLASS_NAMES_PATH");

        let input_size = parsed_var("INPUT_SIZE").unwrap_or(DEFAULT_INPUT_SIZE);

        let confidence_threshold = parsed_var("CONFIDENCE_THRESHOLD").unwrap_or(0.25);

        let iou_threshold = parsed_var("IOU_THRESHOLD").unwrap_or(0.7);

        let max_detections = parsed_var("MAX_DETECTIONS").unwrap_or(300);

        let execution_provider = match non_empty_var("EXECUTION_PROVIDER") {
            Some(value) => value.parse()?,
            None => ExecutionProvider::Cpu,
        };

        let otel_endpoint = non_empty_var("OTEL_EXPORTER_OTLP_ENDPOINT");

        let config = Self {
            environment,
            model_path,
            class_names_path,
            input_size,
            confidence_threshold,
            iou_threshold,
            max_detections,
            execution_provider,
            otel_endpoint,
        };
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.input_size == 0 {
            anyhow::bail!("INPUT_SIZE must be positive");
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            anyhow::bail!(
                "CONFIDENCE_THRESHOLD must be within [0, 1], got {}",
                self.confidence_threshold
            );
        }
        if !(0.0..=1.0).contains(&self.iou_threshold) {
            anyhow::bail!(
                "IOU_THRESHOLD must be within [0, 1], got {}",
                self.iou_threshold
            );
        }
        Ok(())
    }

    /// Create default configuration for testing
    pub fn test_default() -> Self {
        Self {
            environment: Environment::Development,
            model_path: "/models/model.onnx".to_string(),
            class_names_path: None,
            input_size: DEFAULT_INPUT_SIZE,
            confidence_threshold: 0.25,
            iou_threshold: 0.7,
            max_detections: 300,
            execution_provider: ExecutionProvider::Cpu,
            otel_endpoint: None,
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parsed_var<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.trim().parse().ok())
}
