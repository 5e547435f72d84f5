use super::Detector;
use crate::config::{ExecutionProvider, InferenceConfig};
use crate::detection::Detections;
use crate::names::ClassNames;
use crate::processing::{ModelTask, PostProcessor, PreProcessor};
use common::span;
use image::RgbImage;
use ort::{
    session::{Session, builder::GraphOptimizationLevel},
    value::TensorRef,
};
use std::sync::Mutex;

const INPUT_NAME: &str = "images";
const OUTPUT_NAME: &str = "output0";

/// A YOLO ONNX export behind ONNX Runtime.
///
/// `Session::run` needs exclusive access, so concurrent requests queue on
/// the session lock while pre- and post-processing run in parallel.
pub struct OrtDetector {
    session: Mutex<Session>,
    names: ClassNames,
    preprocessor: PreProcessor,
    postprocessor: PostProcessor,
}

impl OrtDetector {
    pub fn load(config: &InferenceConfig) -> anyhow::Result<Self> {
        let session = load_session(&config.model_path, config.execution_provider)?;

        let embedded = names_from_metadata(&session)?;
        let from_file = match &config.class_names_path {
            Some(path) => {
                tracing::info!(path = %path, "Loading class names from file");
                Some(ClassNames::from_file(path)?)
            }
            None => None,
        };
        let names = resolve_class_names(from_file, embedded)?;

        let task = task_from_metadata(&session)?;

        tracing::info!(
            classes = names.len(),
            task = task.map(|t| t.as_str()),
            input_size = config.input_size,
            confidence_threshold = config.confidence_threshold,
            iou_threshold = config.iou_threshold,
            "Detector ready"
        );

        Ok(Self {
            session: Mutex::new(session),
            names,
            preprocessor: PreProcessor::new(config.input_size),
            postprocessor: PostProcessor::new(
                config.confidence_threshold,
                config.iou_threshold,
                config.max_detections,
            )
            .with_task(task),
        })
    }
}

impl Detector for OrtDetector {
    fn predict(&self, image: &RgbImage) -> anyhow::Result<Detections> {
        let (input, transform) = self.preprocessor.preprocess(image)?;

        let output = {
            let _s = span!("run_inference");
            let mut session = self
                .session
                .lock()
                .map_err(|_| anyhow::anyhow!("Inference session lock poisoned"))?;

            let outputs = session.run(ort::inputs![
                INPUT_NAME => TensorRef::from_array_view(input.view())?
            ])?;

            outputs[OUTPUT_NAME].try_extract_array::<f32>()?.into_owned()
        };

        self.postprocessor
            .parse_detections(&output.view(), self.names.num_classes(), &transform)
    }

    fn class_names(&self) -> &ClassNames {
        &self.names
    }
}

/// Load model with specified execution provider
fn load_session(path: &str, provider: ExecutionProvider) -> anyhow::Result<Session> {
    // Initialize ORT environment (idempotent)
    let _ = ort::init().commit();

    let mut builder = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(4)?;

    match provider {
        ExecutionProvider::Cuda => {
            tracing::info!("Initializing ONNX Runtime with CUDA execution provider");
            builder = builder.with_execution_providers([
                ort::execution_providers::CUDAExecutionProvider::default()
                    .with_device_id(0)
                    .build()
                    .error_on_failure(),
            ])?;
        }
        ExecutionProvider::Cpu => {
            tracing::info!("Initializing ONNX Runtime with CPU execution provider");
        }
    }

    let session = builder
        .commit_from_file(path)
        .map_err(|e| anyhow::anyhow!("Failed to load model from {}: {}", path, e))?;

    tracing::info!("Model loaded from {}", path);
    Ok(session)
}

fn names_from_metadata(session: &Session) -> anyhow::Result<Option<ClassNames>> {
    session
        .metadata()?
        .custom("names")?
        .map(|raw| ClassNames::from_metadata(&raw))
        .transpose()
}

fn task_from_metadata(session: &Session) -> anyhow::Result<Option<ModelTask>> {
    let Some(raw) = session.metadata()?.custom("task")? else {
        return Ok(None);
    };

    match ModelTask::from_metadata(&raw) {
        Some(task) => Ok(Some(task)),
        None => anyhow::bail!(
            "Model task '{}' is not supported, expected 'detect' or 'obb'",
            raw.trim()
        ),
    }
}

/// A names file overrides the embedded table but must cover the same
/// class count, since the count decides how output channels are read.
fn resolve_class_names(
    from_file: Option<ClassNames>,
    embedded: Option<ClassNames>,
) -> anyhow::Result<ClassNames> {
    match (from_file, embedded) {
        (Some(file), Some(embedded)) if file.num_classes() != embedded.num_classes() => {
            anyhow::bail!(
                "CLASS_NAMES_PATH lists {} classes but the model was exported with {}",
                file.num_classes(),
                embedded.num_classes()
            )
        }
        (Some(file), _) => Ok(file),
        (None, Some(embedded)) => Ok(embedded),
        (None, None) => {
            anyhow::bail!("Model metadata has no 'names' entry; set CLASS_NAMES_PATH")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(names: &[&str]) -> ClassNames {
        names.iter().copied().collect()
    }

    #[test]
    fn file_names_override_matching_metadata() {
        let names = resolve_class_names(
            Some(table(&["plane", "ship", "vehicle"])),
            Some(table(&["0", "1", "2"])),
        )
        .unwrap();

        assert_eq!(names.get(1), Some("ship"));
    }

    #[test]
    fn file_with_one_class_too_few_is_rejected() {
        let err = resolve_class_names(
            Some(table(&["plane", "ship"])),
            Some(table(&["plane", "ship", "vehicle"])),
        )
        .unwrap_err();

        assert!(err.to_string().contains("lists 2 classes but the model was exported with 3"));
    }

    #[test]
    fn file_with_one_class_too_many_is_rejected() {
        let result = resolve_class_names(
            Some(table(&["a", "b", "c", "d"])),
            Some(table(&["a", "b", "c"])),
        );

        assert!(result.is_err());
    }

    #[test]
    fn either_source_alone_is_used() {
        assert_eq!(resolve_class_names(Some(table(&["a"])), None).unwrap().len(), 1);
        assert_eq!(resolve_class_names(None, Some(table(&["a", "b"]))).unwrap().len(), 2);
        assert!(resolve_class_names(None, None).is_err());
    }
}
