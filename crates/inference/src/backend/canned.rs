use super::Detector;
use crate::detection::Detections;
use crate::names::ClassNames;
use image::RgbImage;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Detector double that answers every image with the same result.
pub struct CannedDetector {
    names: ClassNames,
    response: Result<Detections, String>,
    calls: AtomicUsize,
}

impl CannedDetector {
    pub fn new(names: ClassNames, detections: Detections) -> Self {
        Self {
            names,
            response: Ok(detections),
            calls: AtomicUsize::new(0),
        }
    }

    /// A detector whose every prediction fails with `message`.
    pub fn failing(names: ClassNames, message: impl Into<String>) -> Self {
        Self {
            names,
            response: Err(message.into()),
            calls: AtomicUsize::new(0),
        }
    }

    /// How many times `predict` ran.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Detector for CannedDetector {
    fn predict(&self, _image: &RgbImage) -> anyhow::Result<Detections> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.response {
            Ok(detections) => Ok(detections.clone()),
            Err(message) => Err(anyhow::anyhow!("{}", message)),
        }
    }

    fn class_names(&self) -> &ClassNames {
        &self.names
    }
}
