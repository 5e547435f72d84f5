use crate::detection::Detections;
use crate::names::ClassNames;
use image::RgbImage;

#[cfg(feature = "ort-backend")]
pub mod ort;

#[cfg(any(test, feature = "test-util"))]
pub mod canned;

/// A loaded object-detection model.
///
/// Constructed once per process and shared read-only between requests, so
/// implementations must tolerate concurrent `predict` calls.
pub trait Detector: Send + Sync {
    /// Run single-image prediction. Boxes are in pixel coordinates of `image`.
    fn predict(&self, image: &RgbImage) -> anyhow::Result<Detections>;

    /// Table used to resolve the class indices `predict` emits.
    fn class_names(&self) -> &ClassNames;
}
