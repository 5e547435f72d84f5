use crate::backend::Detector;
use crate::errors::InferenceFailure;
use crate::names::ClassNames;
use image::RgbImage;
use serde::{Deserialize, Serialize};

/// One detector output record, whatever its box representation.
pub trait RawDetection {
    /// Smallest axis-aligned rectangle containing the box, as `[x1, y1, x2, y2]`.
    fn wrapping_xyxy(&self) -> [f64; 4];
    fn class_index(&self) -> usize;
    fn confidence(&self) -> f64;
}

/// Axis-aligned box in absolute image pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisAlignedBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub class_index: usize,
    pub confidence: f32,
}

impl RawDetection for AxisAlignedBox {
    fn wrapping_xyxy(&self) -> [f64; 4] {
        [
            self.x1 as f64,
            self.y1 as f64,
            self.x2 as f64,
            self.y2 as f64,
        ]
    }

    fn class_index(&self) -> usize {
        self.class_index
    }

    fn confidence(&self) -> f64 {
        self.confidence as f64
    }
}

/// Rotated box: center, size, and rotation angle in radians.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientedBox {
    pub cx: f32,
    pub cy: f32,
    pub width: f32,
    pub height: f32,
    pub angle: f32,
    pub class_index: usize,
    pub confidence: f32,
}

impl OrientedBox {
    /// The four rotated corners, clockwise from the top-left before rotation.
    pub fn corners(&self) -> [(f64, f64); 4] {
        let (sin, cos) = (self.angle as f64).sin_cos();
        let (hw, hh) = (self.width as f64 / 2.0, self.height as f64 / 2.0);
        let (cx, cy) = (self.cx as f64, self.cy as f64);

        [(-hw, -hh), (hw, -hh), (hw, hh), (-hw, hh)]
            .map(|(dx, dy)| (cx + dx * cos - dy * sin, cy + dx * sin + dy * cos))
    }
}

impl RawDetection for OrientedBox {
    fn wrapping_xyxy(&self) -> [f64; 4] {
        let (sin, cos) = (self.angle as f64).sin_cos();
        let (w, h) = (self.width as f64, self.height as f64);
        let half_w = ((w * cos).abs() + (h * sin).abs()) / 2.0;
        let half_h = ((w * sin).abs() + (h * cos).abs()) / 2.0;
        let (cx, cy) = (self.cx as f64, self.cy as f64);

        [cx - half_w, cy - half_h, cx + half_w, cy + half_h]
    }

    fn class_index(&self) -> usize {
        self.class_index
    }

    fn confidence(&self) -> f64 {
        self.confidence as f64
    }
}

/// What a detector produced for one image. A model populates exactly one
/// kind of box collection.
#[derive(Debug, Clone, PartialEq)]
pub enum Detections {
    AxisAligned(Vec<AxisAlignedBox>),
    Oriented(Vec<OrientedBox>),
}

impl Detections {
    pub fn len(&self) -> usize {
        match self {
            Detections::AxisAligned(boxes) => boxes.len(),
            Detections::Oriented(boxes) => boxes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Detections::AxisAligned(_) => "axis_aligned",
            Detections::Oriented(_) => "oriented",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeType {
    Rectangle,
}

/// Labeled rectangle handed to annotation tooling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedDetection {
    pub confidence: f64,
    pub label: String,
    #[serde(rename = "type")]
    pub shape: ShapeType,
    /// `[x1, y1, x2, y2]`, top-left then bottom-right.
    pub points: [f64; 4],
}

/// Flatten either box collection into labeled rectangles, keeping the
/// detector's emission order.
pub fn normalize(
    detections: &Detections,
    names: &ClassNames,
) -> Result<Vec<NormalizedDetection>, InferenceFailure> {
    match detections {
        Detections::AxisAligned(boxes) => flatten(boxes, names),
        Detections::Oriented(boxes) => flatten(boxes, names),
    }
}

fn flatten<D: RawDetection>(
    records: &[D],
    names: &ClassNames,
) -> Result<Vec<NormalizedDetection>, InferenceFailure> {
    records
        .iter()
        .enumerate()
        .map(|(i, record)| to_rectangle(i, record, names))
        .collect()
}

fn to_rectangle<D: RawDetection>(
    position: usize,
    record: &D,
    names: &ClassNames,
) -> Result<NormalizedDetection, InferenceFailure> {
    let [ax, ay, bx, by] = record.wrapping_xyxy();
    if ![ax, ay, bx, by].iter().all(|v| v.is_finite()) {
        return Err(InferenceFailure::new(format!(
            "Malformed model output: non-finite box coordinates at detection {}",
            position
        )));
    }

    let confidence = record.confidence();
    if !(0.0..=1.0).contains(&confidence) {
        return Err(InferenceFailure::new(format!(
            "Malformed model output: confidence {} at detection {} is outside [0, 1]",
            confidence, position
        )));
    }

    let class_index = record.class_index();
    let label = names.get(class_index).ok_or_else(|| {
        InferenceFailure::new(format!(
            "Class index {} out of range for {} class names",
            class_index,
            names.len()
        ))
    })?;

    Ok(NormalizedDetection {
        confidence,
        label: label.to_string(),
        shape: ShapeType::Rectangle,
        points: [ax.min(bx), ay.min(by), ax.max(bx), ay.max(by)],
    })
}

/// Run the detector on one image and flatten its output.
pub fn run_detection(
    detector: &dyn Detector,
    image: &RgbImage,
) -> Result<Vec<NormalizedDetection>, InferenceFailure> {
    let detections = detector.predict(image)?;

    tracing::debug!(
        kind = detections.kind(),
        count = detections.len(),
        "Detector output"
    );

    normalize(&detections, detector.class_names())
}
