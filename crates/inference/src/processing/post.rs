use crate::detection::{AxisAlignedBox, Detections, OrientedBox};
use crate::processing::pre::TransformParams;
use common::span;
use ndarray::ArrayViewD;
use std::f32::consts::{FRAC_PI_2, PI};

const PROBIOU_EPS: f64 = 1e-7;

/// Best-scoring class for one anchor, still in model-input pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Candidate {
    cx: f32,
    cy: f32,
    w: f32,
    h: f32,
    angle: f32,
    class_index: usize,
    confidence: f32,
}

impl Candidate {
    fn xyxy(&self) -> [f32; 4] {
        cxcywh_to_xyxy(self.cx, self.cy, self.w, self.h)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Layout {
    AxisAligned,
    Oriented,
}

/// Head type a YOLO export declares in its `task` metadata entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelTask {
    Detect,
    Obb,
}

impl ModelTask {
    /// `None` for tasks this decoder does not serve (segment, pose, ...).
    pub fn from_metadata(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "detect" => Some(Self::Detect),
            "obb" => Some(Self::Obb),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelTask::Detect => "detect",
            ModelTask::Obb => "obb",
        }
    }

    fn layout(&self) -> Layout {
        match self {
            ModelTask::Detect => Layout::AxisAligned,
            ModelTask::Obb => Layout::Oriented,
        }
    }
}

/// Decodes raw YOLO head output `[1, 4 + nc (+1), anchors]` into boxes.
pub struct PostProcessor {
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
    /// When known, the channel count must match this head type exactly.
    pub task: Option<ModelTask>,
}

impl PostProcessor {
    pub fn new(confidence_threshold: f32, iou_threshold: f32, max_detections: usize) -> Self {
        Self {
            confidence_threshold,
            iou_threshold,
            max_detections,
            task: None,
        }
    }

    pub fn with_task(mut self, task: Option<ModelTask>) -> Self {
        self.task = task;
        self
    }

    /// Pick the box layout from the channel count, then threshold, suppress
    /// overlaps per class, and map back to original-image pixels.
    ///
    /// Detections come out in descending confidence.
    pub fn parse_detections(
        &self,
        output: &ArrayViewD<f32>,
        num_classes: usize,
        transform: &TransformParams,
    ) -> anyhow::Result<Detections> {
        let _s = span!("parse_detections");

        let layout = detect_layout(output.shape(), num_classes, self.task)?;
        let candidates = self.collect_candidates(output, num_classes, layout);
        let kept = self.non_maximum_suppression(candidates, layout);

        tracing::trace!(kept = kept.len(), layout = ?layout, "Post-processed detections");

        Ok(match layout {
            Layout::AxisAligned => Detections::AxisAligned(
                kept.iter().map(|c| rescale_axis_aligned(c, transform)).collect(),
            ),
            Layout::Oriented => Detections::Oriented(
                kept.iter().map(|c| rescale_oriented(c, transform)).collect(),
            ),
        })
    }

    fn collect_candidates(
        &self,
        output: &ArrayViewD<f32>,
        num_classes: usize,
        layout: Layout,
    ) -> Vec<Candidate> {
        let anchors = output.shape()[2];
        let mut candidates = Vec::new();

        for i in 0..anchors {
            let mut confidence = f32::NEG_INFINITY;
            let mut class_index = 0usize;
            for c in 0..num_classes {
                let score = output[[0, 4 + c, i]];
                if score > confidence {
                    confidence = score;
                    class_index = c;
                }
            }

            if !(confidence > self.confidence_threshold) {
                continue;
            }

            let angle = match layout {
                Layout::Oriented => output[[0, 4 + num_classes, i]],
                Layout::AxisAligned => 0.0,
            };

            candidates.push(Candidate {
                cx: output[[0, 0, i]],
                cy: output[[0, 1, i]],
                w: output[[0, 2, i]],
                h: output[[0, 3, i]],
                angle,
                class_index,
                confidence,
            });
        }

        candidates
    }

    /// Greedy class-aware NMS, highest confidence first.
    fn non_maximum_suppression(&self, mut candidates: Vec<Candidate>, layout: Layout) -> Vec<Candidate> {
        candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

        let mut kept: Vec<Candidate> = Vec::new();
        for candidate in candidates {
            if kept.len() >= self.max_detections {
                break;
            }

            let suppressed = kept.iter().any(|k| {
                k.class_index == candidate.class_index
                    && overlap(k, &candidate, layout) > self.iou_threshold
            });

            if !suppressed {
                kept.push(candidate);
            }
        }

        kept
    }
}

fn detect_layout(
    shape: &[usize],
    num_classes: usize,
    task: Option<ModelTask>,
) -> anyhow::Result<Layout> {
    if shape.len() != 3 || shape[0] != 1 {
        anyhow::bail!("Unexpected model output shape {:?}, expected [1, C, N]", shape);
    }

    let layout = match shape[1].checked_sub(4 + num_classes) {
        Some(0) => Layout::AxisAligned,
        Some(1) => Layout::Oriented,
        _ => anyhow::bail!(
            "Model output has {} channels per anchor but {} classes imply {} (boxes) or {} (oriented boxes)",
            shape[1],
            num_classes,
            4 + num_classes,
            5 + num_classes
        ),
    };

    // a class table one entry off flips the two layouts
    if let Some(task) = task {
        if task.layout() != layout {
            anyhow::bail!(
                "Model output has {} channels per anchor, which does not fit a '{}' model with {} classes",
                shape[1],
                task.as_str(),
                num_classes
            );
        }
    }

    Ok(layout)
}

fn overlap(a: &Candidate, b: &Candidate, layout: Layout) -> f32 {
    match layout {
        Layout::AxisAligned => iou(&a.xyxy(), &b.xyxy()),
        Layout::Oriented => probiou(a, b),
    }
}

/// Convert bounding box from center-width-height format to corner format
#[inline]
fn cxcywh_to_xyxy(cx: f32, cy: f32, w: f32, h: f32) -> [f32; 4] {
    [cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0]
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let inter_w = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
    let inter_h = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
    let inter = inter_w * inter_h;

    let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
    let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
    let union = area_a + area_b - inter;

    if union <= 0.0 { 0.0 } else { inter / union }
}

/// Second moments of a rotated box treated as a uniform 2D distribution.
fn covariance(c: &Candidate) -> (f64, f64, f64) {
    let a = (c.w as f64).powi(2) / 12.0;
    let b = (c.h as f64).powi(2) / 12.0;
    let (sin, cos) = (c.angle as f64).sin_cos();

    (
        a * cos * cos + b * sin * sin,
        a * sin * sin + b * cos * cos,
        (a - b) * cos * sin,
    )
}

/// Probabilistic IoU of two rotated boxes via the Bhattacharyya distance
/// between their Gaussian approximations.
fn probiou(p: &Candidate, q: &Candidate) -> f32 {
    let (a1, b1, c1) = covariance(p);
    let (a2, b2, c2) = covariance(q);
    let (x1, y1) = (p.cx as f64, p.cy as f64);
    let (x2, y2) = (q.cx as f64, q.cy as f64);

    let (a, b, c) = (a1 + a2, b1 + b2, c1 + c2);
    let det = a * b - c * c;

    let t1 = (a * (y1 - y2).powi(2) + b * (x1 - x2).powi(2)) / (det + PROBIOU_EPS) * 0.25;
    let t2 = (c * (x2 - x1) * (y1 - y2)) / (det + PROBIOU_EPS) * 0.5;
    let t3 = (det
        / (4.0 * ((a1 * b1 - c1 * c1).max(0.0) * (a2 * b2 - c2 * c2).max(0.0)).sqrt()
            + PROBIOU_EPS)
        + PROBIOU_EPS)
        .ln()
        * 0.5;

    let bd = (t1 + t2 + t3).clamp(PROBIOU_EPS, 100.0);
    let hd = (1.0 - (-bd).exp() + PROBIOU_EPS).sqrt();

    (1.0 - hd) as f32
}

fn rescale_axis_aligned(c: &Candidate, transform: &TransformParams) -> AxisAlignedBox {
    let [x1, y1, x2, y2] = c.xyxy();
    let (x1, y1) = transform.to_original(x1, y1);
    let (x2, y2) = transform.to_original(x2, y2);
    let max_x = transform.orig_width as f32;
    let max_y = transform.orig_height as f32;

    AxisAlignedBox {
        x1: x1.clamp(0.0, max_x),
        y1: y1.clamp(0.0, max_y),
        x2: x2.clamp(0.0, max_x),
        y2: y2.clamp(0.0, max_y),
        class_index: c.class_index,
        confidence: c.confidence,
    }
}

/// Centers and sides are rescaled, never clipped; the long side becomes
/// `width` with the angle folded into `[0, pi)`.
fn rescale_oriented(c: &Candidate, transform: &TransformParams) -> OrientedBox {
    let (cx, cy) = transform.to_original(c.cx, c.cy);
    let w = c.w / transform.scale;
    let h = c.h / transform.scale;

    let (width, height, angle) = if w > h {
        (w, h, c.angle)
    } else {
        (h, w, c.angle + FRAC_PI_2)
    };

    OrientedBox {
        cx,
        cy,
        width,
        height,
        angle: angle.rem_euclid(PI),
        class_index: c.class_index,
        confidence: c.confidence,
    }
}
