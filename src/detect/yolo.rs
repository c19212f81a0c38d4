//! YOLOv8 output decoding.
//!
//! The exported detection head emits one tensor of shape `[1, 4 + classes, anchors]`
//! (some exporters transpose to `[1, anchors, 4 + classes]`). Each anchor carries a
//! center/size box in model input pixels followed by one score per class.

use anyhow::{anyhow, Result};

use crate::detect::backend::DetectorSettings;
use crate::detect::labels::label_for;
use crate::detect::result::{BoundingBox, Detection};

/// Tensor layout of a YOLOv8 head.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeadLayout {
    /// `[1, attrs, anchors]`
    AttrMajor { attrs: usize, anchors: usize },
    /// `[1, anchors, attrs]`
    AnchorMajor { attrs: usize, anchors: usize },
}

impl HeadLayout {
    /// Infer the layout from an output shape.
    ///
    /// When `attrs_hint` (4 + class count) matches one axis that axis holds the
    /// attributes; otherwise the shorter axis is assumed to.
    pub fn from_shape(shape: &[usize], attrs_hint: Option<usize>) -> Result<Self> {
        let (a, b) = match shape {
            [1, a, b] => (*a, *b),
            [a, b] => (*a, *b),
            _ => return Err(anyhow!("unexpected detection head shape {:?}", shape)),
        };
        let attr_major = match attrs_hint {
            Some(hint) if hint == a => true,
            Some(hint) if hint == b => false,
            _ => a <= b,
        };
        let layout = if attr_major {
            Self::AttrMajor {
                attrs: a,
                anchors: b,
            }
        } else {
            Self::AnchorMajor {
                attrs: b,
                anchors: a,
            }
        };
        if layout.attrs() <= 4 {
            return Err(anyhow!("detection head {:?} has no class scores", shape));
        }
        Ok(layout)
    }

    fn attrs(&self) -> usize {
        match *self {
            Self::AttrMajor { attrs, .. } | Self::AnchorMajor { attrs, .. } => attrs,
        }
    }

    fn anchors(&self) -> usize {
        match *self {
            Self::AttrMajor { anchors, .. } | Self::AnchorMajor { anchors, .. } => anchors,
        }
    }

    fn value(&self, data: &[f32], anchor: usize, attr: usize) -> f32 {
        match *self {
            Self::AttrMajor { anchors, .. } => data[attr * anchors + anchor],
            Self::AnchorMajor { attrs, .. } => data[anchor * attrs + attr],
        }
    }
}

/// Decode raw head output into frame-space detections.
///
/// `scale_x`/`scale_y` map model input pixels back onto the processed frame.
pub fn decode(
    data: &[f32],
    layout: HeadLayout,
    scale_x: f32,
    scale_y: f32,
    settings: &DetectorSettings,
) -> Result<Vec<Detection>> {
    let attrs = layout.attrs();
    let anchors = layout.anchors();
    if data.len() != attrs * anchors {
        return Err(anyhow!(
            "detection head holds {} values, expected {}",
            data.len(),
            attrs * anchors
        ));
    }

    let mut candidates = Vec::new();
    for anchor in 0..anchors {
        let mut best_class = 0usize;
        let mut best_score = f32::NEG_INFINITY;
        for class in 0..attrs - 4 {
            let score = layout.value(data, anchor, 4 + class);
            if score > best_score {
                best_score = score;
                best_class = class;
            }
        }
        if !best_score.is_finite() || best_score < settings.confidence_threshold {
            continue;
        }

        let cx = layout.value(data, anchor, 0);
        let cy = layout.value(data, anchor, 1);
        let w = layout.value(data, anchor, 2);
        let h = layout.value(data, anchor, 3);
        let bbox = BoundingBox::from_corners(
            (cx - w / 2.0) * scale_x,
            (cy - h / 2.0) * scale_y,
            (cx + w / 2.0) * scale_x,
            (cy + h / 2.0) * scale_y,
        );
        let class_id = best_class as u32;
        candidates.push(Detection::new(
            class_id,
            label_for(class_id),
            best_score.min(1.0),
            bbox,
        ));
    }

    Ok(non_max_suppression(
        candidates,
        settings.iou_threshold,
        settings.max_detections,
    ))
}

/// Greedy per-class suppression, highest confidence first, truncated to `max_detections`.
pub fn non_max_suppression(
    mut candidates: Vec<Detection>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<Detection> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<Detection> = Vec::new();
    for candidate in candidates {
        if kept.len() >= max_detections {
            break;
        }
        let overlaps = kept.iter().any(|k| {
            k.class_id == candidate.class_id && k.bbox.iou(&candidate.bbox) > iou_threshold
        });
        if !overlaps {
            kept.push(candidate);
        }
    }
    kept
}
