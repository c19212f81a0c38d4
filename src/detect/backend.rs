use anyhow::Result;
use image::RgbImage;

use crate::detect::result::Detection;

/// Inference parameters handed to every backend.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectorSettings {
    /// Detections scoring below this are discarded by the backend.
    pub confidence_threshold: f32,
    /// Upper bound on detections returned per frame.
    pub max_detections: usize,
    /// Square model input edge in pixels.
    pub input_size: u32,
    /// Overlap above which same-class boxes are suppressed.
    pub iou_threshold: f32,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.2,
            max_detections: 20,
            input_size: 640,
            iou_threshold: 0.45,
        }
    }
}

/// Detector backend trait.
///
/// Backends wrap an external pretrained model. They receive the processed RGB frame
/// and return detections in that frame's pixel coordinates. Inference is synchronous;
/// the monitor loop blocks for its duration.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame.
    fn detect(&mut self, frame: &RgbImage) -> Result<Vec<Detection>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }

    /// Release transient buffers. Called on the housekeeping timer.
    fn release_transient(&mut self) {}
}

impl<B: DetectorBackend + ?Sized> DetectorBackend for Box<B> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn detect(&mut self, frame: &RgbImage) -> Result<Vec<Detection>> {
        (**self).detect(frame)
    }

    fn warm_up(&mut self) -> Result<()> {
        (**self).warm_up()
    }

    fn release_transient(&mut self) {
        (**self).release_transient()
    }
}
