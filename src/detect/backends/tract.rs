#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};
use image::RgbImage;
use tract_onnx::prelude::*;

use crate::detect::backend::{DetectorBackend, DetectorSettings};
use crate::detect::labels::COCO_CLASSES;
use crate::detect::result::Detection;
use crate::detect::yolo::{self, HeadLayout};

/// Tract-based backend for YOLOv8 ONNX inference.
///
/// Loads a local model file and runs it on RGB frames stretched to the square
/// model input. Boxes are mapped back onto the caller's frame.
pub struct TractBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    settings: DetectorSettings,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, settings: DetectorSettings) -> Result<Self> {
        let model_path = model_path.as_ref();
        let size = settings.input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, size, size)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self { model, settings })
    }

    fn build_input(&self, frame: &RgbImage) -> Tensor {
        let size = self.settings.input_size;
        let resized = imageops::resize(frame, size, size, FilterType::Triangle);
        let edge = size as usize;
        let input = tract_ndarray::Array4::from_shape_fn((1, 3, edge, edge), |(_, c, y, x)| {
            resized.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
        });
        input.into_tensor()
    }

    fn decode_outputs(&self, outputs: TVec<TValue>, frame: &RgbImage) -> Result<Vec<Detection>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let scores = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let layout = HeadLayout::from_shape(scores.shape(), Some(COCO_CLASSES.len() + 4))?;
        let data: Vec<f32> = scores.iter().copied().collect();

        let input = self.settings.input_size as f32;
        yolo::decode(
            &data,
            layout,
            frame.width() as f32 / input,
            frame.height() as f32 / input,
            &self.settings,
        )
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&mut self, frame: &RgbImage) -> Result<Vec<Detection>> {
        let input = self.build_input(frame);
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.decode_outputs(outputs, frame)
    }

    fn warm_up(&mut self) -> Result<()> {
        let size = self.settings.input_size;
        self.detect(&RgbImage::new(size, size)).map(|_| ())
    }
}
