#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::FilterType;
use tract_onnx::prelude::*;

use crate::detect::backend::{DeviceHint, Detector, DetectorSettings};
use crate::detect::decode::{decode_yolov8, non_max_suppression, YoloLayout, NMS_IOU_THRESHOLD};
use crate::detect::result::Detection;
use crate::frame::Frame;

/// YOLOv8 detector running an ONNX export through tract.
///
/// Frames are resized (no letterbox) to the model input and boxes are
/// scaled back to frame coordinates. Inference is CPU-only.
pub struct TractBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    input_width: u32,
    input_height: u32,
    settings: DetectorSettings,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(
        model_path: P,
        input_size: (u32, u32),
        settings: DetectorSettings,
    ) -> Result<Self> {
        let model_path = model_path.as_ref();
        let (input_width, input_height) = input_size;
        if let DeviceHint::Cuda(index) = settings.device {
            log::warn!(
                "tract backend has no GPU support; ignoring device cuda:{} and running on cpu",
                index
            );
        }
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, input_height as usize, input_width as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        log::info!(
            "tract: loaded {} ({}x{} input)",
            model_path.display(),
            input_width,
            input_height
        );
        Ok(Self {
            model,
            input_width,
            input_height,
            settings,
        })
    }

    fn build_input(&self, frame: &Frame) -> Result<Tensor> {
        let image = frame.to_rgb_image()?;
        let resized = image::imageops::resize(
            &image,
            self.input_width,
            self.input_height,
            FilterType::Triangle,
        );
        let width = self.input_width as usize;
        let raw = resized.as_raw();
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, self.input_height as usize, width),
            |(_, channel, y, x)| raw[(y * width + x) * 3 + channel] as f32 / 255.0,
        );
        Ok(input.into_tensor())
    }
}

impl Detector for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn infer(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let input = self.build_input(frame)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let layout = YoloLayout::from_shape(view.shape())
            .ok_or_else(|| anyhow!("unexpected YOLOv8 output shape {:?}", view.shape()))?;
        let data: Vec<f32> = view.iter().copied().collect();

        let scale = (
            frame.width as f32 / self.input_width as f32,
            frame.height as f32 / self.input_height as f32,
        );
        let mut detections = decode_yolov8(
            &data,
            layout,
            scale,
            (frame.width, frame.height),
            self.settings.confidence_threshold,
        );
        non_max_suppression(&mut detections, NMS_IOU_THRESHOLD);
        Ok(detections)
    }

    fn warm_up(&mut self) -> Result<()> {
        let blank = Frame::filled(
            self.input_width,
            self.input_height,
            [114, 114, 114],
            std::time::Instant::now(),
        )?;
        self.infer(&blank).map(|_| ())
    }
}
