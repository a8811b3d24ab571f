//! Eye detection models

use camera_capture::frame::VideoFrame;
use image::imageops::{self, FilterType};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tract_onnx::prelude::*;
use tracing::{debug, error, info};

use crate::config::DetectorBackend;
use crate::{DmsConfig, DmsError};

type EyePlan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Values per detection row: x, y, w, h, score
const ROW_LEN: usize = 5;

/// Eye bounding box in frame pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EyeBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

/// Black-box eye detector: zero or more eye regions per frame
pub trait EyeDetector: Send {
    fn detect(&mut self, frame: &VideoFrame) -> Result<Vec<EyeBox>, DmsError>;
}

/// Load the detector `config.detector` selects
pub fn load_detector(config: &DmsConfig) -> Result<Box<dyn EyeDetector>, DmsError> {
    match config.detector {
        DetectorBackend::Cascade => load_cascade(config),
        DetectorBackend::Onnx => Ok(Box::new(OnnxEyeDetector::load(config)?)),
    }
}

#[cfg(feature = "vision")]
fn load_cascade(config: &DmsConfig) -> Result<Box<dyn EyeDetector>, DmsError> {
    Ok(Box::new(crate::cascade::CascadeEyeDetector::load(config)?))
}

#[cfg(not(feature = "vision"))]
fn load_cascade(_config: &DmsConfig) -> Result<Box<dyn EyeDetector>, DmsError> {
    Err(DmsError::DetectorUnavailable(
        "Haar cascade detection is not compiled in (enable the `vision` feature)".into(),
    ))
}

/// Eye detector backed by an ONNX model run with tract
///
/// The model takes a `[1, 1, H, W]` grayscale tensor scaled to `0..1` and
/// returns rows of `(x, y, w, h, score)` with coordinates normalized to the
/// input image. Clones share the loaded plan, so one model load can serve
/// many sessions.
#[derive(Clone)]
pub struct OnnxEyeDetector {
    plan: Arc<EyePlan>,
    input: (u32, u32),
    confidence_threshold: f32,
    max_eyes: usize,
}

impl OnnxEyeDetector {
    /// Load the configured eye model; fails if no usable model is available
    pub fn load(config: &DmsConfig) -> Result<Self, DmsError> {
        let path = config.eye_model_path.as_ref().ok_or_else(|| {
            DmsError::DetectorUnavailable("no eye model path configured".into())
        })?;

        if !path.is_file() {
            error!("Eye model not found at {}", path.display());
            return Err(DmsError::DetectorUnavailable(format!(
                "{} does not exist",
                path.display()
            )));
        }

        info!("Loading eye detection model from {}", path.display());
        let (width, height) = config.model_input;
        let plan = tract_onnx::onnx()
            .model_for_path(path)
            .and_then(|model| {
                model.with_input_fact(
                    0,
                    f32::fact([1, 1, height as usize, width as usize]).into(),
                )
            })
            .and_then(|model| model.into_optimized())
            .and_then(|model| model.into_runnable())
            .map_err(|e| {
                error!("Failed to load eye model: {}", e);
                DmsError::DetectorUnavailable(e.to_string())
            })?;

        Ok(Self {
            plan: Arc::new(plan),
            input: (width, height),
            confidence_threshold: config.eye_confidence,
            max_eyes: config.max_eyes,
        })
    }

    fn input_tensor(&self, frame: &VideoFrame) -> Tensor {
        let (width, height) = self.input;
        let gray = frame.to_grayscale();
        let resized = imageops::resize(&gray, width, height, FilterType::Triangle);

        tract_ndarray::Array4::from_shape_fn(
            (1, 1, height as usize, width as usize),
            |(_, _, y, x)| resized.get_pixel(x as u32, y as u32).0[0] as f32 / 255.0,
        )
        .into()
    }
}

impl EyeDetector for OnnxEyeDetector {
    fn detect(&mut self, frame: &VideoFrame) -> Result<Vec<EyeBox>, DmsError> {
        let input = self.input_tensor(frame);
        let outputs = self
            .plan
            .run(tvec!(input.into()))
            .map_err(|e| DmsError::Inference(e.to_string()))?;

        let output = outputs
            .first()
            .ok_or_else(|| DmsError::Inference("model produced no outputs".into()))?;
        let values: Vec<f32> = output
            .to_array_view::<f32>()
            .map_err(|e| DmsError::Inference(e.to_string()))?
            .iter()
            .copied()
            .collect();

        let eyes = decode_rows(
            &values,
            frame.width,
            frame.height,
            self.confidence_threshold,
            self.max_eyes,
        );
        debug!("Frame {}: {} eye(s)", frame.sequence, eyes.len());
        Ok(eyes)
    }
}

/// Turn flat `(x, y, w, h, score)` rows into pixel boxes
///
/// Rows under the threshold are dropped; the best `max_eyes` are kept.
pub fn decode_rows(
    values: &[f32],
    frame_width: u32,
    frame_height: u32,
    confidence_threshold: f32,
    max_eyes: usize,
) -> Vec<EyeBox> {
    let fw = frame_width as f32;
    let fh = frame_height as f32;

    let mut eyes: Vec<EyeBox> = values
        .chunks_exact(ROW_LEN)
        .filter(|row| row[4].is_finite() && row[4] >= confidence_threshold)
        .map(|row| {
            let x = row[0].clamp(0.0, 1.0);
            let y = row[1].clamp(0.0, 1.0);
            EyeBox {
                x: x * fw,
                y: y * fh,
                width: row[2].clamp(0.0, 1.0 - x) * fw,
                height: row[3].clamp(0.0, 1.0 - y) * fh,
                confidence: row[4],
            }
        })
        .collect();

    eyes.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    eyes.truncate(max_eyes);
    eyes
}
