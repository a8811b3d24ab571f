//! Haar cascade eye detection (OpenCV objdetect)

use camera_capture::frame::VideoFrame;
use opencv::{
    core::{Mat, Rect, Size, Vector},
    imgproc,
    objdetect::CascadeClassifier,
    prelude::*,
};
use tracing::{debug, error, info};

use crate::detector::{EyeBox, EyeDetector};
use crate::{DmsConfig, DmsError};

/// Eye detector running `detectMultiScale` over the grayscale frame
///
/// Cascades give no score, so every hit is reported with confidence 1.0.
pub struct CascadeEyeDetector {
    classifier: CascadeClassifier,
    scale_factor: f64,
    min_neighbors: i32,
    max_eyes: usize,
}

impl CascadeEyeDetector {
    /// Load the cascade named by `config.cascade_path`
    pub fn load(config: &DmsConfig) -> Result<Self, DmsError> {
        let path = &config.cascade_path;
        if !path.is_file() {
            error!("Eye cascade not found at {}", path.display());
            return Err(DmsError::DetectorUnavailable(format!(
                "{} does not exist",
                path.display()
            )));
        }
        let name = path.to_str().ok_or_else(|| {
            DmsError::DetectorUnavailable(format!("{} is not valid UTF-8", path.display()))
        })?;

        info!("Loading eye cascade from {}", path.display());
        let classifier = CascadeClassifier::new(name).map_err(|e| {
            error!("Failed to load eye cascade: {}", e);
            DmsError::DetectorUnavailable(e.to_string())
        })?;
        if classifier
            .empty()
            .map_err(|e| DmsError::DetectorUnavailable(e.to_string()))?
        {
            return Err(DmsError::DetectorUnavailable(format!(
                "{} is not a usable cascade",
                path.display()
            )));
        }

        Ok(Self {
            classifier,
            scale_factor: config.scale_factor,
            min_neighbors: config.min_neighbors,
            max_eyes: config.max_eyes,
        })
    }
}

impl EyeDetector for CascadeEyeDetector {
    fn detect(&mut self, frame: &VideoFrame) -> Result<Vec<EyeBox>, DmsError> {
        let rgb = Mat::from_slice(frame.data.as_slice()).map_err(inference_error)?;
        let rgb = rgb.reshape(3, frame.height as i32).map_err(inference_error)?;

        let mut gray = Mat::default();
        imgproc::cvt_color(&rgb, &mut gray, imgproc::COLOR_RGB2GRAY, 0)
            .map_err(inference_error)?;

        let mut hits = Vector::<Rect>::new();
        self.classifier
            .detect_multi_scale(
                &gray,
                &mut hits,
                self.scale_factor,
                self.min_neighbors,
                0,
                Size::new(0, 0),
                Size::new(0, 0),
            )
            .map_err(inference_error)?;

        let eyes: Vec<EyeBox> = hits
            .iter()
            .take(self.max_eyes)
            .map(|r| EyeBox {
                x: r.x as f32,
                y: r.y as f32,
                width: r.width as f32,
                height: r.height as f32,
                confidence: 1.0,
            })
            .collect();
        debug!("Frame {}: {} eye(s)", frame.sequence, eyes.len());
        Ok(eyes)
    }
}

fn inference_error(e: opencv::Error) -> DmsError {
    DmsError::Inference(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;

    #[test]
    fn test_missing_cascade_is_unavailable() {
        let config = DmsConfig {
            cascade_path: PathBuf::from("/no/such/haarcascade_eye.xml"),
            ..Default::default()
        };
        let err = CascadeEyeDetector::load(&config).err().unwrap();
        assert!(matches!(err, DmsError::DetectorUnavailable(_)));
    }

    #[test]
    fn test_garbage_cascade_is_unavailable() {
        let mut file = tempfile::Builder::new().suffix(".xml").tempfile().unwrap();
        writeln!(file, "<opencv_storage><nothing/></opencv_storage>").unwrap();

        let config = DmsConfig {
            cascade_path: file.path().to_path_buf(),
            ..Default::default()
        };
        let err = CascadeEyeDetector::load(&config).err().unwrap();
        assert!(matches!(err, DmsError::DetectorUnavailable(_)));
    }
}
