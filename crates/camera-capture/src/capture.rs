//! Live camera capture through OpenCV videoio

use opencv::{
    core::Mat,
    imgproc,
    prelude::*,
    videoio::{self, VideoCapture},
};
use tracing::{info, warn};

use crate::source::{FrameClock, FrameSource};
use crate::{CameraConfig, CameraError, VideoFrame};

/// Frames from a camera device, converted from BGR to RGB
pub struct VideoCaptureSource {
    cap: VideoCapture,
    device: i32,
    sequence: u32,
    clock: FrameClock,
}

impl VideoCaptureSource {
    /// Open camera `config.device`
    pub fn open(config: &CameraConfig) -> Result<Self, CameraError> {
        info!("Opening camera {}", config.device);
        let mut cap = VideoCapture::new(config.device, videoio::CAP_ANY)
            .map_err(|e| CameraError::Open(format!("camera {}: {}", config.device, e)))?;

        let opened = cap
            .is_opened()
            .map_err(|e| CameraError::Open(format!("camera {}: {}", config.device, e)))?;
        if !opened {
            return Err(CameraError::Open(format!(
                "camera {} is not available",
                config.device
            )));
        }

        // Only the newest frame matters
        if let Err(e) = cap.set(videoio::CAP_PROP_BUFFERSIZE, 1.0) {
            warn!("Camera {}: buffer size not set: {}", config.device, e);
        }
        if let Err(e) = cap.set(videoio::CAP_PROP_FPS, f64::from(config.fps)) {
            warn!("Camera {}: fps not set: {}", config.device, e);
        }

        Ok(Self {
            cap,
            device: config.device,
            sequence: 0,
            clock: FrameClock::new(config.clock, config.fps),
        })
    }
}

impl FrameSource for VideoCaptureSource {
    fn next_frame(&mut self) -> Result<Option<VideoFrame>, CameraError> {
        let mut bgr = Mat::default();
        let grabbed = self.cap.read(&mut bgr).map_err(capture_error)?;
        if !grabbed || bgr.empty() {
            info!("Camera {} stopped delivering frames", self.device);
            return Ok(None);
        }

        let mut rgb = Mat::default();
        imgproc::cvt_color(&bgr, &mut rgb, imgproc::COLOR_BGR2RGB, 0).map_err(capture_error)?;
        let data = rgb.data_bytes().map_err(capture_error)?.to_vec();

        let sequence = self.sequence;
        let timestamp = self.clock.stamp(sequence);
        self.sequence = self.sequence.wrapping_add(1);

        VideoFrame::new(
            data,
            rgb.cols() as u32,
            rgb.rows() as u32,
            u64::try_from(timestamp.as_nanos()).unwrap_or(u64::MAX),
            sequence,
        )
        .map(Some)
    }
}

fn capture_error(e: opencv::Error) -> CameraError {
    CameraError::Capture(e.to_string())
}
