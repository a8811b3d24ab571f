//! Camera Capture Library for the Drowsiness Monitor
//!
//! Provides the frame type consumed by detection and the sources that
//! produce frames for a detection session:
//! - Live capture from a camera device (`vision` feature, OpenCV videoio)
//! - Image-sequence replay (directory of JPEG/PNG/BMP frames)
//! - Wall-clock or nominal frame-rate timestamping
//! - JPEG encoding for MJPEG streaming

#[cfg(feature = "vision")]
pub mod capture;
pub mod frame;
pub mod source;

#[cfg(feature = "vision")]
pub use capture::VideoCaptureSource;
pub use frame::VideoFrame;
pub use source::{open_source, FrameClock, FrameSource, ImageSequenceSource};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Camera error types
#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Failed to open camera: {0}")]
    Open(String),

    #[error("Failed to decode frame {path}: {reason}")]
    Decode { path: PathBuf, reason: String },

    #[error("Invalid frame buffer: expected {expected} bytes, got {actual}")]
    Buffer { expected: usize, actual: usize },

    #[error("Failed to encode frame: {0}")]
    Encode(String),

    #[error("Capture error: {0}")]
    Capture(String),
}

/// How frames are timestamped by a source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockMode {
    /// Monotonic time elapsed since the source was opened
    #[default]
    Wall,
    /// `sequence / fps`, independent of how fast frames are pulled
    Nominal,
}

/// Camera configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Camera device index for live capture
    pub device: i32,
    /// Replay this directory of recorded frames instead of the camera
    pub frames: Option<PathBuf>,
    /// Target FPS
    pub fps: u32,
    /// Restart from the first frame when the sequence ends
    pub looping: bool,
    /// Timestamp source for frames
    pub clock: ClockMode,
    /// JPEG quality used when streaming annotated frames (1-100)
    pub jpeg_quality: u8,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: 0,
            frames: None,
            fps: 15,
            looping: false,
            clock: ClockMode::Wall,
            jpeg_quality: 80,
        }
    }
}

impl CameraConfig {
    /// Offline replay: deterministic timestamps, no looping
    pub fn replay(frames: impl Into<PathBuf>, fps: u32) -> Self {
        Self {
            frames: Some(frames.into()),
            fps,
            looping: false,
            clock: ClockMode::Nominal,
            ..Default::default()
        }
    }

    /// Interval between frames at the configured FPS
    pub fn frame_interval(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / u64::from(self.fps.max(1)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_interval() {
        let config = CameraConfig {
            fps: 20,
            ..Default::default()
        };
        assert_eq!(config.frame_interval(), Duration::from_millis(50));
    }

    #[test]
    fn test_zero_fps_does_not_divide_by_zero() {
        let config = CameraConfig {
            fps: 0,
            ..Default::default()
        };
        assert_eq!(config.frame_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_default_is_first_camera() {
        let config = CameraConfig::default();
        assert_eq!(config.device, 0);
        assert!(config.frames.is_none());
    }

    #[test]
    fn test_replay_preset() {
        let config = CameraConfig::replay("/tmp/frames", 10);
        assert_eq!(config.frames.as_deref(), Some(std::path::Path::new("/tmp/frames")));
        assert_eq!(config.clock, ClockMode::Nominal);
        assert!(!config.looping);
        assert_eq!(config.fps, 10);
    }
}
