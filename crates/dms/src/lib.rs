//! Driver Monitoring System (DMS)
//!
//! Real-time driver drowsiness estimation from eye visibility:
//! - Eye detection behind the [`EyeDetector`] seam (OpenCV Haar cascade or
//!   an ONNX model)
//! - Blink counting and sustained-closure (drowsiness) tracking
//! - Alert decisions gated by a cooldown window
//! - Overlay status lines for rendering

pub mod analysis;
#[cfg(feature = "vision")]
pub mod cascade;
pub mod config;
pub mod detector;
pub mod state;

pub use analysis::{DmsAnalysis, OverlayColor, OverlayLine};
#[cfg(feature = "vision")]
pub use cascade::CascadeEyeDetector;
pub use config::{BlinkCountPolicy, DetectorBackend, DmsConfig};
pub use detector::{load_detector, EyeBox, EyeDetector, OnnxEyeDetector};
pub use state::{DrowsinessState, EyePhase, FrameDecision, Thresholds};

use camera_capture::frame::VideoFrame;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// DMS error types
#[derive(Error, Debug)]
pub enum DmsError {
    #[error("Eye detector unavailable: {0}")]
    DetectorUnavailable(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl<T: EyeDetector + ?Sized> EyeDetector for Box<T> {
    fn detect(&mut self, frame: &VideoFrame) -> Result<Vec<EyeBox>, DmsError> {
        (**self).detect(frame)
    }
}

/// One detection session: a detector plus its own drowsiness state
pub struct DmsSession<D = Box<dyn EyeDetector>> {
    detector: D,
    state: DrowsinessState,
    /// Timestamp of the first analyzed frame
    epoch: Option<Duration>,
    frames: u64,
}

impl DmsSession<Box<dyn EyeDetector>> {
    /// Create a session with the configured eye detector
    pub fn open(config: &DmsConfig) -> Result<Self, DmsError> {
        Self::new(config, load_detector(config)?)
    }
}

impl<D: EyeDetector> DmsSession<D> {
    /// Create a new session with configuration and detector
    pub fn new(config: &DmsConfig, detector: D) -> Result<Self, DmsError> {
        config.validate()?;
        Ok(Self {
            detector,
            state: DrowsinessState::from_config(config),
            epoch: None,
            frames: 0,
        })
    }

    /// Analyze a single frame for driver state
    pub fn analyze(&mut self, frame: &VideoFrame) -> Result<DmsAnalysis, DmsError> {
        let eyes = self.detector.detect(frame)?;

        let timestamp = frame.timestamp();
        let epoch = *self.epoch.get_or_insert(timestamp);
        let now = timestamp.saturating_sub(epoch);

        let decision = self.observe(!eyes.is_empty(), now);
        Ok(DmsAnalysis::new(frame.sequence, now, eyes, decision))
    }

    /// Feed an eye-visibility observation directly, bypassing detection
    pub fn observe(&mut self, eyes_visible: bool, now: Duration) -> FrameDecision {
        let was_drowsy = self.state.is_drowsy();
        let was_cooling = self.state.alert_on_cooldown();

        let decision = self.state.update(eyes_visible, now);
        self.frames += 1;

        if decision.is_drowsy && !was_drowsy {
            warn!(
                "Drowsiness detected: eyes closed for {:?}",
                decision.closed_duration.unwrap_or_default()
            );
        } else if was_drowsy && !decision.is_drowsy {
            info!("Eyes reopened, drowsy episode over");
        }

        if decision.should_fire_alert {
            warn!("Drowsiness alert fired at {:?}", now);
        } else if was_cooling && !decision.alert_on_cooldown {
            debug!("Alert cooldown expired at {:?}", now);
        }

        decision
    }

    pub fn state(&self) -> &DrowsinessState {
        &self.state
    }

    /// Frames processed since the session started
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Reset driver state (new session on the same detector)
    pub fn reset(&mut self) {
        self.state.reset();
        self.epoch = None;
        self.frames = 0;
    }
}
