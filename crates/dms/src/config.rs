//! DMS configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// How sustained closures contribute to the blink counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlinkCountPolicy {
    /// One blink per closure run, counted when the run first crosses the
    /// blink threshold
    #[default]
    PerClosure,
    /// One blink per frame while the closure stays above the blink threshold
    PerFrame,
}

/// Which eye detector a session runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorBackend {
    /// OpenCV Haar cascade (`vision` feature)
    #[default]
    Cascade,
    /// ONNX model run with tract
    Onnx,
}

/// DMS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DmsConfig {
    /// Eyes closed threshold for a blink (milliseconds)
    pub blink_threshold_ms: u64,

    /// Eyes closed threshold for drowsiness alert (milliseconds)
    pub drowsiness_threshold_ms: u64,

    /// Minimum time between two audible alerts (milliseconds)
    pub alert_cooldown_ms: u64,

    /// Blink counting policy
    pub blink_policy: BlinkCountPolicy,

    /// Eye detector backend
    pub detector: DetectorBackend,

    /// Haar cascade file for eye detection
    pub cascade_path: PathBuf,

    /// Cascade image pyramid scale step
    pub scale_factor: f64,

    /// Neighbouring hits a cascade candidate needs to be kept
    pub min_neighbors: i32,

    /// Eye detection confidence threshold (ONNX)
    pub eye_confidence: f32,

    /// Maximum eye boxes reported per frame
    pub max_eyes: usize,

    /// Eye detection model path (ONNX)
    pub eye_model_path: Option<PathBuf>,

    /// Model input size (width, height)
    pub model_input: (u32, u32),
}

impl Default for DmsConfig {
    fn default() -> Self {
        Self {
            blink_threshold_ms: 500,
            drowsiness_threshold_ms: 2000,
            alert_cooldown_ms: 5000,
            blink_policy: BlinkCountPolicy::PerClosure,
            detector: DetectorBackend::Cascade,
            cascade_path: PathBuf::from("haarcascade_eye.xml"),
            scale_factor: 1.3,
            min_neighbors: 5,
            eye_confidence: 0.6,
            max_eyes: 2,
            eye_model_path: None,
            model_input: (96, 96),
        }
    }
}

impl DmsConfig {
    /// Create strict config (lower thresholds)
    pub fn strict() -> Self {
        Self {
            blink_threshold_ms: 300,
            drowsiness_threshold_ms: 1500,
            ..Default::default()
        }
    }

    /// Create lenient config (higher thresholds)
    pub fn lenient() -> Self {
        Self {
            drowsiness_threshold_ms: 3000,
            alert_cooldown_ms: 10_000,
            ..Default::default()
        }
    }

    pub fn blink_threshold(&self) -> Duration {
        Duration::from_millis(self.blink_threshold_ms)
    }

    pub fn drowsiness_threshold(&self) -> Duration {
        Duration::from_millis(self.drowsiness_threshold_ms)
    }

    pub fn alert_cooldown(&self) -> Duration {
        Duration::from_millis(self.alert_cooldown_ms)
    }

    /// Check threshold ordering
    pub fn validate(&self) -> Result<(), crate::DmsError> {
        if self.blink_threshold_ms > self.drowsiness_threshold_ms {
            return Err(crate::DmsError::Config(format!(
                "blink threshold ({}ms) exceeds drowsiness threshold ({}ms)",
                self.blink_threshold_ms, self.drowsiness_threshold_ms
            )));
        }
        if !(0.0..=1.0).contains(&self.eye_confidence) {
            return Err(crate::DmsError::Config(format!(
                "eye confidence {} outside 0..=1",
                self.eye_confidence
            )));
        }
        if self.scale_factor.is_nan() || self.scale_factor <= 1.0 {
            return Err(crate::DmsError::Config(format!(
                "cascade scale factor {} must be greater than 1",
                self.scale_factor
            )));
        }
        if self.min_neighbors < 0 {
            return Err(crate::DmsError::Config(
                "cascade min_neighbors must not be negative".into(),
            ));
        }
        if self.model_input.0 == 0 || self.model_input.1 == 0 {
            return Err(crate::DmsError::Config("model input size must be non-zero".into()));
        }
        Ok(())
    }
}
