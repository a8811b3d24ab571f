//! DMS analysis results and overlay status

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::detector::EyeBox;
use crate::state::{EyePhase, FrameDecision};

/// Overlay color for status text (RGB)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlayColor {
    Green,
    Red,
    Orange,
}

impl OverlayColor {
    pub fn rgb(&self) -> [u8; 3] {
        match self {
            OverlayColor::Green => [0, 255, 0],
            OverlayColor::Red => [255, 0, 0],
            OverlayColor::Orange => [255, 165, 0],
        }
    }
}

/// One status line drawn over the frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlayLine {
    pub text: String,
    pub color: OverlayColor,
}

impl OverlayLine {
    fn new(text: impl Into<String>, color: OverlayColor) -> Self {
        Self {
            text: text.into(),
            color,
        }
    }
}

/// Status lines for a decision, top to bottom
pub fn overlay_lines(decision: &FrameDecision) -> Vec<OverlayLine> {
    let status_color = if decision.is_drowsy {
        OverlayColor::Red
    } else {
        OverlayColor::Green
    };

    let mut lines = vec![OverlayLine::new(
        format!("Blinks: {}", decision.blink_counter),
        status_color,
    )];
    if decision.is_drowsy {
        lines.push(OverlayLine::new("DROWSINESS DETECTED!", OverlayColor::Red));
    }
    if decision.alert_on_cooldown {
        lines.push(OverlayLine::new("Alert Cooldown Active", OverlayColor::Orange));
    }
    lines
}

/// Complete DMS analysis result for one frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DmsAnalysis {
    /// Source frame sequence number
    pub sequence: u32,

    /// Session time of the frame
    pub session_time: Duration,

    /// Detected eye regions
    pub eyes: Vec<EyeBox>,

    /// State machine output
    pub decision: FrameDecision,

    /// Status lines for rendering
    pub overlay: Vec<OverlayLine>,
}

impl DmsAnalysis {
    pub fn new(
        sequence: u32,
        session_time: Duration,
        eyes: Vec<EyeBox>,
        decision: FrameDecision,
    ) -> Self {
        Self {
            sequence,
            session_time,
            overlay: overlay_lines(&decision),
            eyes,
            decision,
        }
    }

    pub fn eyes_visible(&self) -> bool {
        !self.eyes.is_empty()
    }

    pub fn phase(&self) -> EyePhase {
        self.decision.phase
    }

    /// Whether the caller must trigger the audio alert for this frame
    pub fn should_alert(&self) -> bool {
        self.decision.should_fire_alert
    }
}
