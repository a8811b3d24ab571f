//! Alerting System
//!
//! Plays the drowsiness alert sound without blocking the frame loop.

mod manager;
mod sound;

pub use manager::{AlertConfig, AlertDispatcher, AlertEvent, AlertStats, AlertStatsSnapshot};
pub use sound::{AlertSound, CommandSound, SilentSound};

use thiserror::Error;

/// Errors while playing an alert
#[derive(Debug, Error)]
pub enum AlertError {
    #[error("Failed to start player {program}: {reason}")]
    Spawn { program: String, reason: String },

    #[error("Player {program} exited with {status}")]
    PlayerFailed { program: String, status: String },

    #[error("Sound file not found: {0}")]
    MissingSound(String),
}
