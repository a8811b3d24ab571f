//! Alert dispatch implementation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::sound::{AlertSound, CommandSound, SilentSound};

/// Alert configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Play audio at all
    pub enabled: bool,
    /// Player program (default: aplay)
    pub player: String,
    /// Extra player arguments placed before the sound path
    pub player_args: Vec<String>,
    /// Alert sound file
    pub sound_path: PathBuf,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            player: "aplay".to_string(),
            player_args: vec!["-q".to_string()],
            sound_path: PathBuf::from("sound.wav"),
        }
    }
}

impl AlertConfig {
    /// Build the configured sound backend
    pub fn build_sound(&self) -> Arc<dyn AlertSound> {
        if !self.enabled {
            return Arc::new(SilentSound);
        }
        if !self.sound_path.is_file() {
            // Playback failures are non-fatal; each alert will log the error
            warn!("Alert sound {} not found", self.sound_path.display());
        }
        Arc::new(CommandSound::new(
            self.player.clone(),
            self.player_args.clone(),
            self.sound_path.clone(),
        ))
    }
}

/// A fired drowsiness alert
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertEvent {
    /// Session that fired the alert
    pub session_id: Uuid,
    /// Wall-clock time of the decision
    pub fired_at: DateTime<Utc>,
    /// How long the eyes had been closed
    pub closed_duration_ms: u64,
    /// Blink counter at the time of the alert
    pub blink_counter: u32,
}

impl AlertEvent {
    pub fn new(session_id: Uuid, closed_duration_ms: u64, blink_counter: u32) -> Self {
        Self {
            session_id,
            fired_at: Utc::now(),
            closed_duration_ms,
            blink_counter,
        }
    }
}

/// Playback counters
#[derive(Debug, Default)]
pub struct AlertStats {
    dispatched: AtomicU64,
    played: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time copy of [`AlertStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AlertStatsSnapshot {
    pub dispatched: u64,
    pub played: u64,
    pub failed: u64,
}

impl AlertStats {
    pub fn snapshot(&self) -> AlertStatsSnapshot {
        AlertStatsSnapshot {
            dispatched: self.dispatched.load(Ordering::Relaxed),
            played: self.played.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Fire-and-forget alert playback
///
/// Cooldown gating happens in the drowsiness state before `dispatch` is
/// called; the dispatcher only runs playback off the caller's thread.
#[derive(Clone)]
pub struct AlertDispatcher {
    sound: Arc<dyn AlertSound>,
    runtime: Handle,
    stats: Arc<AlertStats>,
}

impl AlertDispatcher {
    /// Create a dispatcher that spawns playback on `runtime`
    pub fn new(sound: Arc<dyn AlertSound>, runtime: Handle) -> Self {
        Self {
            sound,
            runtime,
            stats: Arc::new(AlertStats::default()),
        }
    }

    /// Create a dispatcher from configuration
    pub fn from_config(config: &AlertConfig, runtime: Handle) -> Self {
        info!("Creating alert dispatcher with config: {:?}", config);
        Self::new(config.build_sound(), runtime)
    }

    /// Start playing the alert and return immediately
    ///
    /// Playback errors are logged and counted, never returned. The handle
    /// may be dropped.
    pub fn dispatch(&self, event: AlertEvent) -> JoinHandle<()> {
        self.stats.dispatched.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("dms_alerts_fired_total").increment(1);
        info!(
            session = %event.session_id,
            "Drowsiness alert: eyes closed {}ms, {} blinks",
            event.closed_duration_ms,
            event.blink_counter
        );

        let sound = Arc::clone(&self.sound);
        let stats = Arc::clone(&self.stats);
        self.runtime.spawn_blocking(move || match sound.play() {
            Ok(()) => {
                stats.played.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                error!(session = %event.session_id, "Failed to play alert: {}", e);
                stats.failed.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("alert_playback_failures_total").increment(1);
            }
        })
    }

    pub fn stats(&self) -> AlertStatsSnapshot {
        self.stats.snapshot()
    }
}
