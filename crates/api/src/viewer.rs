//! Standalone modes: local monitor and offline replay

use camera_capture::frame::encode_jpeg;
use dms::{DmsConfig, DrowsinessState, EyePhase, OverlayLine};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufRead, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::pipeline::FramePipeline;
use crate::ApiError;

/// Totals for a finished run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub frames: u64,
    pub alerts: u64,
}

/// Latest replay timestamp, in seconds
pub const MAX_REPLAY_SECS: f64 = 1.0e9;

/// Somewhere to show annotated frames
pub trait FrameWindow {
    /// Show one frame. Returns `false` once the user asked to quit.
    fn show(&mut self, frame: &RgbImage) -> Result<bool, ApiError>;
}

/// `q` or Esc
pub fn is_quit_key(key: i32) -> bool {
    key == 27 || key == i32::from(b'q')
}

#[cfg(feature = "vision")]
mod window {
    use image::RgbImage;
    use opencv::{
        core::{self, Mat, Scalar},
        highgui, imgproc,
        prelude::*,
    };

    use super::{is_quit_key, FrameWindow};
    use crate::ApiError;

    /// Native window backed by OpenCV highgui
    pub struct HighGuiWindow {
        name: String,
    }

    impl HighGuiWindow {
        pub fn open(name: &str) -> Result<Self, ApiError> {
            highgui::named_window_def(name).map_err(window_error)?;
            Ok(Self {
                name: name.to_string(),
            })
        }
    }

    impl FrameWindow for HighGuiWindow {
        fn show(&mut self, frame: &RgbImage) -> Result<bool, ApiError> {
            let (width, height) = frame.dimensions();
            let mut rgb = Mat::new_rows_cols_with_default(
                height as i32,
                width as i32,
                core::CV_8UC3,
                Scalar::all(0.0),
            )
            .map_err(window_error)?;
            rgb.data_bytes_mut()
                .map_err(window_error)?
                .copy_from_slice(frame.as_raw());

            let mut bgr = Mat::default();
            imgproc::cvt_color(&rgb, &mut bgr, imgproc::COLOR_RGB2BGR, 0).map_err(window_error)?;
            highgui::imshow(&self.name, &bgr).map_err(window_error)?;

            let key = highgui::poll_key().map_err(window_error)?;
            Ok(!is_quit_key(key))
        }
    }

    impl Drop for HighGuiWindow {
        fn drop(&mut self) {
            let _ = highgui::destroy_window(&self.name);
        }
    }

    fn window_error(e: opencv::Error) -> ApiError {
        ApiError::Internal(format!("window: {}", e))
    }
}

#[cfg(feature = "vision")]
pub use window::HighGuiWindow;

/// Open the monitor window, or nothing when running headless
#[cfg(feature = "vision")]
pub fn open_window(
    title: &str,
    headless: bool,
) -> Result<Option<Box<dyn FrameWindow>>, ApiError> {
    if headless {
        return Ok(None);
    }
    Ok(Some(Box::new(HighGuiWindow::open(title)?)))
}

#[cfg(not(feature = "vision"))]
pub fn open_window(
    _title: &str,
    headless: bool,
) -> Result<Option<Box<dyn FrameWindow>>, ApiError> {
    if !headless {
        warn!("Built without the `vision` feature, running headless");
    }
    Ok(None)
}

/// Run one session locally until the source ends, `stop` is set or the
/// window is closed
///
/// Status changes are logged; annotated frames go to `output` when given.
pub fn run_monitor(
    mut pipeline: FramePipeline,
    interval: Duration,
    jpeg_quality: u8,
    output: Option<&Path>,
    mut window: Option<&mut dyn FrameWindow>,
    stop: &AtomicBool,
) -> Result<RunSummary, ApiError> {
    if let Some(dir) = output {
        fs::create_dir_all(dir)?;
    }

    let mut summary = RunSummary::default();
    let mut last_status: Vec<OverlayLine> = Vec::new();

    while !stop.load(Ordering::Relaxed) {
        let started = Instant::now();
        let Some(processed) = pipeline.step()? else {
            break;
        };
        summary.frames += 1;
        if processed.alert.is_some() {
            summary.alerts += 1;
        }

        if processed.analysis.overlay != last_status {
            let text: Vec<&str> = processed
                .analysis
                .overlay
                .iter()
                .map(|l| l.text.as_str())
                .collect();
            info!(frame = processed.analysis.sequence, "{}", text.join(" | "));
            last_status = processed.analysis.overlay.clone();
        }

        if let Some(dir) = output {
            let path = dir.join(format!("frame_{:06}.jpg", processed.analysis.sequence));
            match encode_jpeg(&processed.annotated, jpeg_quality) {
                Ok(jpeg) => fs::write(&path, jpeg)?,
                Err(e) => warn!("Frame {} not written: {}", processed.analysis.sequence, e),
            }
        }

        if let Some(window) = window.as_deref_mut() {
            if !window.show(&processed.annotated)? {
                info!("Exit requested by user");
                break;
            }
        }

        if let Some(remaining) = interval.checked_sub(started.elapsed()) {
            std::thread::sleep(remaining);
        }
    }

    info!(frames = summary.frames, alerts = summary.alerts, "Monitor session ended");
    Ok(summary)
}

/// One replay input line: `{"t": seconds, "eyes": count}`
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Observation {
    pub t: f64,
    pub eyes: u32,
}

/// One replay output line
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ReplayRecord {
    pub t: f64,
    pub eyes: u32,
    pub blink_counter: u32,
    pub is_drowsy: bool,
    pub alert_on_cooldown: bool,
    pub should_fire_alert: bool,
    pub phase: EyePhase,
}

/// Feed JSON-lines observations straight into the state machine
///
/// Blank lines and `#` comments are skipped. Writes one JSON record per
/// observation to `out`.
pub fn replay<R: BufRead, W: Write>(
    config: &DmsConfig,
    input: R,
    mut out: W,
) -> Result<RunSummary, ApiError> {
    config.validate()?;
    let mut state = DrowsinessState::from_config(config);
    let mut summary = RunSummary::default();

    for (idx, line) in input.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let obs: Observation = serde_json::from_str(trimmed).map_err(|e| ApiError::Replay {
            line: idx + 1,
            reason: e.to_string(),
        })?;
        if !obs.t.is_finite() || !(0.0..=MAX_REPLAY_SECS).contains(&obs.t) {
            return Err(ApiError::Replay {
                line: idx + 1,
                reason: format!("invalid timestamp {}", obs.t),
            });
        }

        let now = Duration::from_micros((obs.t * 1_000_000.0).round() as u64);
        let decision = state.update(obs.eyes > 0, now);
        summary.frames += 1;
        if decision.should_fire_alert {
            summary.alerts += 1;
        }

        let record = ReplayRecord {
            t: obs.t,
            eyes: obs.eyes,
            blink_counter: decision.blink_counter,
            is_drowsy: decision.is_drowsy,
            alert_on_cooldown: decision.alert_on_cooldown,
            should_fire_alert: decision.should_fire_alert,
            phase: decision.phase,
        };
        serde_json::to_writer(&mut out, &record).map_err(|e| ApiError::Internal(e.to_string()))?;
        out.write_all(b"\n")?;
    }

    out.flush()?;
    Ok(summary)
}
