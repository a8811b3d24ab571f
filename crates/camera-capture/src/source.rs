//! Frame sources

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::{CameraConfig, CameraError, ClockMode, VideoFrame};

const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

/// A sequence of frames for one detection session
pub trait FrameSource: Send {
    /// Next frame, or `None` once the stream has ended
    fn next_frame(&mut self) -> Result<Option<VideoFrame>, CameraError>;
}

/// Stamps frames with a monotonic timestamp
#[derive(Debug, Clone, Copy)]
pub enum FrameClock {
    /// Elapsed time since `start`
    Wall(Instant),
    /// `sequence / fps`
    Nominal { fps: u32 },
}

impl FrameClock {
    pub fn new(mode: ClockMode, fps: u32) -> Self {
        match mode {
            ClockMode::Wall => FrameClock::Wall(Instant::now()),
            ClockMode::Nominal => FrameClock::Nominal { fps: fps.max(1) },
        }
    }

    /// Timestamp for the frame with the given sequence number
    pub fn stamp(&self, sequence: u32) -> Duration {
        match self {
            FrameClock::Wall(start) => start.elapsed(),
            FrameClock::Nominal { fps } => {
                Duration::from_nanos(u64::from(sequence) * 1_000_000_000 / u64::from(*fps))
            }
        }
    }
}

/// Replays a directory of still images as a camera feed
pub struct ImageSequenceSource {
    files: Vec<PathBuf>,
    cursor: usize,
    sequence: u32,
    looping: bool,
    clock: FrameClock,
}

impl ImageSequenceSource {
    /// Open the directory named by `config.frames`
    pub fn open(config: &CameraConfig) -> Result<Self, CameraError> {
        let dir = config
            .frames
            .as_deref()
            .ok_or_else(|| CameraError::Open("no frame directory configured".to_string()))?;
        let files = list_frames(dir)?;
        if files.is_empty() {
            return Err(CameraError::Open(format!("no frames found in {}", dir.display())));
        }

        info!(
            "Opened image sequence {} ({} frames @ {}fps)",
            dir.display(),
            files.len(),
            config.fps
        );

        Ok(Self {
            files,
            cursor: 0,
            sequence: 0,
            looping: config.looping,
            clock: FrameClock::new(config.clock, config.fps),
        })
    }

    /// Number of distinct frames in the sequence
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FrameSource for ImageSequenceSource {
    fn next_frame(&mut self) -> Result<Option<VideoFrame>, CameraError> {
        if self.cursor >= self.files.len() {
            if !self.looping {
                return Ok(None);
            }
            debug!("Image sequence wrapped after {} frames", self.sequence);
            self.cursor = 0;
        }

        let path = &self.files[self.cursor];
        let img = image::open(path).map_err(|e| CameraError::Decode {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        let sequence = self.sequence;
        let timestamp = self.clock.stamp(sequence);
        self.cursor += 1;
        self.sequence = self.sequence.wrapping_add(1);

        Ok(Some(VideoFrame::from_rgb_image(
            img.to_rgb8(),
            u64::try_from(timestamp.as_nanos()).unwrap_or(u64::MAX),
            sequence,
        )))
    }
}

/// Open the source `config` describes: the frame directory when one is set,
/// otherwise the live camera
pub fn open_source(config: &CameraConfig) -> Result<Box<dyn FrameSource>, CameraError> {
    if config.frames.is_some() {
        return Ok(Box::new(ImageSequenceSource::open(config)?));
    }
    open_camera(config)
}

#[cfg(feature = "vision")]
fn open_camera(config: &CameraConfig) -> Result<Box<dyn FrameSource>, CameraError> {
    Ok(Box::new(crate::capture::VideoCaptureSource::open(config)?))
}

#[cfg(not(feature = "vision"))]
fn open_camera(config: &CameraConfig) -> Result<Box<dyn FrameSource>, CameraError> {
    Err(CameraError::Open(format!(
        "camera {} requested but live capture is not compiled in (enable the `vision` feature)",
        config.device
    )))
}

fn list_frames(dir: &Path) -> Result<Vec<PathBuf>, CameraError> {
    let entries = fs::read_dir(dir)
        .map_err(|e| CameraError::Open(format!("{}: {}", dir.display(), e)))?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    Ok(files)
}
