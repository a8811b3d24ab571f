//! Alert sound backends

use std::path::PathBuf;
use std::process::{Command, Stdio};
use tracing::{debug, info};

use crate::AlertError;

/// Something that can play the alert sound
///
/// `play` blocks until playback finishes; the dispatcher runs it off the
/// frame loop.
pub trait AlertSound: Send + Sync {
    fn play(&self) -> Result<(), AlertError>;
}

/// Plays a sound file through an external player program
#[derive(Debug, Clone)]
pub struct CommandSound {
    program: String,
    args: Vec<String>,
    sound_path: PathBuf,
}

impl CommandSound {
    pub fn new(
        program: impl Into<String>,
        args: Vec<String>,
        sound_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            program: program.into(),
            args,
            sound_path: sound_path.into(),
        }
    }
}

impl AlertSound for CommandSound {
    fn play(&self) -> Result<(), AlertError> {
        if !self.sound_path.is_file() {
            return Err(AlertError::MissingSound(self.sound_path.display().to_string()));
        }

        debug!("Playing {} with {}", self.sound_path.display(), self.program);
        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(&self.sound_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|e| AlertError::Spawn {
                program: self.program.clone(),
                reason: e.to_string(),
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(AlertError::PlayerFailed {
                program: self.program.clone(),
                status: status.to_string(),
            })
        }
    }
}

/// Logs instead of playing audio
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentSound;

impl AlertSound for SilentSound {
    fn play(&self) -> Result<(), AlertError> {
        info!("Audio disabled, drowsiness alert not played");
        Ok(())
    }
}
