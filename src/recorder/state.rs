//! Recorder state machine and per-session configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::capture::command::CAPTURE_PADDING;

/// Lifecycle of one recorder. `CleanedUp` is terminal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecorderState {
    #[default]
    Idle,
    Recording,
    Paused,
    Stopped,
    CleanedUp,
}

impl RecorderState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecorderState::Idle => "idle",
            RecorderState::Recording => "recording",
            RecorderState::Paused => "paused",
            RecorderState::Stopped => "stopped",
            RecorderState::CleanedUp => "cleaned_up",
        }
    }

    /// Legal transitions: Idle→Recording, Recording↔Paused, any active state
    /// →Stopped, and Stopped→CleanedUp. Cleanup is also reachable directly
    /// for abandoned sessions.
    pub fn can_transition_to(&self, next: RecorderState) -> bool {
        use RecorderState::*;
        matches!(
            (self, next),
            (Idle, Recording)
                | (Recording, Paused)
                | (Paused, Recording)
                | (Recording, Stopped)
                | (Paused, Stopped)
                | (Idle, CleanedUp)
                | (Recording, CleanedUp)
                | (Paused, CleanedUp)
                | (Stopped, CleanedUp)
        )
    }
}

/// Immutable description of one recording session.
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    pub output_path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub audio_only: bool,
}

impl RecorderConfig {
    pub fn new(output_path: impl Into<PathBuf>, width: u32, height: u32, audio_only: bool) -> Self {
        Self {
            output_path: output_path.into(),
            width,
            height,
            audio_only,
        }
    }

    /// Grab dimensions: the target size plus the crop padding on each axis.
    pub fn capture_dimensions(&self) -> (u32, u32) {
        (self.width + CAPTURE_PADDING, self.height + CAPTURE_PADDING)
    }

    /// Capture log path, derived from the output name and placed beside it.
    pub fn log_path(&self) -> PathBuf {
        let name = self
            .output_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "capture".to_string());
        let log_name = format!("ffmpeg_{}.log", name);
        match self.output_path.parent() {
            Some(parent) => parent.join(log_name),
            None => PathBuf::from(log_name),
        }
    }
}
