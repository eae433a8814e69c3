//! Recorder error types.
//!
//! Only fatal conditions surface here; recoverable audio launch failures are
//! absorbed by the capture supervisor, and probe failures degrade to a
//! logged `false` instead of an error.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecorderError {
    /// Audio-only session with no usable audio input. Raised before any
    /// capture process is spawned.
    #[error("no audio input available for audio-only recording")]
    NoAudioInput,

    #[error("a capture session is already active")]
    AlreadyRecording,

    #[error("no active recording (state: {0})")]
    NotRecording(&'static str),

    /// The capture process could not be started, after any permitted
    /// fallback was exhausted.
    #[error("capture process failed to start: {0}")]
    LaunchFailed(String),

    #[error("audio control command failed: {0}")]
    AudioControl(String),

    #[error("pause overlay failed: {0}")]
    Overlay(String),

    #[error("remux of {path:?} failed: {detail}")]
    Remux { path: PathBuf, detail: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RecorderError>;
