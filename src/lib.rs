//! Headless screen and audio capture for meeting bots.
//!
//! A [`recorder::Recorder`] drives an external ffmpeg process that grabs a
//! virtual display, while [`audio::AudioRouter`] keeps the meeting
//! browser's sound on a dedicated capture sink whose monitor feeds the
//! recording. Everything degrades: a host with no working audio stack
//! still produces a video-only file, and cleanup always leaves a file at
//! the output path.

pub mod audio;
pub mod capture;
pub mod cli;
pub mod config;
pub mod error;
pub mod global;
pub mod recorder;

pub use config::Config;
pub use error::{RecorderError, Result};
pub use recorder::{Recorder, RecorderConfig, RecorderState};
