//! Launch-failure classification.
//!
//! A capture process that dies at startup reports the reason only through
//! log text, and the phrasing is encoder- and backend-specific. The trait
//! keeps that fragility behind one seam so the marker list can grow without
//! touching launch logic.

/// Verdict on a capture attempt that exited during its settle window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The audio leg broke; a video-only relaunch may still succeed.
    AudioRelated,
    /// Nothing left to retry.
    Fatal,
}

pub trait FailureClassifier: Send + Sync {
    fn classify(&self, log: &str) -> FailureKind;
}

/// Log fragments that implicate the audio subsystem: devices that are busy,
/// missing or unreadable, daemon connection problems, and format or argument
/// rejections on the audio input.
const AUDIO_FAILURE_MARKERS: &[&str] = &[
    "device or resource busy",
    "input/output error",
    "no such file or directory",
    "connection timed out",
    "connection refused",
    "invalid argument",
    "invalid sample format",
    "cannot open audio device",
    "no such entity",
];

/// Default classifier: case-insensitive scan for known audio-failure
/// phrases. Anything unrecognized is fatal; guessing audio on an unknown
/// failure would burn the single relaunch for nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct SubstringClassifier;

impl FailureClassifier for SubstringClassifier {
    fn classify(&self, log: &str) -> FailureKind {
        let log = log.to_lowercase();
        if AUDIO_FAILURE_MARKERS
            .iter()
            .any(|marker| log.contains(marker))
        {
            FailureKind::AudioRelated
        } else {
            FailureKind::Fatal
        }
    }
}
