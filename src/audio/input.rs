//! Capture-input selection.
//!
//! The preferred input is the capture sink's monitor source with a fully
//! pinned format. When that is unavailable the fixed fallback list below is
//! probed in order with a short trial capture, and the first working device
//! wins.

use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Input buffer depth handed to the grabber; shallow queues drop packets
/// whenever the encoder stalls for a frame.
pub const THREAD_QUEUE_SIZE: u32 = 4096;

/// Audio capture backends the grabber understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioBackend {
    Alsa,
    Pulse,
}

impl AudioBackend {
    pub fn demuxer(&self) -> &'static str {
        match self {
            AudioBackend::Alsa => "alsa",
            AudioBackend::Pulse => "pulse",
        }
    }
}

/// A resolved audio input for the capture process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioInput {
    /// The capture sink's monitor source. Rate and channel count are pinned
    /// so the grab never has to guess them.
    SinkMonitor {
        source: String,
        sample_rate: u32,
        channels: u32,
    },
    /// A probed fallback device.
    Device {
        backend: AudioBackend,
        device: String,
    },
}

impl AudioInput {
    /// ffmpeg input arguments for this source.
    pub fn ffmpeg_args(&self) -> Vec<String> {
        match self {
            AudioInput::SinkMonitor {
                source,
                sample_rate,
                channels,
            } => vec![
                "-thread_queue_size".to_string(),
                THREAD_QUEUE_SIZE.to_string(),
                "-f".to_string(),
                "pulse".to_string(),
                "-sample_rate".to_string(),
                sample_rate.to_string(),
                "-channels".to_string(),
                channels.to_string(),
                "-i".to_string(),
                source.clone(),
            ],
            AudioInput::Device { backend, device } => vec![
                "-thread_queue_size".to_string(),
                THREAD_QUEUE_SIZE.to_string(),
                "-f".to_string(),
                backend.demuxer().to_string(),
                "-i".to_string(),
                device.clone(),
            ],
        }
    }

    pub fn describe(&self) -> String {
        match self {
            AudioInput::SinkMonitor { source, .. } => {
                format!("capture sink monitor {}", source)
            }
            AudioInput::Device { backend, device } => {
                format!("{} device {}", backend.demuxer(), device)
            }
        }
    }
}

/// Fallback inputs probed in order when the capture sink's monitor is not
/// usable.
pub const FALLBACK_INPUTS: &[(AudioBackend, &str, &str)] = &[
    (AudioBackend::Alsa, "default", "ALSA default"),
    (AudioBackend::Pulse, "default", "PulseAudio default"),
    (AudioBackend::Alsa, "hw:0", "ALSA hw:0"),
];

/// Error fragments that mark a trial capture as genuinely broken. A non-zero
/// exit without one of these is still accepted; the grabber complains about
/// plenty of harmless things at startup.
const FATAL_PROBE_ERRORS: &[&str] = &[
    "no such device",
    "no such file or directory",
    "permission denied",
    "input/output error",
    "device or resource busy",
    "connection refused",
];

pub(crate) fn probe_outcome_ok(exit_ok: bool, stderr: &str) -> bool {
    if exit_ok {
        return true;
    }
    let stderr = stderr.to_lowercase();
    !FATAL_PROBE_ERRORS
        .iter()
        .any(|marker| stderr.contains(marker))
}

/// Trial-capture a candidate input against the null muxer.
pub async fn test_audio_input(
    input: &AudioInput,
    label: &str,
    capture: Duration,
    timeout: Duration,
) -> bool {
    let mut args: Vec<String> = vec!["-y".to_string()];
    args.extend(input.ffmpeg_args());
    args.extend([
        "-t".to_string(),
        format!("{}", capture.as_secs_f64()),
        "-f".to_string(),
        "null".to_string(),
        "-".to_string(),
    ]);

    debug!("Testing audio input {}: ffmpeg {}", label, args.join(" "));

    let result = tokio::time::timeout(
        timeout,
        Command::new("ffmpeg").args(&args).stdin(Stdio::null()).output(),
    )
    .await;

    match result {
        Ok(Ok(output)) => {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let usable = probe_outcome_ok(output.status.success(), &stderr);
            if !usable {
                debug!("Audio input {} rejected: {}", label, stderr.trim());
            }
            usable
        }
        Ok(Err(e)) => {
            debug!("Audio input test failed to run for {}: {}", label, e);
            false
        }
        Err(_) => {
            debug!("Audio input test timed out for {}", label);
            false
        }
    }
}

/// Probe the fallback list and return the first input that works.
pub async fn probe_fallback_inputs(capture: Duration, timeout: Duration) -> Option<AudioInput> {
    for (backend, device, label) in FALLBACK_INPUTS {
        let candidate = AudioInput::Device {
            backend: *backend,
            device: (*device).to_string(),
        };
        if test_audio_input(&candidate, label, capture, timeout).await {
            info!("Using audio input method: {}", label);
            return Some(candidate);
        }
    }
    warn!("No working audio input found");
    None
}
