//! Capture launch supervision.
//!
//! A capture process that is going to fail dies within the settle window, so
//! every launch is probed once before it is trusted. A failed video+audio
//! attempt whose log implicates the audio leg gets exactly one video-only
//! relaunch; audio-only attempts never fall back.

use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::audio::input::AudioInput;
use crate::capture::classifier::{FailureClassifier, FailureKind, SubstringClassifier};
use crate::capture::command;
use crate::capture::session::{read_log_tail, CaptureSession};
use crate::config::{CaptureConfig, TimingConfig};
use crate::error::{RecorderError, Result};

const LOG_TAIL_BYTES: usize = 8192;

/// One capture request, before audio selection.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub display: String,
    pub width: u32,
    pub height: u32,
    pub audio_only: bool,
    pub output: PathBuf,
    pub log_path: PathBuf,
}

pub struct CaptureSupervisor {
    classifier: Box<dyn FailureClassifier>,
    tuning: CaptureConfig,
    timing: TimingConfig,
}

impl CaptureSupervisor {
    pub fn new(tuning: CaptureConfig, timing: TimingConfig) -> Self {
        Self {
            classifier: Box::new(SubstringClassifier),
            tuning,
            timing,
        }
    }

    pub fn with_classifier(mut self, classifier: Box<dyn FailureClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// Launch the capture for `spec`, applying the fallback protocol.
    pub async fn launch(
        &self,
        spec: &LaunchSpec,
        audio: Option<&AudioInput>,
    ) -> Result<CaptureSession> {
        if spec.audio_only && audio.is_none() {
            return Err(RecorderError::NoAudioInput);
        }

        let args = self.build_args(spec, audio);
        let first_failure = match self.try_launch(&args, &spec.log_path).await {
            Ok(session) => return Ok(session),
            Err(detail) => detail,
        };

        let log_tail = read_log_tail(&spec.log_path, LOG_TAIL_BYTES);
        if !self.relaunch_permitted(audio.is_some(), spec.audio_only, &log_tail) {
            return Err(RecorderError::LaunchFailed(first_failure));
        }

        warn!(
            "Capture launch failed on the audio leg, relaunching video-only: {}",
            first_failure
        );
        let retry_args = self.build_args(spec, None);
        match self.try_launch(&retry_args, &spec.log_path).await {
            Ok(session) => {
                info!("Capture continuing without audio");
                Ok(session)
            }
            Err(second_failure) => {
                error!("Video-only relaunch also failed: {}", second_failure);
                Err(RecorderError::LaunchFailed(second_failure))
            }
        }
    }

    /// Whether a failed attempt earns the single video-only relaunch.
    fn relaunch_permitted(&self, audio_present: bool, audio_only: bool, log_tail: &str) -> bool {
        if audio_only || !audio_present {
            return false;
        }
        matches!(
            self.classifier.classify(log_tail),
            FailureKind::AudioRelated
        )
    }

    fn build_args(&self, spec: &LaunchSpec, audio: Option<&AudioInput>) -> Vec<String> {
        if spec.audio_only {
            // launch() rejects audio-only specs without an input before
            // reaching here; an empty argv would spawn nothing useful.
            match audio {
                Some(audio) => command::audio_only_command(audio, &spec.output, &self.tuning),
                None => Vec::new(),
            }
        } else {
            command::screen_command(
                &spec.display,
                spec.width,
                spec.height,
                audio,
                &spec.output,
                &self.tuning,
            )
        }
    }

    /// Spawn and probe one attempt. The settle window separates a doomed
    /// process, which exits almost immediately, from a healthy one that is
    /// still running when probed.
    async fn try_launch(
        &self,
        args: &[String],
        log_path: &Path,
    ) -> std::result::Result<CaptureSession, String> {
        info!("Starting capture: ffmpeg {}", args.join(" "));

        let mut session = match CaptureSession::spawn(args, log_path) {
            Ok(session) => session,
            Err(RecorderError::LaunchFailed(detail)) => return Err(detail),
            Err(other) => return Err(other.to_string()),
        };

        tokio::time::sleep(self.timing.launch_settle()).await;

        match session.child.try_wait() {
            Ok(None) => {
                info!("Capture process running (pid {})", session.pid);
                Ok(session)
            }
            Ok(Some(status)) => Err(format!("capture process exited immediately ({status})")),
            Err(err) => Err(format!("could not probe capture process: {err}")),
        }
    }
}
