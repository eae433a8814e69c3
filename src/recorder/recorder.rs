//! Recorder lifecycle orchestration.
//!
//! One [`Recorder`] drives one capture session end to end: audio staging,
//! launch, pause and resume, termination, health probes and terminal
//! cleanup. Every child process it spawns is owned here and killed on drop
//! if a supervising caller forgets to stop it.

use std::path::{Path, PathBuf};
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

use crate::audio::control::PactlControl;
use crate::audio::routing::AudioRouter;
use crate::capture::session::{send_sigterm, CaptureSession};
use crate::capture::supervisor::{CaptureSupervisor, LaunchSpec};
use crate::config::{Config, TimingConfig};
use crate::error::{RecorderError, Result};
use crate::recorder::overlay::PauseOverlay;
use crate::recorder::seekable::{self, RemuxDecision};
use crate::recorder::state::{RecorderConfig, RecorderState};

/// Suffix variants a crashed encoder may leave behind, tried in order
/// during recovery.
const PARTIAL_SUFFIXES: &[&str] = &[".tmp", ".part", "~"];

pub struct Recorder {
    config: RecorderConfig,
    timing: TimingConfig,
    router: AudioRouter,
    supervisor: CaptureSupervisor,
    state: RecorderState,
    session: Option<CaptureSession>,
    overlay: Option<PauseOverlay>,
    display: Option<String>,
}

impl Recorder {
    pub fn new(config: RecorderConfig, settings: &Config) -> Self {
        let control = PactlControl::new(settings.timing.probe_timeout());
        let router = AudioRouter::new(
            Box::new(control),
            settings.audio.clone(),
            settings.timing.clone(),
        );
        let supervisor =
            CaptureSupervisor::new(settings.capture.clone(), settings.timing.clone());

        Self {
            config,
            timing: settings.timing.clone(),
            router,
            supervisor,
            state: RecorderState::default(),
            session: None,
            overlay: None,
            display: None,
        }
    }

    pub fn with_router(mut self, router: AudioRouter) -> Self {
        self.router = router;
        self
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    /// Stage audio routing before the meeting browser spawns: daemon,
    /// capture sink, and the environment children inherit. Failure degrades
    /// to fallback-device capture later; it is never fatal here.
    pub async fn prepare_audio(&mut self) -> bool {
        if self.router.disabled() {
            info!("Audio capture disabled, skipping audio staging");
            return false;
        }

        let ready = self.router.ensure_capture_pipeline(false).await;
        if ready {
            self.router.export_environment();
        } else {
            warn!("Audio pipeline not available; capture will probe fallback devices");
        }
        ready
    }

    /// Migrate browser playback streams onto the capture sink. Safe to call
    /// repeatedly once the browser is up.
    pub async fn route_browser_audio(&self) -> bool {
        if self.router.disabled() {
            return false;
        }
        self.router
            .route_browser_streams(self.timing.route_iterations, self.timing.route_delay())
            .await
    }

    /// Launch the capture process for `display_name`.
    pub async fn start(&mut self, display_name: &str) -> Result<()> {
        if self.session.is_some() {
            return Err(RecorderError::AlreadyRecording);
        }

        let (grab_width, grab_height) = self.config.capture_dimensions();
        info!(
            "Starting recording on {} ({}x{} grab) -> {:?}",
            display_name, grab_width, grab_height, self.config.output_path
        );

        let audio = self.router.select_audio_input(false).await;
        if self.config.audio_only && audio.is_none() {
            return Err(RecorderError::NoAudioInput);
        }
        match &audio {
            Some(input) => info!("Recording with audio from {}", input.describe()),
            None => warn!("Recording without audio"),
        }

        let spec = LaunchSpec {
            display: display_name.to_string(),
            width: self.config.width,
            height: self.config.height,
            audio_only: self.config.audio_only,
            output: self.config.output_path.clone(),
            log_path: self.config.log_path(),
        };

        let session = self.supervisor.launch(&spec, audio.as_ref()).await?;
        self.session = Some(session);
        self.display = Some(display_name.to_string());
        self.transition(RecorderState::Recording);
        Ok(())
    }

    /// Blank the recording and mute the default sink. Idempotent while
    /// paused; a failure in either step leaves the recorder un-paused.
    pub async fn pause(&mut self) -> Result<()> {
        if self.state == RecorderState::Paused {
            return Ok(());
        }
        if self.state != RecorderState::Recording {
            return Err(RecorderError::NotRecording(self.state.as_str()));
        }

        let Some(display) = self.display.clone() else {
            return Err(RecorderError::NotRecording(self.state.as_str()));
        };

        let (grab_width, grab_height) = self.config.capture_dimensions();
        let overlay = PauseOverlay::spawn(&display, grab_width, grab_height)?;

        if let Err(err) = self.router.set_default_sink_mute(true).await {
            overlay.close().await;
            return Err(RecorderError::AudioControl(format!(
                "could not mute default sink: {err}"
            )));
        }

        self.overlay = Some(overlay);
        self.transition(RecorderState::Paused);
        info!("Recording paused");
        Ok(())
    }

    /// Remove the blackout overlay and unmute. Success when not paused.
    pub async fn resume(&mut self) -> Result<()> {
        if self.state != RecorderState::Paused {
            return Ok(());
        }

        if let Some(overlay) = self.overlay.take() {
            overlay.close().await;
        }
        // The overlay is gone either way; state must agree before any mute
        // failure surfaces.
        self.transition(RecorderState::Recording);

        if let Err(err) = self.router.set_default_sink_mute(false).await {
            error!("Failed to unmute default sink on resume: {}", err);
            return Err(RecorderError::AudioControl(format!(
                "could not unmute default sink: {err}"
            )));
        }

        info!("Recording resumed");
        Ok(())
    }

    /// Terminate the capture process: SIGTERM, a bounded grace wait, then a
    /// hard kill. The session handle is cleared on every path; calling this
    /// with nothing running is a no-op.
    pub async fn stop(&mut self) -> Result<()> {
        let Some(mut session) = self.session.take() else {
            debug!("Stop requested with no capture running");
            return Ok(());
        };

        if let Some(overlay) = self.overlay.take() {
            debug!("Clearing pause overlay during stop");
            overlay.close().await;
            if let Err(err) = self.router.set_default_sink_mute(false).await {
                warn!("Could not unmute default sink during stop: {}", err);
            }
        }

        info!("Stopping capture process (pid {})", session.pid);
        match self.shutdown_child(&mut session).await {
            Ok(true) => info!("Capture process terminated gracefully"),
            Ok(false) => warn!("Capture process ignored SIGTERM and was killed"),
            Err(err) => {
                error!("Error stopping capture process: {}", err);
                let _ = session.child.start_kill();
                let _ = session.child.wait().await;
            }
        }

        info!(
            "Recording ran for {:.2}s",
            session.elapsed().as_secs_f64()
        );
        match std::fs::metadata(&self.config.output_path) {
            Ok(meta) => info!(
                "Recording file {:?} ({} bytes)",
                self.config.output_path,
                meta.len()
            ),
            Err(_) => warn!("Recording file not found at {:?}", self.config.output_path),
        }

        if matches!(self.state, RecorderState::Recording | RecorderState::Paused) {
            self.transition(RecorderState::Stopped);
        }
        Ok(())
    }

    async fn shutdown_child(&self, session: &mut CaptureSession) -> std::io::Result<bool> {
        if session.child.try_wait()?.is_some() {
            return Ok(true);
        }

        if let Err(err) = send_sigterm(session.pid) {
            warn!("SIGTERM failed for pid {}: {}", session.pid, err);
        }

        let deadline = Instant::now() + self.timing.stop_grace();
        loop {
            if session.child.try_wait()?.is_some() {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                break;
            }
            sleep(self.timing.stop_poll_interval()).await;
        }

        session.child.start_kill()?;
        session.child.wait().await?;
        Ok(false)
    }

    /// Non-mutating health probe of the active capture.
    pub fn check_health(&mut self) -> (bool, String) {
        let Some(session) = self.session.as_mut() else {
            return (false, "capture process not running".to_string());
        };

        match session.child.try_wait() {
            Ok(None) => {}
            Ok(Some(status)) => return (false, format!("capture process exited ({status})")),
            Err(err) => return (false, format!("could not probe capture process: {err}")),
        }

        let elapsed = session.elapsed().as_secs_f64();
        let size = std::fs::metadata(&self.config.output_path)
            .ok()
            .map(|meta| meta.len());
        evaluate_output_health(size, elapsed, &self.timing)
    }

    /// Terminal teardown. Stops any straggling capture, recovers or creates
    /// the output file, then remuxes it for seeking. Remux problems are
    /// logged, never raised; the caller still gets a usable original.
    pub async fn cleanup(&mut self) -> Result<()> {
        if self.session.is_some() {
            warn!("Capture still running at cleanup; stopping it first");
            self.stop().await?;
        }

        self.drain_capture_log();

        let output = self.config.output_path.clone();
        if !output.exists() {
            self.recover_or_touch_output(&output)?;
            self.finish_cleanup();
            return Ok(());
        }

        let size = std::fs::metadata(&output)?.len();
        info!("Processing recording file {:?} ({} bytes)", output, size);

        match seekable::remux_decision(size, self.config.audio_only) {
            RemuxDecision::Remux => {
                if let Err(err) = seekable::make_seekable(&output).await {
                    error!("Failed to make recording seekable: {}", err);
                }
            }
            RemuxDecision::SkipAudioOnly => {
                debug!("Audio-only recording, no remux needed")
            }
            RemuxDecision::SkipTooLarge => info!(
                "Recording is larger than {} bytes, skipping seekable remux",
                seekable::REMUX_MAX_BYTES
            ),
            RemuxDecision::SkipTooSmall => warn!(
                "Recording is only {} bytes, skipping seekable remux",
                size
            ),
        }

        self.finish_cleanup();
        Ok(())
    }

    fn finish_cleanup(&mut self) {
        self.router.release_lease();
        self.transition(RecorderState::CleanedUp);
    }

    /// Pull any partial file the encoder left behind into place, or create
    /// an empty placeholder. Callers depend on the output path existing
    /// after cleanup.
    fn recover_or_touch_output(&self, output: &Path) -> Result<()> {
        warn!("Recording file missing at {:?}", output);

        for candidate in partial_variants(output) {
            if !candidate.exists() {
                continue;
            }
            match std::fs::rename(&candidate, output) {
                Ok(()) => {
                    info!("Recovered partial recording {:?} -> {:?}", candidate, output);
                    return Ok(());
                }
                Err(err) => {
                    warn!("Could not recover partial recording {:?}: {}", candidate, err)
                }
            }
        }

        info!("Creating empty placeholder at {:?}", output);
        std::fs::File::create(output)?;
        Ok(())
    }

    fn drain_capture_log(&self) {
        let log_path = self.config.log_path();
        if !log_path.exists() {
            return;
        }

        match std::fs::read_to_string(&log_path) {
            Ok(content) => {
                let content = content.trim();
                if !content.is_empty() {
                    info!("Final capture log output:\n{}", content);
                }
            }
            Err(err) => warn!("Could not read capture log {:?}: {}", log_path, err),
        }

        if let Err(err) = std::fs::remove_file(&log_path) {
            warn!("Could not remove capture log {:?}: {}", log_path, err);
        }
    }

    fn transition(&mut self, next: RecorderState) {
        if !self.state.can_transition_to(next) {
            warn!(
                "Unexpected recorder transition {} -> {}",
                self.state.as_str(),
                next.as_str()
            );
        }
        self.state = next;
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        if let Some(session) = self.session.as_mut() {
            warn!(
                "Recorder dropped with capture still running; killing pid {}",
                session.pid
            );
            let _ = session.child.start_kill();
        }
        if let Some(overlay) = self.overlay.as_mut() {
            overlay.abort();
        }
    }
}

/// Health verdict from the output file alone, once the process itself has
/// checked out alive. An empty or missing file is fine early in the session
/// and fatal later.
fn evaluate_output_health(
    size: Option<u64>,
    elapsed_secs: f64,
    timing: &TimingConfig,
) -> (bool, String) {
    match size {
        Some(0) if elapsed_secs > timing.health_stall_secs => (
            false,
            format!("no data written after {:.1}s", elapsed_secs),
        ),
        Some(size) => (
            true,
            format!("recording healthy: {} bytes after {:.1}s", size, elapsed_secs),
        ),
        None if elapsed_secs > timing.creation_grace_secs => (
            false,
            format!("recording file not created after {:.1}s", elapsed_secs),
        ),
        None => (true, "recording starting up".to_string()),
    }
}

/// Partial-file candidates for `output`, in recovery order.
fn partial_variants(output: &Path) -> Vec<PathBuf> {
    let name = output
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let parent = output.parent().unwrap_or_else(|| Path::new(""));
    PARTIAL_SUFFIXES
        .iter()
        .map(|suffix| parent.join(format!("{name}{suffix}")))
        .collect()
}
