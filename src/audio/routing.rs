//! Capture-sink routing.
//!
//! The [`AudioRouter`] guarantees a capturable source exists before the
//! meeting browser starts, then migrates the browser's playback streams onto
//! the capture sink. Every step degrades gracefully; a host without a
//! working audio daemon still produces a video-only recording.

use anyhow::{bail, Result};
use regex::Regex;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::audio::control::AudioControl;
use crate::audio::input::{probe_fallback_inputs, AudioInput};
use crate::audio::lease::SinkLease;
use crate::audio::sink_inputs::{parse_sink_inputs, short_list_contains, short_list_index};
use crate::config::{AudioConfig, TimingConfig};
use crate::global;

/// Peak levels at or below this are indistinguishable from silence.
const SILENCE_FLOOR_DB: f64 = -120.0;

pub struct AudioRouter {
    control: Box<dyn AudioControl>,
    audio: AudioConfig,
    timing: TimingConfig,
    pipeline_ready: bool,
    lease: Option<SinkLease>,
    lease_path: Option<PathBuf>,
}

impl AudioRouter {
    pub fn new(control: Box<dyn AudioControl>, audio: AudioConfig, timing: TimingConfig) -> Self {
        Self {
            control,
            audio,
            timing,
            pipeline_ready: false,
            lease: None,
            lease_path: global::sink_lease_file().ok(),
        }
    }

    pub fn with_lease_path(mut self, path: PathBuf) -> Self {
        self.lease_path = Some(path);
        self
    }

    pub fn sink_name(&self) -> &str {
        &self.audio.sink_name
    }

    pub fn monitor_source(&self) -> String {
        format!("{}.monitor", self.audio.sink_name)
    }

    pub fn disabled(&self) -> bool {
        self.audio.disable_capture
    }

    /// Whether the audio daemon answers a status query.
    pub async fn daemon_running(&self) -> bool {
        match self.control.run(&["info"]).await {
            Ok(out) => out.success,
            Err(err) => {
                debug!("pactl info failed: {}", err);
                false
            }
        }
    }

    /// Probe the daemon and start it in persistent mode when absent.
    /// Idempotent; returns whether a daemon is running afterwards.
    pub async fn ensure_daemon_running(&self) -> bool {
        if self.daemon_running().await {
            return true;
        }

        info!("Audio daemon not responding, starting it");
        if let Err(err) = self.control.spawn_daemon().await {
            warn!("Failed to start audio daemon: {}", err);
            return false;
        }
        sleep(self.timing.daemon_settle()).await;

        let alive = self.daemon_running().await;
        if !alive {
            warn!("Audio daemon still not responding after start");
        }
        alive
    }

    /// Whether the capture sink is enumerable right now.
    pub async fn capture_sink_present(&self) -> bool {
        match self.control.run(&["list", "short", "sinks"]).await {
            Ok(out) if out.success => short_list_contains(&out.stdout, &self.audio.sink_name),
            _ => false,
        }
    }

    /// Probe for the capture sink, creating it when missing. The default-sink
    /// assignment and nominal volume are re-asserted on every call so a sink
    /// surviving from an earlier run still receives new streams.
    pub async fn ensure_capture_sink(&self) -> bool {
        let exists = match self.control.run(&["list", "short", "sinks"]).await {
            Ok(out) if out.success => short_list_contains(&out.stdout, &self.audio.sink_name),
            Ok(out) => {
                warn!("Could not list sinks: {}", out.stderr.trim());
                false
            }
            Err(err) => {
                warn!("Could not list sinks: {}", err);
                false
            }
        };

        if !exists {
            info!("Creating capture sink {}", self.audio.sink_name);
            let module_args = [
                "load-module".to_string(),
                "module-null-sink".to_string(),
                format!("sink_name={}", self.audio.sink_name),
                format!("rate={}", self.audio.sample_rate),
                format!("channels={}", self.audio.channels),
                format!(
                    "sink_properties=device.description={}",
                    self.audio.sink_description
                ),
            ];
            let refs: Vec<&str> = module_args.iter().map(String::as_str).collect();
            match self.control.run(&refs).await {
                Ok(out) if out.success => {}
                Ok(out) => {
                    warn!("Could not create capture sink: {}", out.stderr.trim());
                    return false;
                }
                Err(err) => {
                    warn!("Could not create capture sink: {}", err);
                    return false;
                }
            }
        }

        let default_ok = self
            .run_ok(&["set-default-sink", &self.audio.sink_name])
            .await;
        if !default_ok {
            warn!("Could not make {} the default sink", self.audio.sink_name);
        }
        if !self
            .run_ok(&["set-sink-volume", &self.audio.sink_name, "100%"])
            .await
        {
            warn!("Could not set {} volume", self.audio.sink_name);
        }

        default_ok
    }

    /// Whether both the capture sink and its monitor source are enumerable.
    pub async fn monitor_present(&self) -> bool {
        if !self.capture_sink_present().await {
            return false;
        }
        match self.control.run(&["list", "short", "sources"]).await {
            Ok(out) if out.success => short_list_contains(&out.stdout, &self.monitor_source()),
            _ => false,
        }
    }

    /// Poll until the monitor source appears or `timeout` elapses. On timeout
    /// the full daemon state is dumped to the log for the operator.
    pub async fn wait_for_monitor_source(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.monitor_present().await {
                return true;
            }
            if Instant::now() >= deadline {
                break;
            }
            sleep(self.timing.monitor_poll_interval()).await;
        }

        warn!(
            "Monitor source {} not visible after {:?}",
            self.monitor_source(),
            timeout
        );
        self.dump_diagnostics().await;
        false
    }

    async fn dump_diagnostics(&self) {
        for args in [&["info"][..], &["list", "sinks"][..], &["list", "sources"][..]] {
            match self.control.run(args).await {
                Ok(out) => {
                    let body = if out.success { out.stdout } else { out.stderr };
                    warn!("pactl {}:\n{}", args.join(" "), body.trim());
                }
                Err(err) => warn!("pactl {} failed: {}", args.join(" "), err),
            }
        }
    }

    /// Export the audio server variables so child processes attach to the
    /// same daemon and open their streams on the capture sink. Must run
    /// before the meeting browser spawns; afterwards only stream migration
    /// can catch its audio.
    pub fn export_environment(&self) {
        let server = self
            .audio
            .server
            .clone()
            .unwrap_or_else(|| format!("unix:{}/native", self.audio.runtime_path));

        std::env::set_var("PULSE_SERVER", &server);
        std::env::set_var("PULSE_RUNTIME_PATH", &self.audio.runtime_path);
        std::env::set_var("PULSE_SINK", &self.audio.sink_name);

        info!(
            "Exported audio environment: server={} sink={}",
            server, self.audio.sink_name
        );
    }

    /// Sweep playback streams and move any that look like the meeting
    /// browser onto the capture sink. The browser may not have opened its
    /// stream yet when this runs, so every sweep re-enumerates; late streams
    /// are still caught. Returns whether any stream was ever moved.
    pub async fn route_browser_streams(&self, iterations: u32, delay: Duration) -> bool {
        let mut moved_any = false;

        for attempt in 1..=iterations {
            match self.control.run(&["list", "sink-inputs"]).await {
                Ok(out) if out.success => {
                    for stream in parse_sink_inputs(&out.stdout) {
                        if !stream.is_browser_stream() {
                            continue;
                        }
                        let index = stream.index.to_string();
                        if self
                            .run_ok(&["move-sink-input", &index, &self.audio.sink_name])
                            .await
                        {
                            debug!(
                                "Moved stream #{} ({}) to {}",
                                stream.index, stream.application_name, self.audio.sink_name
                            );
                            moved_any = true;
                        } else {
                            warn!(
                                "Could not move stream #{} to {}",
                                stream.index, self.audio.sink_name
                            );
                        }
                    }
                }
                Ok(out) => debug!("Could not list sink inputs: {}", out.stderr.trim()),
                Err(err) => debug!("Could not list sink inputs: {}", err),
            }

            if attempt < iterations {
                sleep(delay).await;
            }
        }

        if !moved_any {
            warn!(
                "No browser audio stream appeared after {} attempts",
                iterations
            );
        }
        moved_any
    }

    /// (browser streams visible, of which already on the capture sink).
    pub async fn browser_stream_counts(&self) -> (usize, usize) {
        let sink_index = match self.control.run(&["list", "short", "sinks"]).await {
            Ok(out) if out.success => short_list_index(&out.stdout, &self.audio.sink_name),
            _ => None,
        };

        let streams = match self.control.run(&["list", "sink-inputs"]).await {
            Ok(out) if out.success => parse_sink_inputs(&out.stdout),
            _ => Vec::new(),
        };

        let browser: Vec<_> = streams.iter().filter(|s| s.is_browser_stream()).collect();
        let routed = match sink_index {
            Some(index) => browser.iter().filter(|s| s.sink == Some(index)).count(),
            None => 0,
        };
        (browser.len(), routed)
    }

    /// Mute or unmute the system default sink.
    pub async fn set_default_sink_mute(&self, mute: bool) -> Result<()> {
        let flag = if mute { "1" } else { "0" };
        let out = self
            .control
            .run(&["set-sink-mute", "@DEFAULT_SINK@", flag])
            .await?;
        if !out.success {
            bail!("set-sink-mute failed: {}", out.stderr.trim());
        }
        Ok(())
    }

    /// Short volumedetect probe of the monitor source. `false` means silent
    /// or unprobeable; this never raises.
    pub async fn has_signal(&self, probe: Duration) -> bool {
        let source = self.monitor_source();
        let length = format!("{}", probe.as_secs_f64());
        let args = [
            "-f",
            "pulse",
            "-i",
            source.as_str(),
            "-t",
            length.as_str(),
            "-af",
            "volumedetect",
            "-f",
            "null",
            "-",
        ];

        let budget = probe + self.timing.probe_timeout();
        let output = match tokio::time::timeout(
            budget,
            Command::new("ffmpeg").args(args).stdin(Stdio::null()).output(),
        )
        .await
        {
            Ok(Ok(out)) => out,
            Ok(Err(err)) => {
                debug!("Signal probe failed to run: {}", err);
                return false;
            }
            Err(_) => {
                debug!("Signal probe timed out");
                return false;
            }
        };

        let stderr = String::from_utf8_lossy(&output.stderr);
        match parse_max_volume(&stderr) {
            Some(peak) => {
                let silent = is_silence(peak);
                debug!("Monitor peak level {} dB (silent: {})", peak, silent);
                !silent
            }
            None => {
                debug!("Signal probe produced no volume report");
                false
            }
        }
    }

    /// Bring up the daemon and capture sink, taking the host lease on first
    /// use. Cached after the first success unless `force` re-verifies.
    pub async fn ensure_capture_pipeline(&mut self, force: bool) -> bool {
        if self.pipeline_ready && !force {
            return true;
        }

        if self.lease.is_none() {
            if let Some(path) = self.lease_path.clone() {
                self.lease = SinkLease::acquire(&path);
            }
        }

        if !self.ensure_daemon_running().await {
            return false;
        }
        if !self.ensure_capture_sink().await {
            return false;
        }

        self.pipeline_ready = true;
        true
    }

    /// Choose the capture input: the pinned monitor when available, then the
    /// ordered fallback probes, then none.
    pub async fn select_audio_input(&mut self, force_reverify: bool) -> Option<AudioInput> {
        if self.audio.disable_capture {
            info!("Audio capture disabled by configuration");
            return None;
        }

        let pipeline = self.ensure_capture_pipeline(force_reverify).await;

        if pipeline {
            if self.audio.force_capture_sink {
                if self
                    .wait_for_monitor_source(self.timing.monitor_wait())
                    .await
                {
                    return Some(self.monitor_input());
                }
                warn!("Forced capture sink unavailable, probing fallback devices");
            } else if self.monitor_present().await {
                return Some(self.monitor_input());
            }
        }

        probe_fallback_inputs(self.timing.probe_capture(), self.timing.probe_timeout()).await
    }

    /// Release the host lease. Called during terminal cleanup; dropping the
    /// router has the same effect.
    pub fn release_lease(&mut self) {
        self.lease = None;
    }

    fn monitor_input(&self) -> AudioInput {
        AudioInput::SinkMonitor {
            source: self.monitor_source(),
            sample_rate: self.audio.sample_rate,
            channels: self.audio.channels,
        }
    }

    async fn run_ok(&self, args: &[&str]) -> bool {
        match self.control.run(args).await {
            Ok(out) => {
                if !out.success {
                    debug!("pactl {} failed: {}", args.join(" "), out.stderr.trim());
                }
                out.success
            }
            Err(err) => {
                debug!("pactl {} failed: {}", args.join(" "), err);
                false
            }
        }
    }
}

fn max_volume_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"max_volume:\s*(-?\d+(?:\.\d+)?)\s*dB").unwrap())
}

/// Extract the `max_volume` reading from a volumedetect log.
fn parse_max_volume(log: &str) -> Option<f64> {
    max_volume_re()
        .captures(log)
        .and_then(|caps| caps[1].parse().ok())
}

/// A reading at the measurement floor means no signal; a reading of exactly
/// 0.0 dB comes from a dead grab, not a real meeting.
fn is_silence(peak_db: f64) -> bool {
    peak_db <= SILENCE_FLOOR_DB || peak_db == 0.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::control::ControlOutput;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    /// Scripted control backend. Responses are keyed by the joined argument
    /// string; queued responses are consumed in order with the last one
    /// sticky, and unscripted commands succeed with empty output.
    #[derive(Default)]
    struct FakeControl {
        calls: Mutex<Vec<String>>,
        responses: Mutex<HashMap<String, Vec<ControlOutput>>>,
    }

    impl FakeControl {
        fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        fn script(&self, command: &str, responses: Vec<ControlOutput>) {
            self.responses
                .lock()
                .unwrap()
                .insert(command.to_string(), responses);
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl crate::audio::control::AudioControl for Arc<FakeControl> {
        async fn run(&self, args: &[&str]) -> anyhow::Result<ControlOutput> {
            let key = args.join(" ");
            self.calls.lock().unwrap().push(key.clone());

            let mut responses = self.responses.lock().unwrap();
            match responses.get_mut(&key) {
                Some(queue) if queue.len() > 1 => Ok(queue.remove(0)),
                Some(queue) if queue.len() == 1 => Ok(queue[0].clone()),
                _ => Ok(ControlOutput::ok("")),
            }
        }

        async fn spawn_daemon(&self) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push("spawn_daemon".to_string());
            Ok(())
        }
    }

    fn fast_timing() -> TimingConfig {
        TimingConfig {
            daemon_settle_secs: 0.0,
            monitor_poll_interval_ms: 20,
            ..TimingConfig::default()
        }
    }

    fn router_with(fake: &Arc<FakeControl>) -> (AudioRouter, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let router = AudioRouter::new(
            Box::new(fake.clone()),
            AudioConfig::default(),
            fast_timing(),
        )
        .with_lease_path(dir.path().join("sink.lock"));
        (router, dir)
    }

    const SINKS_WITH_CAPTURE: &str =
        "0\talsa_output.pci\tmodule-alsa-card.c\ts16le 2ch 44100Hz\tRUNNING\n\
         3\tmeetcap_capture\tmodule-null-sink.c\ts16le 2ch 48000Hz\tIDLE\n";

    const SOURCES_WITH_MONITOR: &str =
        "1\tmeetcap_capture.monitor\tmodule-null-sink.c\ts16le 2ch 48000Hz\tIDLE\n";

    const BROWSER_STREAMS: &str = "\
Sink Input #42
\tSink: 1
\tProperties:
\t\tapplication.name = \"Chromium\"
\t\tapplication.process.binary = \"chromium-browser\"
Sink Input #57
\tSink: 0
\tProperties:
\t\tapplication.name = \"Music Player\"
\t\tapplication.process.binary = \"mpv\"
";

    #[tokio::test]
    async fn creates_sink_when_missing_and_asserts_default() {
        let fake = FakeControl::new();
        fake.script(
            "list short sinks",
            vec![ControlOutput::ok("0\talsa_output.pci\tmodule-alsa-card.c\n")],
        );
        let (router, _lease_dir) = router_with(&fake);

        assert!(router.ensure_capture_sink().await);

        let calls = fake.calls();
        assert_eq!(calls[0], "list short sinks");
        assert_eq!(
            calls[1],
            "load-module module-null-sink sink_name=meetcap_capture rate=48000 \
             channels=2 sink_properties=device.description=MeetcapCaptureSink"
        );
        assert_eq!(calls[2], "set-default-sink meetcap_capture");
        assert_eq!(calls[3], "set-sink-volume meetcap_capture 100%");
    }

    #[tokio::test]
    async fn existing_sink_is_not_recreated_but_still_made_default() {
        let fake = FakeControl::new();
        fake.script("list short sinks", vec![ControlOutput::ok(SINKS_WITH_CAPTURE)]);
        let (router, _lease_dir) = router_with(&fake);

        assert!(router.ensure_capture_sink().await);

        let calls = fake.calls();
        assert!(!calls.iter().any(|c| c.starts_with("load-module")));
        assert!(calls.contains(&"set-default-sink meetcap_capture".to_string()));
    }

    #[tokio::test]
    async fn daemon_is_started_when_status_query_fails() {
        let fake = FakeControl::new();
        fake.script(
            "info",
            vec![
                ControlOutput::failed("Connection refused"),
                ControlOutput::ok("Server Name: pulseaudio"),
            ],
        );
        let (router, _lease_dir) = router_with(&fake);

        assert!(router.ensure_daemon_running().await);

        let calls = fake.calls();
        assert_eq!(calls.iter().filter(|c| *c == "spawn_daemon").count(), 1);
    }

    #[tokio::test]
    async fn daemon_start_is_skipped_when_already_running() {
        let fake = FakeControl::new();
        fake.script("info", vec![ControlOutput::ok("Server Name: pulseaudio")]);
        let (router, _lease_dir) = router_with(&fake);

        assert!(router.ensure_daemon_running().await);
        assert!(!fake.calls().contains(&"spawn_daemon".to_string()));
    }

    #[tokio::test]
    async fn route_moves_only_browser_streams() {
        let fake = FakeControl::new();
        fake.script("list sink-inputs", vec![ControlOutput::ok(BROWSER_STREAMS)]);
        let (router, _lease_dir) = router_with(&fake);

        let moved = router
            .route_browser_streams(2, Duration::from_millis(1))
            .await;
        assert!(moved);

        let calls = fake.calls();
        assert!(calls.contains(&"move-sink-input 42 meetcap_capture".to_string()));
        assert!(!calls.iter().any(|c| c.starts_with("move-sink-input 57")));
        assert_eq!(
            calls.iter().filter(|c| *c == "list sink-inputs").count(),
            2,
            "every iteration re-enumerates"
        );
    }

    #[tokio::test]
    async fn route_reports_when_no_browser_stream_appears() {
        let fake = FakeControl::new();
        fake.script(
            "list sink-inputs",
            vec![ControlOutput::ok("Sink Input #7\n\tProperties:\n\t\tapplication.name = \"mpv\"\n")],
        );
        let (router, _lease_dir) = router_with(&fake);

        assert!(!router.route_browser_streams(2, Duration::from_millis(1)).await);
        assert!(!fake.calls().iter().any(|c| c.starts_with("move-sink-input")));
    }

    #[tokio::test]
    async fn monitor_wait_times_out_and_dumps_diagnostics() {
        let fake = FakeControl::new();
        fake.script("list short sinks", vec![ControlOutput::ok("")]);
        let (router, _lease_dir) = router_with(&fake);

        let found = router
            .wait_for_monitor_source(Duration::from_millis(60))
            .await;
        assert!(!found);

        let calls = fake.calls();
        assert!(calls.contains(&"info".to_string()));
        assert!(calls.contains(&"list sinks".to_string()));
        assert!(calls.contains(&"list sources".to_string()));
    }

    #[tokio::test]
    async fn select_returns_none_when_capture_disabled() {
        let fake = FakeControl::new();
        let dir = tempfile::tempdir().unwrap();
        let mut router = AudioRouter::new(
            Box::new(fake.clone()),
            AudioConfig {
                disable_capture: true,
                ..AudioConfig::default()
            },
            fast_timing(),
        )
        .with_lease_path(dir.path().join("sink.lock"));

        assert_eq!(router.select_audio_input(false).await, None);
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn select_prefers_the_monitor_source_with_pinned_format() {
        let fake = FakeControl::new();
        fake.script("info", vec![ControlOutput::ok("Server Name: pulseaudio")]);
        fake.script("list short sinks", vec![ControlOutput::ok(SINKS_WITH_CAPTURE)]);
        fake.script(
            "list short sources",
            vec![ControlOutput::ok(SOURCES_WITH_MONITOR)],
        );
        let (mut router, _lease_dir) = router_with(&fake);

        let input = router.select_audio_input(false).await;
        assert_eq!(
            input,
            Some(AudioInput::SinkMonitor {
                source: "meetcap_capture.monitor".to_string(),
                sample_rate: 48000,
                channels: 2,
            })
        );
    }

    #[tokio::test]
    async fn browser_stream_counts_track_routing_state() {
        let fake = FakeControl::new();
        fake.script("list short sinks", vec![ControlOutput::ok(SINKS_WITH_CAPTURE)]);
        fake.script(
            "list sink-inputs",
            vec![ControlOutput::ok(
                "Sink Input #42\n\tSink: 3\n\tProperties:\n\t\tapplication.process.binary = \"chromium\"\n\
                 Sink Input #43\n\tSink: 0\n\tProperties:\n\t\tapplication.process.binary = \"firefox\"\n",
            )],
        );
        let (router, _lease_dir) = router_with(&fake);

        assert_eq!(router.browser_stream_counts().await, (2, 1));
    }

    #[tokio::test]
    async fn mute_failures_surface_as_errors() {
        let fake = FakeControl::new();
        fake.script(
            "set-sink-mute @DEFAULT_SINK@ 1",
            vec![ControlOutput::failed("No such sink")],
        );
        let (router, _lease_dir) = router_with(&fake);

        assert!(router.set_default_sink_mute(true).await.is_err());
        assert!(router.set_default_sink_mute(false).await.is_ok());
    }

    #[test]
    fn volume_report_parsing_handles_real_output() {
        let log = "[Parsed_volumedetect_0 @ 0x55] n_samples: 144000\n\
                   [Parsed_volumedetect_0 @ 0x55] mean_volume: -35.4 dB\n\
                   [Parsed_volumedetect_0 @ 0x55] max_volume: -12.3 dB\n";
        assert_eq!(parse_max_volume(log), Some(-12.3));
        assert_eq!(parse_max_volume("no report here"), None);
        assert_eq!(parse_max_volume("max_volume: -91 dB"), Some(-91.0));
    }

    #[test]
    fn silence_rule_covers_floor_and_dead_grab() {
        assert!(is_silence(-120.0));
        assert!(is_silence(-130.5));
        assert!(is_silence(0.0));
        assert!(!is_silence(-119.9));
        assert!(!is_silence(-12.3));
        assert!(!is_silence(0.1));
    }
}
