use crate::global;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub capture: CaptureConfig,
    pub audio: AudioConfig,
    pub timing: TimingConfig,
}

/// Encoder tuning for the capture process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub framerate: u32,
    /// libx264 preset; anything slower than ultrafast drops frames on the
    /// single-core containers the bots run in.
    pub video_preset: String,
    /// Keyframe interval in frames. One keyframe per second at 30 fps keeps
    /// truncated files salvageable.
    pub keyframe_interval: u32,
    pub aac_bitrate: String,
    pub mp3_bitrate: String,
    pub mp3_sample_rate: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            framerate: 30,
            video_preset: "ultrafast".to_string(),
            keyframe_interval: 30,
            aac_bitrate: "128k".to_string(),
            mp3_bitrate: "192k".to_string(),
            mp3_sample_rate: 44100,
        }
    }
}

/// Audio daemon and capture sink settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sink_name: String,
    pub sink_description: String,
    /// Sink sample rate; matches the meeting browser's native output so the
    /// daemon never resamples.
    pub sample_rate: u32,
    pub channels: u32,
    /// Runtime directory of the audio daemon socket.
    pub runtime_path: String,
    /// Explicit server address exported to child processes. Derived from
    /// `runtime_path` when unset.
    pub server: Option<String>,
    /// Skip audio capture entirely; recordings are video-only.
    pub disable_capture: bool,
    /// Wait for the capture sink monitor instead of probing fallback devices
    /// when it is slow to appear.
    pub force_capture_sink: bool,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sink_name: "meetcap_capture".to_string(),
            sink_description: "MeetcapCaptureSink".to_string(),
            sample_rate: 48000,
            channels: 2,
            runtime_path: "/run/pulse".to_string(),
            server: None,
            disable_capture: false,
            force_capture_sink: false,
        }
    }
}

/// Waits, polls and grace periods for process orchestration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Settle window after spawning the capture process before probing it.
    pub launch_settle_secs: f64,
    /// Settle window after starting the audio daemon.
    pub daemon_settle_secs: f64,
    /// Hard timeout on any single probe subprocess.
    pub probe_timeout_secs: f64,
    /// Length of the trial capture used to test an audio input.
    pub probe_capture_secs: f64,
    /// How long to wait for the capture sink monitor in forced-sink mode.
    pub monitor_wait_secs: f64,
    pub monitor_poll_interval_ms: u64,
    /// Browser stream migration sweeps and the delay between them.
    pub route_iterations: u32,
    pub route_delay_ms: u64,
    /// Length of the volumedetect signal probe.
    pub signal_probe_secs: f64,
    /// Grace period between SIGTERM and SIGKILL when stopping the capture.
    pub stop_grace_secs: f64,
    pub stop_poll_interval_ms: u64,
    /// A recording file still empty after this long means a dead capture.
    pub health_stall_secs: f64,
    /// A recording file still missing after this long means a dead capture.
    pub creation_grace_secs: f64,
    pub health_check_interval_secs: f64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            launch_settle_secs: 2.0,
            daemon_settle_secs: 1.0,
            probe_timeout_secs: 3.0,
            probe_capture_secs: 0.1,
            monitor_wait_secs: 10.0,
            monitor_poll_interval_ms: 250,
            route_iterations: 10,
            route_delay_ms: 500,
            signal_probe_secs: 1.5,
            stop_grace_secs: 5.0,
            stop_poll_interval_ms: 100,
            health_stall_secs: 10.0,
            creation_grace_secs: 5.0,
            health_check_interval_secs: 5.0,
        }
    }
}

impl TimingConfig {
    pub fn launch_settle(&self) -> Duration {
        Duration::from_secs_f64(self.launch_settle_secs)
    }

    pub fn daemon_settle(&self) -> Duration {
        Duration::from_secs_f64(self.daemon_settle_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.probe_timeout_secs)
    }

    pub fn probe_capture(&self) -> Duration {
        Duration::from_secs_f64(self.probe_capture_secs)
    }

    pub fn monitor_wait(&self) -> Duration {
        Duration::from_secs_f64(self.monitor_wait_secs)
    }

    pub fn monitor_poll_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_poll_interval_ms)
    }

    pub fn route_delay(&self) -> Duration {
        Duration::from_millis(self.route_delay_ms)
    }

    pub fn signal_probe(&self) -> Duration {
        Duration::from_secs_f64(self.signal_probe_secs)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs_f64(self.stop_grace_secs)
    }

    pub fn stop_poll_interval(&self) -> Duration {
        Duration::from_millis(self.stop_poll_interval_ms)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs_f64(self.health_check_interval_secs)
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        if !config_path.exists() {
            info!(
                "Config file not found, creating default at {:?}",
                config_path
            );
            let mut config = Self::default();
            config.save()?;
            config.apply_env();
            return Ok(config);
        }

        let content =
            std::fs::read_to_string(&config_path).context("Failed to read config file")?;

        let mut config: Self = toml::from_str(&content).context("Failed to parse config file")?;
        config.apply_env();

        info!("Loaded config from {:?}", config_path);
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&config_path, content).context("Failed to write config file")?;

        Ok(())
    }

    /// Container deployments configure per-bot behavior through the
    /// environment; those settings win over the config file.
    pub fn apply_env(&mut self) {
        if let Some(flag) = env_flag("MEETCAP_DISABLE_AUDIO") {
            self.audio.disable_capture = flag;
        }
        if let Some(flag) = env_flag("MEETCAP_FORCE_CAPTURE_SINK") {
            self.audio.force_capture_sink = flag;
        }
        if let Ok(server) = std::env::var("PULSE_SERVER") {
            if !server.is_empty() {
                self.audio.server = Some(server);
            }
        }
        if let Ok(path) = std::env::var("PULSE_RUNTIME_PATH") {
            if !path.is_empty() {
                self.audio.runtime_path = path;
            }
        }
    }

    fn config_path() -> Result<PathBuf> {
        global::config_file()
    }
}

/// Boolean env parsing: "1", "true" and "yes" enable, "0", "false" and "no"
/// disable, anything else is ignored.
fn env_flag(name: &str) -> Option<bool> {
    let value = std::env::var(name).ok()?;
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_capture_contract() {
        let config = Config::default();
        assert_eq!(config.capture.framerate, 30);
        assert_eq!(config.capture.video_preset, "ultrafast");
        assert_eq!(config.audio.sink_name, "meetcap_capture");
        assert_eq!(config.audio.sample_rate, 48000);
        assert_eq!(config.audio.channels, 2);
        assert!(!config.audio.disable_capture);
    }

    #[test]
    fn timing_defaults_convert_to_durations() {
        let timing = TimingConfig::default();
        assert_eq!(timing.launch_settle(), Duration::from_secs(2));
        assert_eq!(timing.stop_grace(), Duration::from_secs(5));
        assert_eq!(timing.monitor_poll_interval(), Duration::from_millis(250));
        assert_eq!(timing.probe_capture(), Duration::from_millis(100));
    }

    #[test]
    fn partial_config_fills_missing_sections() {
        let config: Config = toml::from_str("[audio]\nsink_name = \"other_sink\"\n").unwrap();
        assert_eq!(config.audio.sink_name, "other_sink");
        assert_eq!(config.audio.sample_rate, 48000);
        assert_eq!(config.capture.framerate, 30);
        assert_eq!(config.timing.route_iterations, 10);
    }

    #[test]
    fn env_flag_accepts_common_spellings() {
        std::env::set_var("MEETCAP_TEST_FLAG_A", "YES");
        assert_eq!(env_flag("MEETCAP_TEST_FLAG_A"), Some(true));
        std::env::set_var("MEETCAP_TEST_FLAG_A", "0");
        assert_eq!(env_flag("MEETCAP_TEST_FLAG_A"), Some(false));
        std::env::set_var("MEETCAP_TEST_FLAG_A", "maybe");
        assert_eq!(env_flag("MEETCAP_TEST_FLAG_A"), None);
        std::env::remove_var("MEETCAP_TEST_FLAG_A");
        assert_eq!(env_flag("MEETCAP_TEST_FLAG_A"), None);
    }
}
