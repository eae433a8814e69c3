//! `meetcap record`: drive one capture session from the command line.

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::cli::args::RecordCliArgs;
use crate::config::Config;
use crate::global;
use crate::recorder::{Recorder, RecorderConfig};

pub async fn handle_record_command(args: RecordCliArgs) -> Result<()> {
    preflight_tools()?;

    let config = Config::load()?;
    let output = match args.output.clone() {
        Some(path) => path,
        None => default_output_path(args.audio_only)?,
    };
    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output directory {:?}", parent))?;
    }

    let recorder_config = RecorderConfig::new(&output, args.width, args.height, args.audio_only);
    let mut recorder = Recorder::new(recorder_config, &config);

    if recorder.prepare_audio().await {
        // Streams the browser opened before the environment export still
        // need migrating onto the capture sink.
        recorder.route_browser_audio().await;
    }

    recorder.start(&args.display).await?;
    info!("Recording to {:?} (interrupt to stop)", output);

    let outcome = run_session(
        &mut recorder,
        args.duration,
        config.timing.health_check_interval(),
    )
    .await;

    if let Err(err) = recorder.stop().await {
        warn!("Stop failed: {}", err);
    }
    if let Err(err) = recorder.cleanup().await {
        warn!("Cleanup failed: {}", err);
    }

    outcome
}

/// Run until interrupted, the requested duration elapses, or a health check
/// fails. Teardown happens in the caller on every path.
async fn run_session(
    recorder: &mut Recorder,
    duration: Option<u64>,
    health_interval: Duration,
) -> Result<()> {
    let deadline = duration.map(|secs| tokio::time::Instant::now() + Duration::from_secs(secs));
    let mut health = tokio::time::interval(health_interval);
    health.tick().await;

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.context("Failed to listen for interrupt")?;
                info!("Interrupt received, stopping");
                return Ok(());
            }
            _ = health.tick() => {
                let (healthy, detail) = recorder.check_health();
                if healthy {
                    debug!("Health check: {}", detail);
                } else {
                    bail!("Recording became unhealthy: {}", detail);
                }
            }
            _ = wait_for_deadline(deadline) => {
                info!("Requested duration elapsed");
                return Ok(());
            }
        }
    }
}

async fn wait_for_deadline(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

fn preflight_tools() -> Result<()> {
    which::which("ffmpeg").context("ffmpeg is required but was not found in PATH")?;
    for tool in ["pactl", "pulseaudio"] {
        if which::which(tool).is_err() {
            warn!("{} not found; audio routing will fall back to direct devices", tool);
        }
    }
    Ok(())
}

fn default_output_path(audio_only: bool) -> Result<PathBuf> {
    let dir = global::recordings_dir()?;
    let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
    let ext = if audio_only { "mp3" } else { "mp4" };
    Ok(dir.join(format!("recording-{stamp}.{ext}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_output_matches_the_session_mode() {
        let video = default_output_path(false).unwrap();
        assert_eq!(video.extension().unwrap(), "mp4");

        let audio = default_output_path(true).unwrap();
        assert_eq!(audio.extension().unwrap(), "mp3");

        assert_eq!(video.parent(), audio.parent());
        assert!(video
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("recording-"));
    }
}
