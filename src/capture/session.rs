//! A single running capture process.

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::{Child, Command};
use tracing::info;
use uuid::Uuid;

use crate::error::{RecorderError, Result};

/// Handle to one spawned capture process. At most one exists per recorder.
#[derive(Debug)]
pub struct CaptureSession {
    pub id: Uuid,
    pub child: Child,
    pub pid: u32,
    pub started_at: Instant,
    pub log_path: PathBuf,
}

impl CaptureSession {
    /// Spawn ffmpeg with stdout and stderr redirected into the session log
    /// file. `kill_on_drop` backstops every teardown path.
    pub fn spawn(args: &[String], log_path: &Path) -> Result<Self> {
        let log_file = std::fs::File::create(log_path)?;
        let log_for_stderr = log_file.try_clone()?;

        let child = Command::new("ffmpeg")
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log_file))
            .stderr(Stdio::from(log_for_stderr))
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| {
                RecorderError::LaunchFailed(format!("could not spawn ffmpeg: {err}"))
            })?;

        let pid = child.id().ok_or_else(|| {
            RecorderError::LaunchFailed("ffmpeg exited before a pid was assigned".to_string())
        })?;

        let id = Uuid::new_v4();
        info!("Capture process started: session={} pid={}", id, pid);

        Ok(Self {
            id,
            child,
            pid,
            started_at: Instant::now(),
            log_path: log_path.to_path_buf(),
        })
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// Ask a child politely to shut down.
pub(crate) fn send_sigterm(pid: u32) -> nix::Result<()> {
    kill(Pid::from_raw(pid as i32), Signal::SIGTERM)
}

/// Last `max_bytes` of a capture log, lossily decoded. Missing or unreadable
/// logs read as empty.
pub(crate) fn read_log_tail(path: &Path, max_bytes: usize) -> String {
    let Ok(data) = std::fs::read(path) else {
        return String::new();
    };
    let start = data.len().saturating_sub(max_bytes);
    String::from_utf8_lossy(&data[start..]).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_tail_returns_the_end_of_large_logs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.log");
        let mut content = "x".repeat(10_000);
        content.push_str("Device or resource busy");
        std::fs::write(&path, &content).unwrap();

        let tail = read_log_tail(&path, 64);
        assert!(tail.len() <= 64);
        assert!(tail.contains("Device or resource busy"));
    }

    #[test]
    fn missing_log_reads_as_empty() {
        assert_eq!(read_log_tail(Path::new("/nonexistent/capture.log"), 64), "");
    }
}
