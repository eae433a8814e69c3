//! Blackout overlay shown while a recording is paused.
//!
//! The capture keeps grabbing frames while paused; an opaque borderless
//! window over the grab region is what actually blanks the recording.

use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::capture::session::send_sigterm;
use crate::error::{RecorderError, Result};

pub struct PauseOverlay {
    child: Child,
}

impl PauseOverlay {
    /// Spawn an opaque window covering the padded capture area at the
    /// display origin.
    pub fn spawn(display: &str, width: u32, height: u32) -> Result<Self> {
        let geometry = format!("{}x{}+0+0", width, height);
        let child = Command::new("xterm")
            .args([
                "-bg",
                "black",
                "-fg",
                "black",
                "-geometry",
                &geometry,
                "-xrm",
                "*borderWidth:0",
                "-xrm",
                "*scrollBar:false",
            ])
            .env("DISPLAY", display)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| {
                RecorderError::Overlay(format!("could not spawn blackout window: {err}"))
            })?;

        debug!("Pause overlay started ({})", geometry);
        Ok(Self { child })
    }

    /// Terminate the overlay window and wait for it to exit.
    pub async fn close(mut self) {
        match self.child.id() {
            Some(pid) => {
                if let Err(err) = send_sigterm(pid) {
                    warn!("Could not terminate overlay (pid {}): {}", pid, err);
                    let _ = self.child.start_kill();
                }
            }
            None => {
                let _ = self.child.start_kill();
            }
        }

        if let Err(err) = self.child.wait().await {
            warn!("Overlay did not exit cleanly: {}", err);
        } else {
            debug!("Pause overlay closed");
        }
    }

    /// Best-effort synchronous kill, for drop paths.
    pub fn abort(&mut self) {
        let _ = self.child.start_kill();
    }
}
