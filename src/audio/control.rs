//! Audio server control seam.
//!
//! Every interaction with the audio daemon goes through [`AudioControl`] so
//! routing logic can be driven against a scripted fake in tests. The real
//! implementation shells out to `pactl`.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Outcome of one control-utility invocation.
#[derive(Debug, Clone, Default)]
pub struct ControlOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl ControlOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

#[async_trait]
pub trait AudioControl: Send + Sync {
    /// Run the control utility with the given arguments.
    async fn run(&self, args: &[&str]) -> Result<ControlOutput>;

    /// Launch the audio daemon in persistent mode.
    async fn spawn_daemon(&self) -> Result<()>;
}

/// Drives a PulseAudio daemon through `pactl`.
pub struct PactlControl {
    timeout: Duration,
}

impl PactlControl {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl AudioControl for PactlControl {
    async fn run(&self, args: &[&str]) -> Result<ControlOutput> {
        debug!("Running pactl {}", args.join(" "));

        let output = tokio::time::timeout(
            self.timeout,
            Command::new("pactl").args(args).stdin(Stdio::null()).output(),
        )
        .await
        .with_context(|| format!("pactl {} timed out", args.join(" ")))?
        .with_context(|| format!("Failed to run pactl {}", args.join(" ")))?;

        Ok(ControlOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    async fn spawn_daemon(&self) -> Result<()> {
        // --exit-idle-time=-1 keeps the daemon alive between client sessions;
        // bot containers have no session manager to restart it.
        let status = Command::new("pulseaudio")
            .args(["--start", "--exit-idle-time=-1"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .context("Failed to launch pulseaudio")?;

        if !status.success() {
            bail!("pulseaudio --start exited with {}", status);
        }
        Ok(())
    }
}
