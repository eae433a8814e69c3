//! Post-processing for progressive playback.
//!
//! Screen captures write their container index at the tail of the file,
//! which forces players to download the whole recording before seeking.
//! `make_seekable` rewrites the container with the index up front, without
//! re-encoding, and atomically replaces the original.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::info;

use crate::error::{RecorderError, Result};

/// Files above this take longer to remux than operators are willing to wait
/// at teardown.
pub const REMUX_MAX_BYTES: u64 = 3 * 1024 * 1024 * 1024;

/// Files below this hold no usable media.
pub const REMUX_MIN_BYTES: u64 = 1024;

/// Why cleanup did or did not remux a finished recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemuxDecision {
    Remux,
    /// MP3 output is already progressive.
    SkipAudioOnly,
    SkipTooLarge,
    SkipTooSmall,
}

/// Size gates use strict comparisons: files of exactly [`REMUX_MIN_BYTES`]
/// or exactly [`REMUX_MAX_BYTES`] are processed.
pub fn remux_decision(len: u64, audio_only: bool) -> RemuxDecision {
    if audio_only {
        return RemuxDecision::SkipAudioOnly;
    }
    if len > REMUX_MAX_BYTES {
        return RemuxDecision::SkipTooLarge;
    }
    if len < REMUX_MIN_BYTES {
        return RemuxDecision::SkipTooSmall;
    }
    RemuxDecision::Remux
}

/// Sibling path the remux writes to before the swap:
/// `/tmp/call.mp4` becomes `/tmp/call.seekable.mp4`.
pub fn seekable_path(path: &Path) -> PathBuf {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) => path.with_extension(format!("seekable.{ext}")),
        None => path.with_extension("seekable"),
    }
}

/// Stream-copy `input` into a faststart container, then replace the
/// original. On any failure the original is left untouched and the partial
/// sibling is removed.
pub async fn make_seekable(input: &Path) -> Result<()> {
    let staging = seekable_path(input);
    info!("Making {:?} seekable via {:?}", input, staging);

    let output = Command::new("ffmpeg")
        .arg("-i")
        .arg(input)
        .args([
            "-c",
            "copy",
            "-avoid_negative_ts",
            "make_zero",
            "-movflags",
            "+faststart",
            "-y",
        ])
        .arg(&staging)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|err| RecorderError::Remux {
            path: input.to_path_buf(),
            detail: format!("could not run ffmpeg: {err}"),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        discard_staging(&staging);
        return Err(RecorderError::Remux {
            path: input.to_path_buf(),
            detail: format!("ffmpeg exited with {}: {}", output.status, stderr.trim()),
        });
    }

    if let Err(err) = std::fs::rename(&staging, input) {
        discard_staging(&staging);
        return Err(RecorderError::Remux {
            path: input.to_path_buf(),
            detail: format!("could not replace original: {err}"),
        });
    }

    info!("Replaced {:?} with seekable version", input);
    Ok(())
}

fn discard_staging(staging: &Path) {
    if staging.exists() {
        let _ = std::fs::remove_file(staging);
    }
}
