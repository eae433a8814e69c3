//! Integration tests for the seekable remux step
//!
//! ## Prerequisites
//! - FFmpeg must be installed
//!
//! ## Running tests
//! ```bash
//! cargo test --test seekable_remux
//! ```

use std::path::Path;
use std::process::Command;

fn ffmpeg_available() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Renders a one second synthetic clip. Uses the native mpeg4 encoder so the
/// test does not depend on how FFmpeg was built.
fn write_sample_clip(path: &Path) -> bool {
    Command::new("ffmpeg")
        .args(["-f", "lavfi", "-i", "testsrc=duration=1:size=128x96:rate=10"])
        .args(["-c:v", "mpeg4", "-y"])
        .arg(path)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Top-level MP4 box names in file order.
fn top_level_boxes(data: &[u8]) -> Vec<String> {
    let mut boxes = Vec::new();
    let mut offset = 0usize;
    while offset + 8 <= data.len() {
        let size = u32::from_be_bytes([
            data[offset],
            data[offset + 1],
            data[offset + 2],
            data[offset + 3],
        ]) as usize;
        boxes.push(String::from_utf8_lossy(&data[offset + 4..offset + 8]).into_owned());
        if size < 8 {
            break;
        }
        offset += size;
    }
    boxes
}

fn box_position(boxes: &[String], name: &str) -> Option<usize> {
    boxes.iter().position(|b| b == name)
}

#[tokio::test]
async fn test_make_seekable_moves_the_index_to_the_front() {
    if !ffmpeg_available() {
        eprintln!("Skipping: FFmpeg not installed");
        return;
    }

    let dir = tempfile::tempdir().unwrap();
    let clip = dir.path().join("clip.mp4");
    if !write_sample_clip(&clip) {
        eprintln!("Skipping: could not render a sample clip");
        return;
    }

    // FFmpeg writes the index at the tail by default.
    let before = top_level_boxes(&std::fs::read(&clip).unwrap());
    let moov = box_position(&before, "moov").expect("sample clip has a moov box");
    let mdat = box_position(&before, "mdat").expect("sample clip has an mdat box");
    assert!(mdat < moov, "expected tail index before remux, got {before:?}");

    meetcap::recorder::make_seekable(&clip).await.unwrap();

    assert!(clip.exists(), "original path must still exist");
    let staging = meetcap::recorder::seekable_path(&clip);
    assert!(!staging.exists(), "staging sibling must be cleaned up");

    let after = top_level_boxes(&std::fs::read(&clip).unwrap());
    let moov = box_position(&after, "moov").expect("remuxed clip has a moov box");
    let mdat = box_position(&after, "mdat").expect("remuxed clip has an mdat box");
    assert!(moov < mdat, "expected front index after remux, got {after:?}");
}

#[tokio::test]
async fn test_failed_remux_leaves_the_original_untouched() {
    if !ffmpeg_available() {
        eprintln!("Skipping: FFmpeg not installed");
        return;
    }

    let dir = tempfile::tempdir().unwrap();
    let clip = dir.path().join("broken.mp4");
    let payload: Vec<u8> = (0..4096u32).map(|i| (i % 251) as u8).collect();
    std::fs::write(&clip, &payload).unwrap();

    let result = meetcap::recorder::make_seekable(&clip).await;
    assert!(
        matches!(result, Err(meetcap::RecorderError::Remux { .. })),
        "garbage input must fail the remux, got {result:?}"
    );

    assert_eq!(
        std::fs::read(&clip).unwrap(),
        payload,
        "failed remux must not touch the original"
    );
    assert!(!meetcap::recorder::seekable_path(&clip).exists());
}

#[tokio::test]
async fn test_cleanup_remuxes_a_finished_recording() {
    if !ffmpeg_available() {
        eprintln!("Skipping: FFmpeg not installed");
        return;
    }

    use meetcap::{Config, Recorder, RecorderConfig};
    use meetcap::recorder::seekable::REMUX_MIN_BYTES;

    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("meeting.mp4");
    if !write_sample_clip(&output) {
        eprintln!("Skipping: could not render a sample clip");
        return;
    }
    let size = std::fs::metadata(&output).unwrap().len();
    assert!(
        size >= REMUX_MIN_BYTES,
        "sample clip must clear the remux floor, got {size} bytes"
    );

    let config = RecorderConfig::new(&output, 1280, 720, false);
    let mut recorder = Recorder::new(config, &Config::default());
    recorder.cleanup().await.unwrap();

    assert!(output.exists());
    assert!(!meetcap::recorder::seekable_path(&output).exists());

    let boxes = top_level_boxes(&std::fs::read(&output).unwrap());
    let moov = box_position(&boxes, "moov").expect("cleaned recording has a moov box");
    let mdat = box_position(&boxes, "mdat").expect("cleaned recording has an mdat box");
    assert!(moov < mdat, "cleanup must leave a front index, got {boxes:?}");
}
