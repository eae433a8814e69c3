//! ffmpeg argument construction for capture sessions.

use std::path::Path;

use crate::audio::input::{AudioInput, THREAD_QUEUE_SIZE};
use crate::config::CaptureConfig;

/// Extra pixels grabbed on each axis and cropped back off, so capture-edge
/// artifacts never reach the output.
pub const CAPTURE_PADDING: u32 = 10;

/// Output normalization applied whenever audio is muxed into a video
/// recording. Browser streams switch rate and layout mid-call; resampling
/// against the first timestamp keeps A/V drift bounded.
const AUDIO_NORMALIZE_FILTER: &str = "aresample=async=1:first_pts=0,\
     aformat=sample_fmts=s16:sample_rates=48000:channel_layouts=stereo";

/// Argv for a screen recording of `width`x`height` on `display`, optionally
/// with an audio track. The audio input is declared before the screen grab;
/// the muxer picks up the earlier stream first and audio is the one that
/// must not lag.
pub fn screen_command(
    display: &str,
    width: u32,
    height: u32,
    audio: Option<&AudioInput>,
    output: &Path,
    tuning: &CaptureConfig,
) -> Vec<String> {
    let grab_width = width + CAPTURE_PADDING;
    let grab_height = height + CAPTURE_PADDING;

    let mut args: Vec<String> = vec!["-y".to_string()];

    if let Some(audio) = audio {
        args.extend(audio.ffmpeg_args());
    }

    args.extend([
        "-thread_queue_size".to_string(),
        THREAD_QUEUE_SIZE.to_string(),
        "-framerate".to_string(),
        tuning.framerate.to_string(),
        "-video_size".to_string(),
        format!("{}x{}", grab_width, grab_height),
        "-f".to_string(),
        "x11grab".to_string(),
        "-draw_mouse".to_string(),
        "0".to_string(),
        "-probesize".to_string(),
        "32".to_string(),
        "-i".to_string(),
        display.to_string(),
    ]);

    if audio.is_some() {
        args.extend(["-af".to_string(), AUDIO_NORMALIZE_FILTER.to_string()]);
    }

    args.extend([
        "-vf".to_string(),
        format!(
            "crop={}:{}:{}:{}",
            width, height, CAPTURE_PADDING, CAPTURE_PADDING
        ),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-preset".to_string(),
        tuning.video_preset.clone(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-g".to_string(),
        tuning.keyframe_interval.to_string(),
    ]);

    if audio.is_some() {
        args.extend([
            "-c:a".to_string(),
            "aac".to_string(),
            "-strict".to_string(),
            "experimental".to_string(),
            "-b:a".to_string(),
            tuning.aac_bitrate.clone(),
        ]);
    }

    args.push(output.display().to_string());
    args
}

/// Argv for an audio-only MP3 recording.
pub fn audio_only_command(
    audio: &AudioInput,
    output: &Path,
    tuning: &CaptureConfig,
) -> Vec<String> {
    let mut args: Vec<String> = vec!["-y".to_string()];
    args.extend(audio.ffmpeg_args());
    args.extend([
        "-c:a".to_string(),
        "libmp3lame".to_string(),
        "-b:a".to_string(),
        tuning.mp3_bitrate.clone(),
        "-ar".to_string(),
        tuning.mp3_sample_rate.to_string(),
        "-ac".to_string(),
        "1".to_string(),
        output.display().to_string(),
    ]);
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::input::AudioBackend;
    use std::path::PathBuf;

    fn monitor_input() -> AudioInput {
        AudioInput::SinkMonitor {
            source: "meetcap_capture.monitor".to_string(),
            sample_rate: 48000,
            channels: 2,
        }
    }

    fn position(args: &[String], value: &str) -> usize {
        args.iter()
            .position(|a| a == value)
            .unwrap_or_else(|| panic!("{value} not in {args:?}"))
    }

    #[test]
    fn screen_grab_is_padded_and_cropped_back() {
        let args = screen_command(
            ":0",
            1280,
            720,
            None,
            &PathBuf::from("/tmp/out.mp4"),
            &CaptureConfig::default(),
        );

        let size_at = position(&args, "-video_size");
        assert_eq!(args[size_at + 1], "1290x730");

        let vf_at = position(&args, "-vf");
        assert_eq!(args[vf_at + 1], "crop=1280:720:10:10");
    }

    #[test]
    fn audio_input_is_declared_before_the_screen_grab() {
        let args = screen_command(
            ":99",
            640,
            480,
            Some(&monitor_input()),
            &PathBuf::from("/tmp/out.mp4"),
            &CaptureConfig::default(),
        );

        let audio_at = position(&args, "pulse");
        let video_at = position(&args, "x11grab");
        assert!(audio_at < video_at);

        let filter_at = position(&args, "-af");
        assert!(args[filter_at + 1].contains("aresample=async=1:first_pts=0"));
        assert!(args[filter_at + 1].contains("sample_rates=48000"));
        assert!(args[filter_at + 1].contains("channel_layouts=stereo"));

        let codec_at = position(&args, "-c:a");
        assert_eq!(args[codec_at + 1], "aac");
        assert!(args.contains(&"experimental".to_string()));
        assert_eq!(args.last().unwrap(), "/tmp/out.mp4");
    }

    #[test]
    fn video_only_omits_every_audio_flag() {
        let args = screen_command(
            ":0",
            1280,
            720,
            None,
            &PathBuf::from("/tmp/out.mp4"),
            &CaptureConfig::default(),
        );

        assert!(!args.contains(&"-af".to_string()));
        assert!(!args.contains(&"-c:a".to_string()));
        assert!(!args.contains(&"pulse".to_string()));
        assert!(args.contains(&"x11grab".to_string()));
    }

    #[test]
    fn video_defaults_follow_the_encoder_contract() {
        let args = screen_command(
            ":0",
            1280,
            720,
            None,
            &PathBuf::from("/tmp/out.mp4"),
            &CaptureConfig::default(),
        );

        let preset_at = position(&args, "-preset");
        assert_eq!(args[preset_at + 1], "ultrafast");
        let gop_at = position(&args, "-g");
        assert_eq!(args[gop_at + 1], "30");
        let pix_at = position(&args, "-pix_fmt");
        assert_eq!(args[pix_at + 1], "yuv420p");
        assert_eq!(args[0], "-y");
    }

    #[test]
    fn audio_only_encodes_mono_mp3() {
        let input = AudioInput::Device {
            backend: AudioBackend::Pulse,
            device: "default".to_string(),
        };
        let args = audio_only_command(
            &input,
            &PathBuf::from("/tmp/out.mp3"),
            &CaptureConfig::default(),
        );

        let codec_at = position(&args, "-c:a");
        assert_eq!(args[codec_at + 1], "libmp3lame");
        let rate_at = position(&args, "-ar");
        assert_eq!(args[rate_at + 1], "44100");
        let channels_at = position(&args, "-ac");
        assert_eq!(args[channels_at + 1], "1");
        let bitrate_at = position(&args, "-b:a");
        assert_eq!(args[bitrate_at + 1], "192k");

        assert!(!args.contains(&"x11grab".to_string()));
        assert_eq!(args.last().unwrap(), "/tmp/out.mp3");
    }
}
