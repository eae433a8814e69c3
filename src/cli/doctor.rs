//! `meetcap doctor`: diagnose the host audio and capture stack.
//!
//! Each fact is probed independently so a broken daemon still yields a full
//! tool report. Probes never mutate daemon state; a host mid-meeting can be
//! diagnosed safely.

use anyhow::Result;
use serde::Serialize;

use crate::audio::control::PactlControl;
use crate::audio::routing::AudioRouter;
use crate::cli::args::DoctorCliArgs;
use crate::config::Config;

#[derive(Debug, Serialize)]
pub struct AudioRouteReport {
    pub ffmpeg: bool,
    pub pactl: bool,
    pub pulseaudio: bool,
    pub xterm: bool,
    pub daemon_running: bool,
    pub sink_exists: bool,
    pub monitor_exists: bool,
    pub browser_streams: usize,
    pub routed_streams: usize,
    pub signal_detected: bool,
}

impl AudioRouteReport {
    /// Whether a recording started now would capture meeting audio through
    /// the capture sink.
    pub fn capture_ready(&self) -> bool {
        self.ffmpeg && self.daemon_running && self.sink_exists && self.monitor_exists
    }
}

pub async fn handle_doctor_command(args: DoctorCliArgs) -> Result<()> {
    let config = Config::load()?;
    let report = collect_report(&config).await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_human(&report);
    }
    Ok(())
}

async fn collect_report(config: &Config) -> AudioRouteReport {
    let ffmpeg = which::which("ffmpeg").is_ok();
    let pactl = which::which("pactl").is_ok();
    let pulseaudio = which::which("pulseaudio").is_ok();
    let xterm = which::which("xterm").is_ok();

    let router = AudioRouter::new(
        Box::new(PactlControl::new(config.timing.probe_timeout())),
        config.audio.clone(),
        config.timing.clone(),
    );

    let daemon_running = pactl && router.daemon_running().await;
    let sink_exists = daemon_running && router.capture_sink_present().await;
    let monitor_exists = sink_exists && router.monitor_present().await;
    let (browser_streams, routed_streams) = if daemon_running {
        router.browser_stream_counts().await
    } else {
        (0, 0)
    };
    let signal_detected =
        monitor_exists && ffmpeg && router.has_signal(config.timing.signal_probe()).await;

    AudioRouteReport {
        ffmpeg,
        pactl,
        pulseaudio,
        xterm,
        daemon_running,
        sink_exists,
        monitor_exists,
        browser_streams,
        routed_streams,
        signal_detected,
    }
}

fn print_human(report: &AudioRouteReport) {
    let mark = |ok: bool| if ok { "ok" } else { "missing" };

    println!("Tools:");
    println!("  ffmpeg          {}", mark(report.ffmpeg));
    println!("  pactl           {}", mark(report.pactl));
    println!("  pulseaudio      {}", mark(report.pulseaudio));
    println!("  xterm           {}", mark(report.xterm));
    println!("Audio route:");
    println!("  daemon running  {}", mark(report.daemon_running));
    println!("  capture sink    {}", mark(report.sink_exists));
    println!("  monitor source  {}", mark(report.monitor_exists));
    println!(
        "  browser streams {} ({} routed to capture sink)",
        report.browser_streams, report.routed_streams
    );
    println!(
        "  signal          {}",
        if report.signal_detected {
            "detected"
        } else {
            "silent"
        }
    );

    if report.capture_ready() {
        println!("\nCapture route is ready.");
    } else {
        println!("\nCapture route is degraded; recordings may have no audio.");
    }
}
