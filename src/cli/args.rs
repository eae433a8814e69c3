use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "meetcap")]
#[command(about = "Headless screen and audio capture for meeting bots", long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<CliCommand>,
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// Record a display to a media file
    Record(RecordCliArgs),
    /// Diagnose the host audio and capture stack
    Doctor(DoctorCliArgs),
    /// Print version information
    Version,
}

#[derive(ClapArgs, Debug)]
pub struct RecordCliArgs {
    /// X display to record
    #[arg(short, long, default_value = ":0")]
    pub display: String,
    /// Output file path (defaults into the data directory)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// Recording width in pixels
    #[arg(long, default_value_t = 1280)]
    pub width: u32,
    /// Recording height in pixels
    #[arg(long, default_value_t = 720)]
    pub height: u32,
    /// Capture audio only (MP3 output)
    #[arg(long)]
    pub audio_only: bool,
    /// Stop automatically after this many seconds
    #[arg(long)]
    pub duration: Option<u64>,
}

impl Default for RecordCliArgs {
    fn default() -> Self {
        Self {
            display: ":0".to_string(),
            output: None,
            width: 1280,
            height: 720,
            audio_only: false,
            duration: None,
        }
    }
}

#[derive(ClapArgs, Debug)]
pub struct DoctorCliArgs {
    /// Emit the report as JSON
    #[arg(long)]
    pub json: bool,
}
