use anyhow::Result;
use clap::Parser;
use meetcap::cli::{
    handle_doctor_command, handle_record_command, Cli, CliCommand, RecordCliArgs,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_level = if cli.verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match cli.command {
        Some(CliCommand::Version) => {
            println!("meetcap {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        Some(CliCommand::Doctor(args)) => {
            handle_doctor_command(args).await?;
            return Ok(());
        }
        Some(CliCommand::Record(args)) => {
            handle_record_command(args).await?;
            return Ok(());
        }
        None => {}
    }

    // Bare invocation records the default display, mirroring how the bot
    // containers run it.
    handle_record_command(RecordCliArgs::default()).await
}
