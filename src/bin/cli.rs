use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use toolpass::{
    cmd::{Cli, Commands},
    feedback::{FeedbackConfig, FeedbackDispatcher},
    utils::logs_fmt::UptimeSeconds,
};
use tracing::{Level, debug};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_timer(UptimeSeconds)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    debug!(server = %cli.server, "Using toolpass server");

    let remote = cli.remote()?;
    let dispatcher = Arc::new(FeedbackDispatcher::tracing(FeedbackConfig::default()));

    match &cli.command {
        Commands::Check(args) => args.execute(&remote, &dispatcher).await?,
        Commands::Access(args) => args.execute(&remote).await?,
        Commands::Watch(args) => args.execute(remote, dispatcher).await?,
    }

    Ok(())
}
