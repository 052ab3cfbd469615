use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "stagecal")]
#[command(about = "Stage calendar reconciliation command-line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one reconcile-and-notify pass over the configured roster.
    Sync,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Sync) {
        Commands::Sync => {
            let summary = stagecal_sync::run_sync_once_from_env().await?;
            println!(
                "sync complete: run_id={} performers={} failed={} new_events={}",
                summary.run_id,
                summary.performers_processed,
                summary.performers_failed,
                summary.new_events
            );
        }
    }

    Ok(())
}
