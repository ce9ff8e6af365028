//! Event Ingest Production Service
//!
//! Accepts analytics events over HTTP and flushes them to ClickHouse in
//! batches. `replay` re-inserts batches from a dead-letter file.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};

use event_ingest_service::{
    initialize_logging, install_exporter, load_configuration, replay_dead_letters,
    setup_signal_handlers, ServiceConfig, ServiceState,
};

#[derive(Parser)]
#[command(name = "event-ingest")]
#[command(about = "Analytics event ingestion service")]
#[command(version)]
struct Cli {
    /// TOML configuration file (defaults to $INGEST_CONFIG)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP ingest service (default)
    Serve,

    /// Re-insert batches recorded in a dead-letter file
    Replay {
        /// Dead-letter JSON-lines file
        #[arg(short, long)]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = load_configuration(cli.config.as_deref())?;

    // Initialize logging first
    initialize_logging(&config.logging)?;
    info!("Starting Event Ingest Service v{}", env!("CARGO_PKG_VERSION"));

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Replay { file } => replay(config, file).await,
    }
}

async fn serve(config: ServiceConfig) -> Result<()> {
    install_exporter(&config.metrics)?;

    // Create service state
    let service_state = ServiceState::new(config).await?;
    info!("Service state initialized");

    // Setup signal handlers for graceful shutdown
    let shutdown_signal = setup_signal_handlers()?;
    info!("Signal handlers configured");

    let stats = service_state
        .run(async move {
            let _ = shutdown_signal.await;
            info!("Shutdown signal received. Initiating graceful shutdown...");
        })
        .await?;

    info!(
        events_received = stats.events_received,
        events_written = stats.events_written,
        events_dead_lettered = stats.events_dead_lettered,
        "Event Ingest Service shutdown complete"
    );
    Ok(())
}

async fn replay(config: ServiceConfig, file: PathBuf) -> Result<()> {
    let store = event_pipeline::connect_store(&config.store)
        .await
        .context("Failed to connect event store")?;

    let summary = replay_dead_letters(store.as_ref(), &file).await?;
    info!(
        batches = summary.batches,
        events = summary.events,
        failed_batches = summary.failed_batches,
        "Replay finished"
    );

    if summary.failed_batches > 0 {
        warn!("Failed batches stay in {:?} for another attempt", file);
        anyhow::bail!(
            "{} of {} batches failed to replay",
            summary.failed_batches,
            summary.batches + summary.failed_batches
        );
    }
    Ok(())
}
