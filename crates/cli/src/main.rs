use crate::error::CliError;
use clap::Parser;
use std::sync::Arc;
use sync_engine::{
    config::{SyncConfig, SyncMode},
    dispatch::HttpTransport,
    pipeline::SyncRunner,
    source::MySqlExtractor,
    state::sled_store::SledStateStore,
};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod error;
mod shutdown;

/// Revenue forecast sync: moves rows from the BI database to the forecast
/// webhook. Exit code 0 means the run completed (skipped records are logged);
/// nonzero means it was aborted by a fatal error.
#[derive(Parser)]
#[command(name = "revsync", version = "0.1.0", about = "Revenue forecast sync")]
struct Cli {
    /// Full refresh: scan the whole table, ignoring the stored watermark.
    #[arg(long)]
    full: bool,

    /// Run the pipeline without sending batches or committing state.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mode = if cli.full {
        SyncMode::Full
    } else {
        SyncMode::Incremental
    };

    let config = SyncConfig::from_env(mode, cli.dry_run)?;
    if config.dry_run {
        info!("DRY RUN mode: no data will be sent");
    }

    let cancel = CancellationToken::new();
    let shutdown = shutdown::ShutdownCoordinator::new(cancel.clone());
    shutdown.register_handlers();

    let state = Arc::new(SledStateStore::open(&config.state_path)?);
    let source = Arc::new(
        MySqlExtractor::connect(&config.mysql, config.mode, config.min_date).await?,
    );
    let transport = Arc::new(HttpTransport::new(
        &config.app_url,
        &config.api_key,
        config.request_timeout,
    )?);

    let runner = SyncRunner::new(config, source, transport, state, cancel);
    let summary = runner.run().await?;

    if shutdown.was_requested() {
        info!("Run stopped at the last acknowledged batch after shutdown request");
    }

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
