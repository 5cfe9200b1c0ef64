use sync_engine::error::{ConfigError, ExtractError, StateError, SyncError, TransportError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("State store error: {0}")]
    State(#[from] StateError),

    #[error("Source error: {0}")]
    Extract(#[from] ExtractError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Sync failed: {0}")]
    Sync(#[from] SyncError),

    #[error("Failed to serialize summary: {0}")]
    JsonSerialize(#[from] serde_json::Error),
}
