pub mod sled_store;

use crate::{config::SyncMode, error::StateError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use model::watermark::Watermark;
use serde::{Deserialize, Serialize};

/// The single persisted record per deployment target. Read at start, written
/// only on successful batch commit.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SyncState {
    pub mode: SyncMode,
    pub last_watermark: Watermark,
    pub last_run_at: DateTime<Utc>,
}

/// Owns the watermark. No other component ever mutates it.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn load(&self) -> Result<Option<SyncState>, StateError>;

    /// Persists a new state. Implementations must refuse to move the
    /// watermark backwards; committing an older position is a no-op.
    async fn commit(&self, state: &SyncState) -> Result<(), StateError>;

    /// Takes the single-writer run lock, failing if another run holds it.
    async fn acquire_lock(&self, run_id: &str) -> Result<(), StateError>;

    async fn release_lock(&self, run_id: &str) -> Result<(), StateError>;
}
