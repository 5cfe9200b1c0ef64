use crate::{
    error::StateError,
    state::{StateStore, SyncState},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{path::Path, time::Duration};
use tracing::warn;

const STATE_KEY: &str = "sync:state";
const LOCK_KEY: &str = "sync:lock";

/// A lock older than this is presumed to belong to a killed process and may
/// be reclaimed, so a crashed CronJob invocation cannot wedge every later one.
const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(6 * 60 * 60);

#[derive(Serialize, Deserialize, Clone, Debug)]
struct LockEntry {
    run_id: String,
    acquired_at: DateTime<Utc>,
}

pub struct SledStateStore {
    db: sled::Db,
    lock_ttl: Duration,
}

impl SledStateStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StateError> {
        let db = sled::open(path).map_err(|e| StateError::Open(e.to_string()))?;
        Ok(Self {
            db,
            lock_ttl: DEFAULT_LOCK_TTL,
        })
    }

    pub fn with_lock_ttl(mut self, ttl: Duration) -> Self {
        self.lock_ttl = ttl;
        self
    }

    fn lock_is_stale(&self, entry: &LockEntry) -> bool {
        let age = Utc::now().signed_duration_since(entry.acquired_at);
        age.to_std().is_ok_and(|age| age > self.lock_ttl)
    }

    fn read_state(&self) -> Result<Option<SyncState>, StateError> {
        match self
            .db
            .get(STATE_KEY)
            .map_err(|e| StateError::Load(e.to_string()))?
        {
            Some(bytes) => {
                let state = bincode::deserialize(&bytes)
                    .map_err(|e| StateError::Serialization(e.to_string()))?;
                Ok(Some(state))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl StateStore for SledStateStore {
    async fn load(&self) -> Result<Option<SyncState>, StateError> {
        self.read_state()
    }

    async fn commit(&self, state: &SyncState) -> Result<(), StateError> {
        // Compare-and-swap loop: the stored watermark only ever moves forward,
        // even if two processes race past the run lock.
        loop {
            let current = self
                .db
                .get(STATE_KEY)
                .map_err(|e| StateError::Commit(e.to_string()))?;

            if let Some(bytes) = &current {
                let existing: SyncState = bincode::deserialize(bytes)
                    .map_err(|e| StateError::Serialization(e.to_string()))?;
                if !state.last_watermark.advances(&existing.last_watermark) {
                    // Stored position is already ahead; keep it.
                    return Ok(());
                }
            }

            let new_bytes = bincode::serialize(state)
                .map_err(|e| StateError::Serialization(e.to_string()))?;

            let swapped = self
                .db
                .compare_and_swap(STATE_KEY, current, Some(new_bytes))
                .map_err(|e| StateError::Commit(e.to_string()))?;

            if swapped.is_ok() {
                break;
            }
        }

        // The watermark must be durable before the next batch is dispatched.
        self.db
            .flush_async()
            .await
            .map_err(|e| StateError::Commit(e.to_string()))?;
        Ok(())
    }

    async fn acquire_lock(&self, run_id: &str) -> Result<(), StateError> {
        let entry = LockEntry {
            run_id: run_id.to_string(),
            acquired_at: Utc::now(),
        };
        let new_bytes = bincode::serialize(&entry)
            .map_err(|e| StateError::Serialization(e.to_string()))?;

        loop {
            let current = self
                .db
                .get(LOCK_KEY)
                .map_err(|e| StateError::Commit(e.to_string()))?;

            if let Some(bytes) = &current {
                let holder: LockEntry = bincode::deserialize(bytes)
                    .map_err(|e| StateError::Serialization(e.to_string()))?;
                if !self.lock_is_stale(&holder) {
                    return Err(StateError::LockHeld {
                        holder: holder.run_id,
                    });
                }
                warn!(
                    holder = %holder.run_id,
                    acquired_at = %holder.acquired_at,
                    "Reclaiming stale sync lock"
                );
            }

            let swapped = self
                .db
                .compare_and_swap(LOCK_KEY, current, Some(new_bytes.clone()))
                .map_err(|e| StateError::Commit(e.to_string()))?;

            if swapped.is_ok() {
                break;
            }
        }

        self.db
            .flush_async()
            .await
            .map_err(|e| StateError::Commit(e.to_string()))?;
        Ok(())
    }

    async fn release_lock(&self, run_id: &str) -> Result<(), StateError> {
        let current = self
            .db
            .get(LOCK_KEY)
            .map_err(|e| StateError::Commit(e.to_string()))?;

        let Some(bytes) = current else {
            return Err(StateError::LockLost);
        };
        let holder: LockEntry = bincode::deserialize(&bytes)
            .map_err(|e| StateError::Serialization(e.to_string()))?;
        if holder.run_id != run_id {
            return Err(StateError::LockLost);
        }

        let swapped = self
            .db
            .compare_and_swap(LOCK_KEY, Some(bytes), None::<Vec<u8>>)
            .map_err(|e| StateError::Commit(e.to_string()))?;
        if swapped.is_err() {
            return Err(StateError::LockLost);
        }

        self.db
            .flush_async()
            .await
            .map_err(|e| StateError::Commit(e.to_string()))?;
        Ok(())
    }
}
