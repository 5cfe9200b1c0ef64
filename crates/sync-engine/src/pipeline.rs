use crate::{
    batcher::Batcher,
    config::{FailurePolicy, SyncConfig, SyncMode},
    dispatch::{DispatchOutcome, Dispatcher, WebhookTransport},
    error::{ExtractError, SyncError},
    mapper::map_record,
    source::{RecordSource, record_watermark},
    state::{StateStore, SyncState},
    summary::{FailedBatch, RunSummary},
};
use chrono::Utc;
use model::{batch::Batch, watermark::Watermark};
use std::{sync::Arc, time::Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Default, Clone, Copy)]
struct ProducerStats {
    read: u64,
    mapped: u64,
    skipped: u64,
}

/// Drives one run end to end: extract, map, batch, dispatch, commit.
///
/// Extraction/mapping/batching run in a producer task feeding a bounded
/// channel, so network latency on one batch overlaps with query work on the
/// next; the channel blocks the producer when full rather than buffering an
/// arbitrarily large table in memory.
pub struct SyncRunner {
    config: SyncConfig,
    source: Arc<dyn RecordSource>,
    dispatcher: Dispatcher,
    state: Arc<dyn StateStore>,
    cancel: CancellationToken,
}

impl SyncRunner {
    pub fn new(
        config: SyncConfig,
        source: Arc<dyn RecordSource>,
        transport: Arc<dyn WebhookTransport>,
        state: Arc<dyn StateStore>,
        cancel: CancellationToken,
    ) -> Self {
        let dispatcher = Dispatcher::new(transport, config.retry.clone());
        Self {
            config,
            source,
            dispatcher,
            state,
            cancel,
        }
    }

    /// Executes the run under the single-writer lock. The lock is released on
    /// every exit path of this call; only a killed process leaves it behind.
    pub async fn run(&self) -> Result<RunSummary, SyncError> {
        let run_id = Uuid::new_v4().to_string();
        self.state.acquire_lock(&run_id).await?;
        info!(run_id = %run_id, mode = %self.config.mode, dry_run = self.config.dry_run, "Sync run starting");

        let result = self.run_inner().await;

        if let Err(err) = self.state.release_lock(&run_id).await {
            warn!(error = %err, "Failed to release sync lock");
        }
        result
    }

    async fn run_inner(&self) -> Result<RunSummary, SyncError> {
        let started = Instant::now();
        let mut summary = RunSummary::new(self.config.mode.to_string(), self.config.dry_run);

        let prior = self.state.load().await?;
        let mut committed = prior
            .as_ref()
            .map(|s| s.last_watermark)
            .unwrap_or(Watermark::None);
        summary.final_watermark = committed;

        let start_cursor = match self.config.mode {
            SyncMode::Full => Watermark::None,
            SyncMode::Incremental => committed,
        };

        let (tx, mut rx) = mpsc::channel::<Batch>(self.config.queue_capacity.max(1));
        let abort = self.cancel.child_token();
        let producer = self.spawn_producer(tx, start_cursor, abort.clone());

        let mut fatal: Option<SyncError> = None;

        loop {
            let maybe_batch = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                batch = rx.recv() => batch,
            };
            let Some(batch) = maybe_batch else { break };

            if self.config.dry_run {
                info!(
                    batch_seq = batch.seq,
                    rows = batch.len(),
                    "[DRY RUN] Would send batch"
                );
                summary.batches_sent += 1;
                continue;
            }

            let result = self.dispatcher.send(&batch).await;
            match result.outcome {
                DispatchOutcome::Success => {
                    summary.batches_sent += 1;
                    summary.rows_inserted += result.ack.inserted;
                    summary.rows_updated += result.ack.updated;

                    let state = SyncState {
                        mode: self.config.mode,
                        last_watermark: batch.watermark,
                        last_run_at: Utc::now(),
                    };
                    if let Err(source) = self.state.commit(&state).await {
                        // An uncommitted watermark must never be driven past.
                        fatal = Some(SyncError::StateCommit {
                            seq: batch.seq,
                            source,
                        });
                        break;
                    }
                    committed = committed.max(batch.watermark);
                    summary.final_watermark = committed;
                }
                DispatchOutcome::Fatal => {
                    let (first, last) = batch.record_range();
                    fatal = Some(SyncError::DispatchFatal {
                        seq: batch.seq,
                        first,
                        last,
                        detail: result.error.unwrap_or_default(),
                    });
                    break;
                }
                DispatchOutcome::RetriesExhausted => {
                    let (first, last) = batch.record_range();
                    let detail = result.error.unwrap_or_default();
                    summary.batches_failed += 1;
                    summary.failed_batches.push(FailedBatch {
                        seq: batch.seq,
                        first_record: first,
                        last_record: last,
                        attempts: result.attempts,
                        error: detail.clone(),
                    });

                    match self.config.on_batch_failure {
                        FailurePolicy::Halt => {
                            fatal = Some(SyncError::BatchFailed {
                                seq: batch.seq,
                                first,
                                last,
                                attempts: result.attempts,
                                detail,
                            });
                            break;
                        }
                        FailurePolicy::Skip => {
                            warn!(
                                batch_seq = batch.seq,
                                first_record = first,
                                last_record = last,
                                "Batch failed after retries; skipping per run policy"
                            );
                        }
                    }
                }
            }
        }

        // Stop the producer and drain it before reporting.
        abort.cancel();
        drop(rx);

        match producer.await {
            Ok(Ok(stats)) => {
                summary.records_read = stats.read;
                summary.records_mapped = stats.mapped;
                summary.records_skipped = stats.skipped;
            }
            Ok(Err(extract_err)) => {
                if fatal.is_none() {
                    fatal = Some(SyncError::Extract(extract_err));
                }
            }
            Err(join_err) => {
                if fatal.is_none() {
                    fatal = Some(SyncError::Internal(join_err.to_string()));
                }
            }
        }

        summary.cancelled = self.cancel.is_cancelled();
        summary.elapsed_ms = started.elapsed().as_millis() as u64;

        match fatal {
            Some(err) => {
                error!(
                    summary = %serde_json::to_string(&summary).unwrap_or_default(),
                    "Sync run aborted"
                );
                Err(err)
            }
            None => {
                info!(
                    records_read = summary.records_read,
                    records_skipped = summary.records_skipped,
                    batches_sent = summary.batches_sent,
                    batches_failed = summary.batches_failed,
                    final_watermark = %summary.final_watermark,
                    elapsed_ms = summary.elapsed_ms,
                    "Sync run complete"
                );
                Ok(summary)
            }
        }
    }

    fn spawn_producer(
        &self,
        tx: mpsc::Sender<Batch>,
        start_cursor: Watermark,
        abort: CancellationToken,
    ) -> tokio::task::JoinHandle<Result<ProducerStats, ExtractError>> {
        let source = self.source.clone();
        let batch_size = self.config.batch_size;
        let page_size = self.config.fetch_page_size;

        tokio::spawn(async move {
            let mut stats = ProducerStats::default();
            let mut batcher = Batcher::new(batch_size);
            let mut cursor = start_cursor;

            loop {
                if abort.is_cancelled() {
                    return Ok(stats);
                }

                let page = source.fetch_page(&cursor, page_size).await?;

                for record in &page.records {
                    stats.read += 1;
                    let position = record_watermark(record);

                    match map_record(record) {
                        Ok(mapped) => {
                            stats.mapped += 1;
                            if let Some(batch) = batcher.push(mapped, position)
                                && tx.send(batch).await.is_err()
                            {
                                // Consumer went away; the run is over.
                                return Ok(stats);
                            }
                        }
                        Err(err) => {
                            stats.skipped += 1;
                            warn!(error = %err, "Skipping unmappable record");
                        }
                    }
                }

                cursor = page.next;
                if page.reached_end {
                    break;
                }
            }

            if let Some(tail) = batcher.flush() {
                let _ = tx.send(tail).await;
            }
            Ok(stats)
        })
    }
}
