use model::watermark::Watermark;
use serde::Serialize;

/// A batch that exhausted its dispatch retries, with the record range it
/// covered so the rows can be replayed or investigated.
#[derive(Serialize, Debug, Clone)]
pub struct FailedBatch {
    pub seq: u64,
    pub first_record: u64,
    pub last_record: u64,
    pub attempts: usize,
    pub error: String,
}

/// End-of-run accounting. Every error that occurred is reflected here; none
/// is discarded silently.
#[derive(Serialize, Debug, Clone)]
pub struct RunSummary {
    pub mode: String,
    pub dry_run: bool,

    pub records_read: u64,
    pub records_mapped: u64,
    pub records_skipped: u64,

    pub batches_sent: u64,
    pub batches_failed: u64,
    pub failed_batches: Vec<FailedBatch>,

    pub rows_inserted: u64,
    pub rows_updated: u64,

    pub final_watermark: Watermark,
    pub cancelled: bool,
    pub elapsed_ms: u64,
}

impl RunSummary {
    pub fn new(mode: String, dry_run: bool) -> Self {
        RunSummary {
            mode,
            dry_run,
            records_read: 0,
            records_mapped: 0,
            records_skipped: 0,
            batches_sent: 0,
            batches_failed: 0,
            failed_batches: Vec::new(),
            rows_inserted: 0,
            rows_updated: 0,
            final_watermark: Watermark::None,
            cancelled: false,
            elapsed_ms: 0,
        }
    }
}
