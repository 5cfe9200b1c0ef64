use crate::{record::MappedRecord, watermark::Watermark};

/// An ordered slice of mapped records handed to the dispatcher as one unit of
/// work. Commit granularity is one batch: `watermark` is the high-water
/// source position once every record in the batch is acknowledged.
#[derive(Debug, Clone)]
pub struct Batch {
    /// Sequence index within the run, starting at 1.
    pub seq: u64,

    /// Global index (1-based) of the first record in this batch, counted over
    /// mapped records. Used to report the record range of a failed batch.
    pub first_record: u64,

    pub records: Vec<MappedRecord>,

    /// Source position reached at the end of this batch.
    pub watermark: Watermark,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Inclusive global record range covered by this batch.
    pub fn record_range(&self) -> (u64, u64) {
        (
            self.first_record,
            self.first_record + self.records.len().saturating_sub(1) as u64,
        )
    }
}
