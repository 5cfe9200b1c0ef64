use model::{batch::Batch, record::MappedRecord, watermark::Watermark};

/// Accumulates mapped records in arrival order and cuts a `Batch` whenever
/// `max_size` is reached. The stream tail is flushed as a final partial batch.
pub struct Batcher {
    max_size: usize,
    seq: u64,
    next_record_index: u64,
    buffer: Vec<MappedRecord>,
    high_water: Watermark,
}

impl Batcher {
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size: max_size.max(1),
            seq: 0,
            next_record_index: 1,
            buffer: Vec::new(),
            high_water: Watermark::None,
        }
    }

    /// Adds a record together with the source position it came from; returns
    /// a full batch once the configured size is reached.
    pub fn push(&mut self, record: MappedRecord, position: Option<Watermark>) -> Option<Batch> {
        self.buffer.push(record);
        if let Some(wm) = position {
            self.high_water = self.high_water.max(wm);
        }

        if self.buffer.len() >= self.max_size {
            Some(self.cut())
        } else {
            None
        }
    }

    /// Emits whatever is buffered as a final partial batch.
    pub fn flush(&mut self) -> Option<Batch> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(self.cut())
        }
    }

    fn cut(&mut self) -> Batch {
        self.seq += 1;
        let records = std::mem::take(&mut self.buffer);
        let first_record = self.next_record_index;
        self.next_record_index += records.len() as u64;

        Batch {
            seq: self.seq,
            first_record,
            records,
            watermark: self.high_water,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(n: u64) -> MappedRecord {
        MappedRecord {
            customer: "Acme".into(),
            group: "EMEA".into(),
            entity: "Acme GmbH".into(),
            tj: format!("TJ{n}"),
            date: "2025-04-01T00:00:00".into(),
            amount: 1.0,
            currency: "EUR".into(),
            status: "new".into(),
            margin: 0.5,
        }
    }

    #[test]
    fn cuts_batches_at_the_configured_size() {
        let mut batcher = Batcher::new(3);
        assert!(batcher.push(record(1), None).is_none());
        assert!(batcher.push(record(2), None).is_none());

        let batch = batcher.push(record(3), None).unwrap();
        assert_eq!(batch.seq, 1);
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.record_range(), (1, 3));
    }

    #[test]
    fn no_batch_ever_exceeds_the_bound() {
        let mut batcher = Batcher::new(200);
        let mut emitted = Vec::new();
        for n in 0..1007 {
            if let Some(batch) = batcher.push(record(n), None) {
                emitted.push(batch);
            }
        }
        if let Some(tail) = batcher.flush() {
            emitted.push(tail);
        }

        assert_eq!(emitted.len(), 6);
        assert!(emitted.iter().all(|b| b.len() <= 200));
        assert_eq!(emitted.last().unwrap().len(), 7);
        assert_eq!(emitted.last().unwrap().record_range(), (1001, 1007));
    }

    #[test]
    fn preserves_arrival_order() {
        let mut batcher = Batcher::new(2);
        batcher.push(record(1), None);
        let batch = batcher.push(record(2), None).unwrap();
        assert_eq!(batch.records[0].tj, "TJ1");
        assert_eq!(batch.records[1].tj, "TJ2");
    }

    #[test]
    fn flush_on_empty_buffer_yields_nothing() {
        let mut batcher = Batcher::new(2);
        assert!(batcher.flush().is_none());
    }

    #[test]
    fn watermark_is_the_high_water_position() {
        let mut batcher = Batcher::new(2);
        batcher.push(record(1), Some(Watermark::Changed { ts_micros: 20, id: 1 }));
        let batch = batcher
            .push(record(2), Some(Watermark::Changed { ts_micros: 10, id: 2 }))
            .unwrap();
        // An out-of-order position never drags the high-water mark back.
        assert_eq!(batch.watermark, Watermark::Changed { ts_micros: 20, id: 1 });
    }
}
