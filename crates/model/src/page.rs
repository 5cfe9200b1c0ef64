use crate::{record::SourceRecord, watermark::Watermark};

/// One page of rows pulled from the source. The sequence of pages is lazy,
/// finite and forward-only; resuming mid-stream means reissuing the query
/// from the last committed watermark.
#[derive(Debug, Clone)]
pub struct FetchPage {
    pub records: Vec<SourceRecord>,

    /// Cursor to resume from for the next page.
    pub next: Watermark,

    /// True when the page was short, i.e. the stream is exhausted.
    pub reached_end: bool,
}
