use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// The last successfully synced position in the source table.
///
/// `Key` is the keyset-pagination cursor used by a full scan (strictly
/// increasing primary key). `Changed` is the incremental cursor over the
/// change-tracking column, with the primary key as tie-breaker so that rows
/// sharing a timestamp still have a stable resume point.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Watermark {
    None,

    /// Primary-key offset (full scan).
    Key { id: u64 },

    /// Change-column position in microseconds since epoch + pk tie-break.
    Changed { ts_micros: i64, id: u64 },
}

impl Watermark {
    pub fn changed(ts: NaiveDateTime, id: u64) -> Self {
        Watermark::Changed {
            ts_micros: ts.and_utc().timestamp_micros(),
            id,
        }
    }

    /// Whether committing `self` on top of `prior` keeps the watermark
    /// monotonically non-decreasing.
    pub fn advances(&self, prior: &Watermark) -> bool {
        self.rank() >= prior.rank()
    }

    /// The larger of the two positions.
    pub fn max(self, other: Watermark) -> Watermark {
        if self.advances(&other) { self } else { other }
    }

    fn rank(&self) -> (i64, u64) {
        match self {
            Watermark::None => (i64::MIN, 0),
            Watermark::Key { id } => (i64::MIN, *id),
            Watermark::Changed { ts_micros, id } => (*ts_micros, *id),
        }
    }
}

impl std::fmt::Display for Watermark {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Watermark::None => write!(f, "none"),
            Watermark::Key { id } => write!(f, "key:{id}"),
            Watermark::Changed { ts_micros, id } => write!(f, "changed:{ts_micros}:{id}"),
        }
    }
}
