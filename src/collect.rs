// SPDX-License-Identifier: MPL-2.0

//! Day-bucketed attack-count sources.
//!
//! The release engine does not know how per-source counts are produced; it
//! only consumes the [`DayCountSource`] seam. A source answers a calendar
//! date with one record per attacking source observed during that UTC day,
//! already scoped to the monitored service port and filtered of trusted
//! addresses. An empty collection is a valid answer, not an error.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Errors propagated by day-count sources.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum CollectError {
    /// The backing store could not be reached.
    #[error("count backend unavailable: {0}")]
    Unavailable(String),

    /// The backing store answered with something we could not interpret.
    #[error("malformed backend response: {0}")]
    Malformed(String),
}

/// One source's contribution to a day's attack total.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttackRecord {
    /// Identifier of the attacking source, typically an IP address.
    pub source: String,

    /// Number of events attributed to the source during the queried day.
    pub count: u64,
}

impl AttackRecord {
    /// Construct a record for `source` with `count` events.
    pub fn new(source: impl Into<String>, count: u64) -> Self {
        Self {
            source: source.into(),
            count,
        }
    }
}

/// Produces the per-source count collection for a single UTC day.
///
/// Records are unique per source. Their order carries no meaning beyond
/// tie-breaking in diagnostics, so implementations may return whatever order
/// the backend produces. Fetches must be read-only and side-effect free; the
/// engine issues one fetch per query with no retry.
pub trait DayCountSource {
    /// Fetch all records for `day`.
    fn fetch(&self, day: NaiveDate) -> Result<Vec<AttackRecord>, CollectError>;
}

/// In-memory day-count source, keyed by day.
///
/// Used by tests and the `day_query` tool; deserializes from a JSON map of
/// `"YYYY-MM-DD"` to record lists. Days with no entry yield an empty
/// collection.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemorySource {
    days: HashMap<NaiveDate, Vec<AttackRecord>>,
}

impl MemorySource {
    /// Create an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the records stored for `day`.
    pub fn insert_day(&mut self, day: NaiveDate, records: Vec<AttackRecord>) {
        self.days.insert(day, records);
    }
}

impl DayCountSource for MemorySource {
    fn fetch(&self, day: NaiveDate) -> Result<Vec<AttackRecord>, CollectError> {
        Ok(self.days.get(&day).cloned().unwrap_or_default())
    }
}
