//! Concurrency-safe result aggregation with first-writer-wins dedup
//!
//! Listing pages overlap across a category's sub-listings, so the same
//! title is routinely discovered by several concurrent page tasks. The
//! aggregator is the single point where a discovery becomes a record:
//! exactly one `try_add` per title returns true within a run.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// A catalog item that passed its run's filter
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Item title; the dedup key within a run
    pub title: String,

    /// Average score
    pub score: f32,

    /// Number of ratings behind the score
    pub rating_count: u32,

    /// Absolute link to the item's page
    pub link: String,
}

/// Keyed set of records for one criteria run
///
/// Created fresh per run and discarded after export. Insertion is atomic
/// per key: under concurrent attempts on the same title, the first writer
/// wins and later attempts are dropped, never overwritten.
#[derive(Debug, Default)]
pub struct ResultAggregator {
    entries: DashMap<String, Record>,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a discovered item at most once per title
    ///
    /// Returns true iff this call inserted the record, which is the
    /// caller's cue to emit the single "found" notification.
    pub fn try_add(&self, record: Record) -> bool {
        match self.entries.entry(record.title.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(record);
                true
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of all records, sorted by title for deterministic export
    pub fn sorted_records(&self) -> Vec<Record> {
        let mut records: Vec<Record> = self
            .entries
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by(|a, b| a.title.cmp(&b.title));
        records
    }
}
