//! In-Memory Journal
//!
//! An appendable journal that serves as a provider for tests and the demo server.
//!
//! With look-ahead counting enabled the journal behaves like a backend that
//! cannot count cheaply: it reports the rows read so far plus one more page,
//! so the count grows as the consumer fetches towards the end.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use anyhow::bail;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use super::{Provider, RangeFetch};

// == Journal Record ==
/// A single journal event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JournalRecord {
    /// Monotonically increasing identifier
    pub id: i64,
    /// When the event was recorded
    pub timestamp: DateTime<Utc>,
    /// Originating source name
    pub source: String,
    /// Event text
    pub message: String,
}

// == Query Parameters ==
/// Record filter applied on every fetch. Opaque to the cache.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JournalFilter {
    /// Only records with `id >= min_id`
    pub min_id: Option<i64>,
    /// Only records whose message contains this text
    pub message_contains: Option<String>,
}

impl JournalFilter {
    fn matches(&self, record: &JournalRecord) -> bool {
        if let Some(min_id) = self.min_id {
            if record.id < min_id {
                return false;
            }
        }
        match &self.message_contains {
            Some(text) => record.message.contains(text.as_str()),
            None => true,
        }
    }
}

/// Ordering of fetched records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    /// Newest record at index 0 (live journal view)
    #[default]
    NewestFirst,
    /// Oldest record at index 0
    OldestFirst,
}

// == Memory Journal ==
/// Thread-safe in-memory journal implementing [`Provider`].
#[derive(Debug, Default)]
pub struct MemoryJournal {
    records: RwLock<Vec<JournalRecord>>,
    filter: JournalFilter,
    order: SortOrder,
    latency: Option<Duration>,
    /// Look-ahead page size, `None` for exact counts
    lookahead: Option<usize>,
    /// Count last reported in look-ahead mode
    reported: AtomicUsize,
    fail_next: AtomicUsize,
    count_calls: AtomicUsize,
    range_calls: AtomicUsize,
    latest_id_calls: AtomicUsize,
}

impl MemoryJournal {
    /// Creates an empty newest-first journal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a journal pre-filled with `n` synthetic records.
    pub fn with_records(n: usize) -> Self {
        let journal = Self::new();
        for i in 0..n {
            journal.append("seed", format!("event {}", i));
        }
        journal
    }

    /// Sets the filter applied to every fetch.
    pub fn with_filter(mut self, filter: JournalFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Sets the record ordering.
    pub fn with_order(mut self, order: SortOrder) -> Self {
        self.order = order;
        self
    }

    /// Delays every provider call, simulating a slow backend.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Reports counts by looking one `page_size` page past the rows read so
    /// far instead of counting every row.
    pub fn with_lookahead(mut self, page_size: usize) -> Self {
        self.lookahead = Some(page_size.max(1));
        self
    }

    /// Appends a record and returns its id.
    pub fn append(&self, source: impl Into<String>, message: impl Into<String>) -> i64 {
        let mut records = self.records.write();
        let id = records.last().map_or(0, |r| r.id + 1);
        records.push(JournalRecord {
            id,
            timestamp: Utc::now(),
            source: source.into(),
            message: message.into(),
        });
        id
    }

    /// Makes the next `n` provider calls fail.
    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Total records stored, ignoring the filter.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Number of `fetch_count` calls served so far.
    pub fn count_calls(&self) -> usize {
        self.count_calls.load(Ordering::SeqCst)
    }

    /// Number of `fetch_range` calls served so far.
    pub fn range_calls(&self) -> usize {
        self.range_calls.load(Ordering::SeqCst)
    }

    /// Number of `fetch_latest_id` calls served so far.
    pub fn latest_id_calls(&self) -> usize {
        self.latest_id_calls.load(Ordering::SeqCst)
    }

    fn enter(&self, calls: &AtomicUsize) -> anyhow::Result<()> {
        calls.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            thread::sleep(latency);
        }
        let injected = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            bail!("journal backend unavailable");
        }
        Ok(())
    }

    /// Count for a range fetch that returned `returned` of `len` rows from
    /// `start`. A full page ending at the known count looks one page further.
    fn range_count(&self, total: usize, start: usize, len: usize, returned: usize) -> usize {
        let Some(page_size) = self.lookahead else {
            return total;
        };
        let known = self.reported.load(Ordering::SeqCst);
        let end = start + returned;

        let count = if returned == 0 {
            known
        } else if returned < len {
            end
        } else if end >= known {
            end + page_size.min(total.saturating_sub(end))
        } else {
            known
        };
        self.reported.store(count, Ordering::SeqCst);
        count
    }

    fn visible(&self) -> Vec<JournalRecord> {
        let records = self.records.read();
        let matching = records.iter().filter(|r| self.filter.matches(r)).cloned();
        match self.order {
            SortOrder::OldestFirst => matching.collect(),
            SortOrder::NewestFirst => {
                let mut v: Vec<_> = matching.collect();
                v.reverse();
                v
            }
        }
    }
}

impl Provider for MemoryJournal {
    type Record = JournalRecord;

    fn fetch_count(&self) -> anyhow::Result<usize> {
        self.enter(&self.count_calls)?;
        let total = self.visible().len();
        let Some(page_size) = self.lookahead else {
            return Ok(total);
        };
        let count = total.min(page_size.saturating_mul(2));
        self.reported.store(count, Ordering::SeqCst);
        Ok(count)
    }

    fn fetch_range(&self, start: usize, len: usize) -> anyhow::Result<RangeFetch<JournalRecord>> {
        self.enter(&self.range_calls)?;
        let visible = self.visible();
        let total = visible.len();
        let records: Vec<_> = visible.into_iter().skip(start).take(len).collect();
        let overall_count = self.range_count(total, start, len, records.len());
        Ok(RangeFetch::new(records, overall_count))
    }

    fn fetch_latest_id(&self) -> anyhow::Result<i64> {
        self.enter(&self.latest_id_calls)?;
        let records = self.records.read();
        Ok(records
            .iter()
            .filter(|r| self.filter.matches(r))
            .map(|r| r.id)
            .max()
            .unwrap_or(-1))
    }
}
