//! Bounded, newest-first record histories.

use std::collections::VecDeque;

use parking_lot::RwLock;
use relay_proto::{ChatRecord, RollRecord};

/// Records that carry a stable identifier used for de-duplication.
pub trait Keyed {
    /// The record's id.
    fn key(&self) -> &str;
}

impl Keyed for RollRecord {
    fn key(&self) -> &str {
        &self.id
    }
}

impl Keyed for ChatRecord {
    fn key(&self) -> &str {
        &self.id
    }
}

/// A ring buffer of recent records.
///
/// Newest first. Recording a record whose id is already present replaces
/// it in place; otherwise it goes to the front and the oldest record is
/// dropped once the buffer is full.
#[derive(Debug)]
pub struct HistoryBuffer<T> {
    capacity: usize,
    records: RwLock<VecDeque<T>>,
}

/// Recent dice rolls.
pub type RollHistory = HistoryBuffer<RollRecord>;

/// Recent non-roll chat messages.
pub type ChatHistory = HistoryBuffer<ChatRecord>;

impl<T: Keyed + Clone> HistoryBuffer<T> {
    /// Create an empty buffer. A capacity of zero is treated as one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            records: RwLock::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Add or replace a record. Returns `true` if it was new.
    pub fn record(&self, record: T) -> bool {
        let mut records = self.records.write();
        if let Some(existing) = records.iter_mut().find(|r| r.key() == record.key()) {
            *existing = record;
            return false;
        }
        records.push_front(record);
        records.truncate(self.capacity);
        true
    }

    /// Replace the contents with `records`, given oldest first.
    pub fn replace_all(&self, records: impl IntoIterator<Item = T>) {
        self.clear();
        for record in records {
            self.record(record);
        }
    }

    /// Up to `limit` records, newest first.
    #[must_use]
    pub fn recent(&self, limit: usize) -> Vec<T> {
        self.records.read().iter().take(limit).cloned().collect()
    }

    /// All records, newest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<T> {
        self.records.read().iter().cloned().collect()
    }

    /// The newest record.
    #[must_use]
    pub fn latest(&self) -> Option<T> {
        self.records.read().front().cloned()
    }

    /// Look a record up by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<T> {
        self.records.read().iter().find(|r| r.key() == id).cloned()
    }

    /// Remove everything.
    pub fn clear(&self) {
        self.records.write().clear();
    }

    /// Number of records held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Whether the buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Maximum number of records held.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Entry {
        id: String,
        value: u32,
    }

    impl Keyed for Entry {
        fn key(&self) -> &str {
            &self.id
        }
    }

    fn entry(id: &str, value: u32) -> Entry {
        Entry {
            id: id.to_string(),
            value,
        }
    }

    fn ids(buffer: &HistoryBuffer<Entry>) -> Vec<String> {
        buffer.snapshot().into_iter().map(|e| e.id).collect()
    }

    #[test]
    fn test_newest_first() {
        let buffer = HistoryBuffer::new(5);
        buffer.record(entry("a", 1));
        buffer.record(entry("b", 2));
        assert_eq!(ids(&buffer), vec!["b", "a"]);
        assert_eq!(buffer.latest().unwrap().id, "b");
    }

    #[test]
    fn test_evicts_oldest() {
        let buffer = HistoryBuffer::new(2);
        buffer.record(entry("a", 1));
        buffer.record(entry("b", 2));
        buffer.record(entry("c", 3));
        assert_eq!(ids(&buffer), vec!["c", "b"]);
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn test_duplicate_id_replaced_in_place() {
        let buffer = HistoryBuffer::new(3);
        buffer.record(entry("a", 1));
        buffer.record(entry("b", 2));
        assert!(!buffer.record(entry("a", 9)));
        assert_eq!(ids(&buffer), vec!["b", "a"]);
        assert_eq!(buffer.get("a").unwrap().value, 9);
    }

    #[test]
    fn test_recent_limit() {
        let buffer = HistoryBuffer::new(10);
        for (i, id) in ["a", "b", "c", "d"].into_iter().enumerate() {
            buffer.record(entry(id, u32::try_from(i).unwrap()));
        }
        assert_eq!(
            buffer.recent(2).into_iter().map(|e| e.id).collect::<Vec<_>>(),
            vec!["d", "c"]
        );
        assert_eq!(buffer.recent(100).len(), 4);
    }

    #[test]
    fn test_replace_all_and_clear() {
        let buffer = HistoryBuffer::new(2);
        buffer.record(entry("x", 0));
        buffer.replace_all(vec![entry("a", 1), entry("b", 2), entry("c", 3)]);
        assert_eq!(ids(&buffer), vec!["c", "b"]);
        buffer.clear();
        assert!(buffer.is_empty());
        assert!(buffer.latest().is_none());
    }

    #[test]
    fn test_zero_capacity_holds_one() {
        let buffer = HistoryBuffer::new(0);
        buffer.record(entry("a", 1));
        buffer.record(entry("b", 2));
        assert_eq!(buffer.capacity(), 1);
        assert_eq!(ids(&buffer), vec!["b"]);
    }
}
