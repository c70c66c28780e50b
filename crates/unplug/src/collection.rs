//! Ordered in-memory view of one user's records, newest first.

use unplug_api::{Change, OwnedRecord};

/// The store's local cache of records, ordered by creation descending.
///
/// Invariants: no two entries share an id; inserting an id that already
/// exists is a no-op; updates replace in place without moving the entry;
/// deleting a missing id is a no-op.
#[derive(Debug, Clone)]
pub struct OrderedCollection<T> {
    records: Vec<T>,
}

impl<T: OwnedRecord> OrderedCollection<T> {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    pub fn records(&self) -> &[T] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&T> {
        self.records.iter().find(|record| record.id() == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Install server truth wholesale: sort by creation descending and drop
    /// any duplicate ids the backend should never have sent.
    pub fn replace_all(&mut self, mut records: Vec<T>) {
        records.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
        self.records.clear();
        for record in records {
            if !self.contains(record.id()) {
                self.records.push(record);
            }
        }
    }

    /// Merge one change event in arrival order. Returns whether anything
    /// changed, so callers know when to recompute derived aggregates.
    pub fn apply(&mut self, change: Change<T>) -> bool {
        match change {
            Change::Inserted { record } => {
                if self.contains(record.id()) {
                    // Already known, e.g. our own write echoed back.
                    return false;
                }
                // New records sort first by recency.
                self.records.insert(0, record);
                true
            }
            Change::Updated { record } => match self.position(record.id()) {
                Some(index) => {
                    self.records[index] = record;
                    true
                }
                None => false,
            },
            Change::Deleted { id } => match self.position(&id) {
                Some(index) => {
                    self.records.remove(index);
                    true
                }
                None => false,
            },
        }
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.records.iter().position(|record| record.id() == id)
    }
}

impl<T: OwnedRecord> Default for OrderedCollection<T> {
    fn default() -> Self {
        Self::new()
    }
}
