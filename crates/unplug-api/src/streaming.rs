//! Change-notification types delivered by remote subscriptions.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::SyncError;
use crate::records::OwnedRecord;

/// A row as it crosses the remote-client boundary: a flat JSON object.
///
/// Typed validation into [`OwnedRecord`] structs happens above this boundary,
/// never below it.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Buffer size for subscription channels. A consumer that falls this many
/// events behind starts losing them; manual refresh resyncs from server truth.
pub const SUBSCRIPTION_BUFFER: usize = 64;

/// Matcher for conditional updates and deletes.
///
/// Both fields must match, so a mutation can never reach another user's row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowMatch {
    pub id: String,
    pub owner_id: String,
}

impl RowMatch {
    pub fn new(id: impl Into<String>, owner_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            owner_id: owner_id.into(),
        }
    }
}

/// Notification of a remote insert/update/delete on a subscribed table.
///
/// Produced by the client's subscription channel, consumed exactly once by
/// the owning store, discarded after the merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Change<T> {
    Inserted { record: T },
    Updated { record: T },
    Deleted { id: String },
}

/// Change events as they arrive on the wire, before schema validation.
pub type RowChange = Change<Row>;

impl<T: OwnedRecord> Change<T> {
    /// Identifier of the affected record.
    pub fn id(&self) -> &str {
        match self {
            Change::Inserted { record } | Change::Updated { record } => record.id(),
            Change::Deleted { id } => id,
        }
    }
}

impl Change<Row> {
    /// Validate a wire-level event into a typed one. Deletions carry only the
    /// identifier and pass through untouched.
    pub fn decode<T: OwnedRecord>(self) -> Result<Change<T>, SyncError> {
        Ok(match self {
            Change::Inserted { record } => Change::Inserted {
                record: crate::records::decode_row(record)?,
            },
            Change::Updated { record } => Change::Updated {
                record: crate::records::decode_row(record)?,
            },
            Change::Deleted { id } => Change::Deleted { id },
        })
    }
}

/// Owns one live change-notification channel.
///
/// `release()` stops further delivery; dropping the handle releases it too,
/// so a torn-down store cannot leak its channel across user identities.
#[derive(Debug)]
pub struct SubscriptionHandle {
    released: Arc<AtomicBool>,
}

impl SubscriptionHandle {
    pub fn new() -> Self {
        Self {
            released: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shared flag for the backend side of the channel. The backend stops
    /// delivering to this subscriber once the flag is set.
    pub fn released_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.released)
    }

    /// Stop further event delivery. Idempotent.
    pub fn release(&self) {
        self.released.store(true, Ordering::SeqCst);
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

impl Default for SubscriptionHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.release();
    }
}

/// An open subscription: the disposable handle plus the event channel.
#[derive(Debug)]
pub struct Subscription {
    pub handle: SubscriptionHandle,
    pub events: mpsc::Receiver<RowChange>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_is_visible_through_the_shared_flag() {
        let handle = SubscriptionHandle::new();
        let flag = handle.released_flag();
        assert!(!flag.load(Ordering::SeqCst));

        handle.release();
        assert!(flag.load(Ordering::SeqCst));
        assert!(handle.is_released());
    }

    #[test]
    fn dropping_a_handle_releases_it() {
        let handle = SubscriptionHandle::new();
        let flag = handle.released_flag();
        drop(handle);
        assert!(flag.load(Ordering::SeqCst));
    }
}
