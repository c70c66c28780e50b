//! Shared harness for the engine integration tests: an observable wrapper
//! around the in-memory backend plus context wiring.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use unplug::{SessionAuth, SyncContext};
use unplug_api::{RemoteClient, Row, RowMatch, Subscription, SyncError};
use unplug_memory::MemoryRemote;

/// In-memory backend that records traffic and can script failures.
#[derive(Default)]
pub struct RecordingRemote {
    inner: MemoryRemote,
    fetches: AtomicUsize,
    last_matcher: Mutex<Option<RowMatch>>,
    fail_fetches: AtomicBool,
    fail_updates: AtomicBool,
}

impl RecordingRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `fetch_owned` calls issued so far, across all tables.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Matcher of the most recent update or delete.
    pub fn last_matcher(&self) -> Option<RowMatch> {
        self.last_matcher.lock().unwrap().clone()
    }

    pub fn fail_fetches(&self, fail: bool) {
        self.fail_fetches.store(fail, Ordering::SeqCst);
    }

    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl RemoteClient for RecordingRemote {
    async fn fetch_owned(&self, table: &str, owner_id: &str) -> Result<Vec<Row>, SyncError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail_fetches.load(Ordering::SeqCst) {
            return Err(SyncError::remote("scripted fetch failure"));
        }
        self.inner.fetch_owned(table, owner_id).await
    }

    async fn insert_row(&self, table: &str, row: Row) -> Result<Row, SyncError> {
        self.inner.insert_row(table, row).await
    }

    async fn update_rows(
        &self,
        table: &str,
        matcher: &RowMatch,
        patch: Row,
    ) -> Result<u64, SyncError> {
        *self.last_matcher.lock().unwrap() = Some(matcher.clone());
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(SyncError::remote("scripted update failure"));
        }
        self.inner.update_rows(table, matcher, patch).await
    }

    async fn delete_rows(&self, table: &str, matcher: &RowMatch) -> Result<u64, SyncError> {
        *self.last_matcher.lock().unwrap() = Some(matcher.clone());
        self.inner.delete_rows(table, matcher).await
    }

    async fn subscribe(&self, table: &str, owner_id: &str) -> Result<Subscription, SyncError> {
        self.inner.subscribe(table, owner_id).await
    }
}

/// Fresh backend, signed-out auth session, and the context tying them
/// together.
pub fn harness() -> (Arc<RecordingRemote>, Arc<SessionAuth>, SyncContext) {
    let remote = Arc::new(RecordingRemote::new());
    let auth = Arc::new(SessionAuth::new());
    let ctx = SyncContext::new(remote.clone(), auth.clone());
    (remote, auth, ctx)
}

/// Build a wire row from JSON literal syntax.
pub fn object(value: serde_json::Value) -> Row {
    match value {
        serde_json::Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}
