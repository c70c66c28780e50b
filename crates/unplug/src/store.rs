//! Live, locally-consistent view of one user-scoped record set.
//!
//! `RecordStore` performs the initial bulk fetch, opens one change
//! subscription scoped to the signed-in user, merges incoming events into its
//! ordered collection in arrival order, and recomputes derived counts after
//! every mutation. Writes go to the backend first; local state is only
//! touched after the server confirms.
//!
//! A race exists between a mutation's success path and an incoming change
//! event for the same id: whichever applies last wins. That weak-consistency
//! trade-off is accepted; manual refresh replaces everything with server
//! truth.

use std::sync::{Arc, Mutex, RwLock, Weak};

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use unplug_api::{
    Change, OwnedRecord, RealityCheck, RowChange, RowMatch, Subscription, SubscriptionHandle,
    SyncError, decode_row, decode_rows, draft_row, merge_patch, patch_row,
};

use crate::aggregates::ActivityCounts;
use crate::collection::OrderedCollection;
use crate::context::SyncContext;

/// Lifecycle of a store instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No user signed in, or never loaded.
    Uninitialized,
    Loading,
    Ready,
    Error,
    /// Torn down; the subscription is released and nothing mutates again.
    Disposed,
}

/// Read-only view handed to the presentation layer.
#[derive(Debug, Clone, Serialize)]
pub struct StoreSnapshot<T> {
    pub records: Vec<T>,
    pub counts: ActivityCounts,
    pub is_loading: bool,
    pub error: Option<String>,
}

struct StoreState<T> {
    phase: Phase,
    collection: OrderedCollection<T>,
    counts: ActivityCounts,
    error: Option<String>,
}

impl<T: OwnedRecord> StoreState<T> {
    fn new() -> Self {
        Self {
            phase: Phase::Uninitialized,
            collection: OrderedCollection::new(),
            counts: ActivityCounts::default(),
            error: None,
        }
    }

    fn reset(&mut self) {
        self.phase = Phase::Uninitialized;
        self.collection.clear();
        self.counts = ActivityCounts::default();
        self.error = None;
    }

    fn recount(&mut self) {
        self.counts = ActivityCounts::now(self.collection.records());
    }
}

struct StoreInner<T: OwnedRecord> {
    ctx: SyncContext,
    state: RwLock<StoreState<T>>,
    subscription: Mutex<Option<SubscriptionHandle>>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl<T: OwnedRecord> StoreInner<T> {
    /// Release the active channel and stop its pump. Synchronous, so no
    /// further events are delivered once this returns.
    fn release_subscription(&self) {
        if let Some(handle) = self.subscription.lock().unwrap().take() {
            handle.release();
        }
        if let Some(pump) = self.pump.lock().unwrap().take() {
            pump.abort();
        }
    }

    fn record_error(&self, err: &SyncError) {
        let mut state = self.state.write().unwrap();
        if state.phase == Phase::Disposed {
            return;
        }
        state.error = Some(err.to_string());
    }

    /// Merge one wire-level change event. Events that arrive after teardown
    /// or sign-out are discarded.
    fn apply_row_change(&self, change: RowChange) {
        let change = match change.decode::<T>() {
            Ok(change) => change,
            Err(err) => {
                warn!(table = T::TABLE, error = %err, "discarding undecodable change event");
                return;
            }
        };

        let mut state = self.state.write().unwrap();
        if matches!(state.phase, Phase::Disposed | Phase::Uninitialized) {
            return;
        }
        if state.collection.apply(change) {
            state.recount();
        }
    }
}

/// Synchronized view of the signed-in user's rows in one backend table.
pub struct RecordStore<T: OwnedRecord> {
    inner: Arc<StoreInner<T>>,
}

/// Store for the user's logged reality checks.
pub type RealityCheckStore = RecordStore<RealityCheck>;

impl<T: OwnedRecord> RecordStore<T> {
    pub fn new(ctx: SyncContext) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                ctx,
                state: RwLock::new(StoreState::new()),
                subscription: Mutex::new(None),
                pump: Mutex::new(None),
            }),
        }
    }

    pub fn phase(&self) -> Phase {
        self.inner.state.read().unwrap().phase
    }

    pub fn snapshot(&self) -> StoreSnapshot<T> {
        let state = self.inner.state.read().unwrap();
        StoreSnapshot {
            records: state.collection.records().to_vec(),
            counts: state.counts,
            is_loading: state.phase == Phase::Loading,
            error: state.error.clone(),
        }
    }

    /// Initial load: fetch everything the signed-in user owns, then open the
    /// change subscription. With nobody signed in, reset to empty without
    /// issuing a request.
    pub async fn load(&self) {
        let Some(owner) = self.inner.ctx.current_user_id() else {
            self.inner.release_subscription();
            let mut state = self.inner.state.write().unwrap();
            if state.phase != Phase::Disposed {
                state.reset();
            }
            return;
        };

        // The prior channel must go before fetching: a failed reload must not
        // keep another identity's subscription live.
        self.inner.release_subscription();

        {
            let mut state = self.inner.state.write().unwrap();
            if state.phase == Phase::Disposed {
                return;
            }
            state.phase = Phase::Loading;
        }

        let fetched = self
            .inner
            .ctx
            .remote()
            .fetch_owned(T::TABLE, &owner)
            .await
            .and_then(decode_rows::<T>);

        match fetched {
            Ok(records) => {
                {
                    let mut state = self.inner.state.write().unwrap();
                    if state.phase == Phase::Disposed {
                        return;
                    }
                    state.collection.replace_all(records);
                    state.recount();
                    state.phase = Phase::Ready;
                    state.error = None;
                }
                self.resubscribe(&owner).await;
            }
            Err(err) => {
                warn!(table = T::TABLE, error = %err, "initial load failed");
                let mut state = self.inner.state.write().unwrap();
                if state.phase == Phase::Disposed {
                    return;
                }
                state.collection.clear();
                state.counts = ActivityCounts::default();
                state.phase = Phase::Error;
                state.error = Some(err.to_string());
            }
        }
    }

    /// Re-run the initial load, fully replacing local state with server
    /// truth. The only operation that corrects local/server divergence.
    pub async fn refresh(&self) {
        self.load().await;
    }

    /// Create a record owned by the signed-in user. Local state is updated
    /// only after the backend confirms; there is no optimistic insert.
    pub async fn add(&self, draft: &T::Draft) -> Result<T, SyncError> {
        let owner = match self.inner.ctx.current_user_id() {
            Some(owner) => owner,
            None => {
                self.inner.record_error(&SyncError::AuthRequired);
                return Err(SyncError::AuthRequired);
            }
        };

        let result = match draft_row::<T>(draft, &owner) {
            Ok(row) => self
                .inner
                .ctx
                .remote()
                .insert_row(T::TABLE, row)
                .await
                .and_then(decode_row::<T>),
            Err(err) => Err(err),
        };

        match result {
            Ok(record) => {
                let mut state = self.inner.state.write().unwrap();
                if state.phase != Phase::Disposed {
                    if state.collection.apply(Change::Inserted {
                        record: record.clone(),
                    }) {
                        state.recount();
                    }
                    state.error = None;
                }
                Ok(record)
            }
            Err(err) => {
                warn!(table = T::TABLE, error = %err, "add failed");
                self.inner.record_error(&err);
                Err(err)
            }
        }
    }

    /// Patch a record, scoped to `(id, owner)` so another user's record can
    /// never be touched. `Ok(false)` means the target matched nothing, a
    /// benign no-op. On success the patch is merged into the local entry in
    /// place.
    pub async fn update(&self, id: &str, patch: &T::Patch) -> Result<bool, SyncError> {
        let owner = match self.inner.ctx.current_user_id() {
            Some(owner) => owner,
            None => {
                self.inner.record_error(&SyncError::AuthRequired);
                return Err(SyncError::AuthRequired);
            }
        };

        let row = match patch_row::<T>(patch) {
            Ok(row) => row,
            Err(err) => {
                self.inner.record_error(&err);
                return Err(err);
            }
        };

        let matcher = RowMatch::new(id, owner);
        match self
            .inner
            .ctx
            .remote()
            .update_rows(T::TABLE, &matcher, row.clone())
            .await
        {
            Ok(0) => {
                debug!(table = T::TABLE, id, "update matched nothing, ignoring");
                let mut state = self.inner.state.write().unwrap();
                if state.phase != Phase::Disposed {
                    state.error = None;
                }
                Ok(false)
            }
            Ok(_) => {
                let mut state = self.inner.state.write().unwrap();
                if state.phase != Phase::Disposed {
                    if let Some(current) = state.collection.get(id).cloned() {
                        match merge_patch(&current, &row) {
                            Ok(updated) => {
                                if state.collection.apply(Change::Updated { record: updated }) {
                                    state.recount();
                                }
                            }
                            Err(err) => {
                                // Keep the stale entry; the change event or a
                                // refresh will bring server truth.
                                warn!(table = T::TABLE, id, error = %err, "local patch merge failed");
                            }
                        }
                    }
                    state.error = None;
                }
                Ok(true)
            }
            Err(err) => {
                warn!(table = T::TABLE, id, error = %err, "update failed");
                self.inner.record_error(&err);
                Err(err)
            }
        }
    }

    /// Delete a record, scoped to `(id, owner)`. `Ok(false)` means the
    /// target matched nothing.
    pub async fn remove(&self, id: &str) -> Result<bool, SyncError> {
        let owner = match self.inner.ctx.current_user_id() {
            Some(owner) => owner,
            None => {
                self.inner.record_error(&SyncError::AuthRequired);
                return Err(SyncError::AuthRequired);
            }
        };

        let matcher = RowMatch::new(id, owner);
        match self
            .inner
            .ctx
            .remote()
            .delete_rows(T::TABLE, &matcher)
            .await
        {
            Ok(0) => {
                debug!(table = T::TABLE, id, "delete matched nothing, ignoring");
                let mut state = self.inner.state.write().unwrap();
                if state.phase != Phase::Disposed {
                    state.error = None;
                }
                Ok(false)
            }
            Ok(_) => {
                let mut state = self.inner.state.write().unwrap();
                if state.phase != Phase::Disposed {
                    if state.collection.apply(Change::Deleted { id: id.to_string() }) {
                        state.recount();
                    }
                    state.error = None;
                }
                Ok(true)
            }
            Err(err) => {
                warn!(table = T::TABLE, id, error = %err, "delete failed");
                self.inner.record_error(&err);
                Err(err)
            }
        }
    }

    /// Tear the store down: release the subscription synchronously so no
    /// further events are delivered. In-flight request results are discarded.
    pub fn dispose(&self) {
        {
            let mut state = self.inner.state.write().unwrap();
            state.phase = Phase::Disposed;
        }
        self.inner.release_subscription();
    }

    /// Open the per-user change channel, replacing any prior one. At most
    /// one handle is live per store instance.
    async fn resubscribe(&self, owner: &str) {
        self.inner.release_subscription();

        match self.inner.ctx.remote().subscribe(T::TABLE, owner).await {
            Ok(Subscription { handle, events }) => {
                {
                    let mut state = self.inner.state.write().unwrap();
                    if state.phase == Phase::Disposed {
                        handle.release();
                        return;
                    }
                    *self.inner.subscription.lock().unwrap() = Some(handle);
                }
                let pump = tokio::spawn(pump_changes(Arc::downgrade(&self.inner), events));
                if let Some(old) = self.inner.pump.lock().unwrap().replace(pump) {
                    old.abort();
                }
            }
            Err(err) => {
                // Loaded data stays usable; only liveness is lost until the
                // next refresh.
                warn!(table = T::TABLE, error = %err, "subscribe failed");
            }
        }
    }
}

/// Forwards channel events into the store. Holds only a weak reference, so a
/// dropped store stops its pump and late events are discarded.
async fn pump_changes<T: OwnedRecord>(
    inner: Weak<StoreInner<T>>,
    mut events: mpsc::Receiver<RowChange>,
) {
    while let Some(change) = events.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.apply_row_change(change);
    }
}
