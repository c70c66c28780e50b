//! Aggregate dashboard view composed of four sub-resources.
//!
//! Unlike [`crate::store::RecordStore`], any change event on any subscribed
//! table triggers a full four-way refetch instead of an incremental merge.
//! Less efficient, but with four interdependent resources the
//! refetch-everything strategy is much simpler to reason about, and it is
//! kept that way deliberately.

use std::sync::{Arc, Mutex, RwLock, Weak};

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use unplug_api::{
    Achievement, AppNotification, Goal, NotificationPatch, OwnedRecord, RowChange, RowMatch,
    StatsSnapshot, Subscription, SubscriptionHandle, SyncError, decode_rows, patch_row,
};

use crate::context::SyncContext;
use crate::store::Phase;

const DASHBOARD_TABLES: [&str; 4] = [
    StatsSnapshot::TABLE,
    Achievement::TABLE,
    Goal::TABLE,
    AppNotification::TABLE,
];

/// Read-only dashboard view for the presentation layer.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardSnapshot {
    /// Most recent stats rollup, if any exist.
    pub stats: Option<StatsSnapshot>,
    pub achievements: Vec<Achievement>,
    pub goals: Vec<Goal>,
    pub notifications: Vec<AppNotification>,
    pub unread_notifications: usize,
    pub completed_goals: usize,
    pub is_loading: bool,
    pub error: Option<String>,
}

struct DashboardState {
    phase: Phase,
    stats: Option<StatsSnapshot>,
    achievements: Vec<Achievement>,
    goals: Vec<Goal>,
    notifications: Vec<AppNotification>,
    unread_notifications: usize,
    completed_goals: usize,
    error: Option<String>,
}

impl DashboardState {
    fn new() -> Self {
        Self {
            phase: Phase::Uninitialized,
            stats: None,
            achievements: Vec::new(),
            goals: Vec::new(),
            notifications: Vec::new(),
            unread_notifications: 0,
            completed_goals: 0,
            error: None,
        }
    }

    fn reset(&mut self) {
        *self = Self::new();
    }

    fn install(&mut self, parts: DashboardParts) {
        self.unread_notifications = parts.notifications.iter().filter(|n| !n.read).count();
        self.completed_goals = parts.goals.iter().filter(|g| g.completed).count();
        self.stats = parts.stats;
        self.achievements = parts.achievements;
        self.goals = parts.goals;
        self.notifications = parts.notifications;
    }
}

struct DashboardParts {
    stats: Option<StatsSnapshot>,
    achievements: Vec<Achievement>,
    goals: Vec<Goal>,
    notifications: Vec<AppNotification>,
}

struct DashboardInner {
    ctx: SyncContext,
    state: RwLock<DashboardState>,
    subscriptions: Mutex<Vec<SubscriptionHandle>>,
    pumps: Mutex<Vec<JoinHandle<()>>>,
}

impl DashboardInner {
    fn release_subscriptions(&self) {
        for handle in self.subscriptions.lock().unwrap().drain(..) {
            handle.release();
        }
        for pump in self.pumps.lock().unwrap().drain(..) {
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

    /// Fetch all four sub-resources concurrently. Ordering within each
    /// result set is creation descending, so the first stats row is the
    /// newest snapshot.
    async fn fetch_all(&self, owner: &str) -> Result<DashboardParts, SyncError> {
        let remote = self.ctx.remote();
        let (stats, achievements, goals, notifications) = tokio::join!(
            remote.fetch_owned(StatsSnapshot::TABLE, owner),
            remote.fetch_owned(Achievement::TABLE, owner),
            remote.fetch_owned(Goal::TABLE, owner),
            remote.fetch_owned(AppNotification::TABLE, owner),
        );

        Ok(DashboardParts {
            stats: decode_rows::<StatsSnapshot>(stats?)?.into_iter().next(),
            achievements: decode_rows(achievements?)?,
            goals: decode_rows(goals?)?,
            notifications: decode_rows(notifications?)?,
        })
    }

    /// Full refetch in response to a change event. Existing data stays on
    /// screen if the refetch fails; only the error field changes.
    async fn refetch(&self) {
        let Some(owner) = self.ctx.current_user_id() else {
            return;
        };

        match self.fetch_all(&owner).await {
            Ok(parts) => {
                let mut state = self.state.write().unwrap();
                if state.phase == Phase::Disposed {
                    return;
                }
                state.install(parts);
                state.error = None;
            }
            Err(err) => {
                warn!(error = %err, "dashboard refetch failed");
                self.record_error(&err);
            }
        }
    }
}

/// Composed live view of stats, achievements, goals, and notifications.
pub struct DashboardStore {
    inner: Arc<DashboardInner>,
}

impl DashboardStore {
    pub fn new(ctx: SyncContext) -> Self {
        Self {
            inner: Arc::new(DashboardInner {
                ctx,
                state: RwLock::new(DashboardState::new()),
                subscriptions: Mutex::new(Vec::new()),
                pumps: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn phase(&self) -> Phase {
        self.inner.state.read().unwrap().phase
    }

    pub fn snapshot(&self) -> DashboardSnapshot {
        let state = self.inner.state.read().unwrap();
        DashboardSnapshot {
            stats: state.stats.clone(),
            achievements: state.achievements.clone(),
            goals: state.goals.clone(),
            notifications: state.notifications.clone(),
            unread_notifications: state.unread_notifications,
            completed_goals: state.completed_goals,
            is_loading: state.phase == Phase::Loading,
            error: state.error.clone(),
        }
    }

    /// Fetch all sub-resources and open one subscription per table. With
    /// nobody signed in, reset to empty without issuing requests.
    pub async fn load(&self) {
        let Some(owner) = self.inner.ctx.current_user_id() else {
            self.inner.release_subscriptions();
            let mut state = self.inner.state.write().unwrap();
            if state.phase != Phase::Disposed {
                state.reset();
            }
            return;
        };

        // The prior channels must go before fetching: a failed reload must
        // not keep another identity's subscriptions live.
        self.inner.release_subscriptions();

        {
            let mut state = self.inner.state.write().unwrap();
            if state.phase == Phase::Disposed {
                return;
            }
            state.phase = Phase::Loading;
        }

        match self.inner.fetch_all(&owner).await {
            Ok(parts) => {
                {
                    let mut state = self.inner.state.write().unwrap();
                    if state.phase == Phase::Disposed {
                        return;
                    }
                    state.install(parts);
                    state.phase = Phase::Ready;
                    state.error = None;
                }
                self.resubscribe(&owner).await;
            }
            Err(err) => {
                warn!(error = %err, "dashboard load failed");
                let mut state = self.inner.state.write().unwrap();
                if state.phase == Phase::Disposed {
                    return;
                }
                state.reset();
                state.phase = Phase::Error;
                state.error = Some(err.to_string());
            }
        }
    }

    pub async fn refresh(&self) {
        self.load().await;
    }

    /// Mark one of the user's notifications as read. Scoped like every
    /// mutation, and followed by the dashboard's usual full refetch rather
    /// than an in-place merge.
    pub async fn mark_notification_read(&self, id: &str) -> Result<bool, SyncError> {
        let owner = match self.inner.ctx.current_user_id() {
            Some(owner) => owner,
            None => {
                self.inner.record_error(&SyncError::AuthRequired);
                return Err(SyncError::AuthRequired);
            }
        };

        let patch = patch_row::<AppNotification>(&NotificationPatch { read: Some(true) })?;
        let matcher = RowMatch::new(id, owner);
        match self
            .inner
            .ctx
            .remote()
            .update_rows(AppNotification::TABLE, &matcher, patch)
            .await
        {
            Ok(0) => {
                debug!(id, "notification to mark read matched nothing");
                Ok(false)
            }
            Ok(_) => {
                self.inner.refetch().await;
                Ok(true)
            }
            Err(err) => {
                warn!(id, error = %err, "mark notification read failed");
                self.inner.record_error(&err);
                Err(err)
            }
        }
    }

    pub fn dispose(&self) {
        {
            let mut state = self.inner.state.write().unwrap();
            state.phase = Phase::Disposed;
        }
        self.inner.release_subscriptions();
    }

    /// One subscription handle per sub-resource table, replacing any prior
    /// set.
    async fn resubscribe(&self, owner: &str) {
        self.inner.release_subscriptions();

        for table in DASHBOARD_TABLES {
            match self.inner.ctx.remote().subscribe(table, owner).await {
                Ok(Subscription { handle, events }) => {
                    {
                        let state = self.inner.state.read().unwrap();
                        if state.phase == Phase::Disposed {
                            handle.release();
                            return;
                        }
                    }
                    self.inner.subscriptions.lock().unwrap().push(handle);
                    let pump =
                        tokio::spawn(pump_refetch(Arc::downgrade(&self.inner), events, table));
                    self.inner.pumps.lock().unwrap().push(pump);
                }
                Err(err) => {
                    warn!(table, error = %err, "dashboard subscribe failed");
                }
            }
        }
    }
}

/// Any event on any sub-resource re-runs the full fetch; the payload itself
/// is never merged.
async fn pump_refetch(
    inner: Weak<DashboardInner>,
    mut events: mpsc::Receiver<RowChange>,
    table: &'static str,
) {
    while let Some(_change) = events.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        debug!(table, "dashboard change event, refetching all sub-resources");
        inner.refetch().await;
    }
}
