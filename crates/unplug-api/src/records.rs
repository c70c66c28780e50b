//! Typed record schemas, one per backend table.
//!
//! Rows arrive from the client as loose JSON objects and are validated into
//! these structs at the store boundary. Each record type carries a `Draft`
//! (insert input without server-assigned fields) and a `Patch` (partial
//! update where unset fields stay off the wire).

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::SyncError;
use crate::streaming::Row;

/// Column holding the record identifier.
pub const ID_COLUMN: &str = "id";
/// Column holding the owning-user identifier.
pub const OWNER_COLUMN: &str = "user_id";
/// Column holding the creation timestamp (RFC 3339).
pub const CREATED_AT_COLUMN: &str = "created_at";

/// One user-owned domain entity persisted remotely.
///
/// Identity is the `id`; merge equality for the synchronization engine is id
/// equality only.
pub trait OwnedRecord: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
    /// Backend table this record lives in.
    const TABLE: &'static str;

    /// Insert input: the domain fields, no server-assigned ones.
    type Draft: Serialize + Send + Sync;
    /// Partial update: every field optional, `None` skipped on the wire.
    type Patch: Serialize + Send + Sync;

    fn id(&self) -> &str;
    fn owner_id(&self) -> &str;
    fn created_at(&self) -> DateTime<Utc>;
}

/// Validate a wire row into a typed record.
pub fn decode_row<T: OwnedRecord>(row: Row) -> Result<T, SyncError> {
    serde_json::from_value(serde_json::Value::Object(row)).map_err(|e| {
        SyncError::invalid(format!("table {}: {}", T::TABLE, e))
    })
}

/// Validate a whole result set, failing on the first bad row.
pub fn decode_rows<T: OwnedRecord>(rows: Vec<Row>) -> Result<Vec<T>, SyncError> {
    rows.into_iter().map(decode_row).collect()
}

/// Serialize a draft into an insert row tagged with the owning user.
pub fn draft_row<T: OwnedRecord>(draft: &T::Draft, owner_id: &str) -> Result<Row, SyncError> {
    let mut row = to_object(serde_json::to_value(draft))?;
    row.insert(
        OWNER_COLUMN.to_string(),
        serde_json::Value::String(owner_id.to_string()),
    );
    Ok(row)
}

/// Serialize a patch into a wire row. Unset fields are absent, not null.
pub fn patch_row<T: OwnedRecord>(patch: &T::Patch) -> Result<Row, SyncError> {
    to_object(serde_json::to_value(patch))
}

/// Merge a patch row into a record the same way the backend does: field-wise
/// overwrite, then re-validate. Keeps the local copy equal to server truth
/// without a round trip.
pub fn merge_patch<T: OwnedRecord>(record: &T, patch: &Row) -> Result<T, SyncError> {
    let mut row = to_object(serde_json::to_value(record))?;
    for (key, value) in patch {
        row.insert(key.clone(), value.clone());
    }
    decode_row(row)
}

fn to_object(value: serde_json::Result<serde_json::Value>) -> Result<Row, SyncError> {
    match value.map_err(|e| SyncError::invalid(e.to_string()))? {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(SyncError::invalid(format!(
            "expected a JSON object, got {other}"
        ))),
    }
}

/// A logged mood/behavior reflection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealityCheck {
    pub id: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub title: String,
    pub mood: i32,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct NewRealityCheck {
    pub title: String,
    pub mood: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RealityCheckPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mood: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl OwnedRecord for RealityCheck {
    const TABLE: &'static str = "reality_checks";
    type Draft = NewRealityCheck;
    type Patch = RealityCheckPatch;

    fn id(&self) -> &str {
        &self.id
    }

    fn owner_id(&self) -> &str {
        &self.user_id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Screen-time stats rollup for one reporting period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub id: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub screen_time_minutes: i64,
    pub pickups: i64,
    pub focus_score: i32,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct NewStatsSnapshot {
    pub screen_time_minutes: i64,
    pub pickups: i64,
    pub focus_score: i32,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StatsSnapshotPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screen_time_minutes: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pickups: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focus_score: Option<i32>,
}

impl OwnedRecord for StatsSnapshot {
    const TABLE: &'static str = "stats_snapshots";
    type Draft = NewStatsSnapshot;
    type Patch = StatsSnapshotPatch;

    fn id(&self) -> &str {
        &self.id
    }

    fn owner_id(&self) -> &str {
        &self.user_id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Achievement {
    pub id: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub unlocked_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct NewAchievement {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AchievementPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unlocked_at: Option<DateTime<Utc>>,
}

impl OwnedRecord for Achievement {
    const TABLE: &'static str = "achievements";
    type Draft = NewAchievement;
    type Patch = AchievementPatch;

    fn id(&self) -> &str {
        &self.id
    }

    fn owner_id(&self) -> &str {
        &self.user_id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// A screen-time goal with progress tracked in minutes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    pub id: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub title: String,
    pub target_minutes: i64,
    pub progress_minutes: i64,
    pub completed: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct NewGoal {
    pub title: String,
    pub target_minutes: i64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GoalPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_minutes: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_minutes: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
}

impl OwnedRecord for Goal {
    const TABLE: &'static str = "goals";
    type Draft = NewGoal;
    type Patch = GoalPatch;

    fn id(&self) -> &str {
        &self.id
    }

    fn owner_id(&self) -> &str {
        &self.user_id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppNotification {
    pub id: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub read: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct NewNotification {
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct NotificationPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read: Option<bool>,
}

impl OwnedRecord for AppNotification {
    const TABLE: &'static str = "notifications";
    type Draft = NewNotification;
    type Patch = NotificationPatch;

    fn id(&self) -> &str {
        &self.id
    }

    fn owner_id(&self) -> &str {
        &self.user_id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}
