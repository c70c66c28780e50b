//! Shared types for the unplug synchronization layer.
//!
//! This crate defines the contract between the synchronization engine and the
//! hosted backend client: typed record schemas per table, the change-event
//! union delivered by subscriptions, the row-level client trait, and the
//! error taxonomy surfaced to the presentation layer.

pub mod client;
pub mod error;
pub mod records;
pub mod streaming;

pub use client::{AuthProvider, RemoteClient};
pub use error::SyncError;
pub use records::{
    decode_row, decode_rows, draft_row, merge_patch, patch_row, Achievement, AchievementPatch,
    AppNotification, Goal, GoalPatch, NewAchievement, NewGoal, NewNotification, NewRealityCheck,
    NewStatsSnapshot, NotificationPatch, OwnedRecord, RealityCheck, RealityCheckPatch,
    StatsSnapshot, StatsSnapshotPatch, CREATED_AT_COLUMN, ID_COLUMN, OWNER_COLUMN,
};
pub use streaming::{
    Change, Row, RowChange, RowMatch, Subscription, SubscriptionHandle, SUBSCRIPTION_BUFFER,
};
