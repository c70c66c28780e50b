//! Client-side realtime synchronization engine for the unplug app.
//!
//! Each store maintains a locally-consistent, live view of one signed-in
//! user's records: an initial bulk fetch, a change-notification subscription
//! scoped to that user, incremental merges of incoming events, and derived
//! counts recomputed after every mutation. Remote failures never reach the
//! presentation layer as panics; they are logged and surfaced through the
//! snapshot's `error` field.
//!
//! Two synchronization strategies coexist on purpose:
//! - [`store::RecordStore`] merges change events incrementally into an
//!   ordered collection (per-record domains such as reality checks).
//! - [`dashboard::DashboardStore`] refetches all of its sub-resources on any
//!   change event (multi-resource composition, simpler to reason about).

pub mod aggregates;
pub mod collection;
pub mod context;
pub mod dashboard;
pub mod store;

pub use aggregates::ActivityCounts;
pub use collection::OrderedCollection;
pub use context::{SessionAuth, SyncContext};
pub use dashboard::{DashboardSnapshot, DashboardStore};
pub use store::{Phase, RecordStore, RealityCheckStore, StoreSnapshot};
