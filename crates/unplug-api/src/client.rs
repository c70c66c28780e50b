//! Contract the hosted backend client satisfies.

use async_trait::async_trait;

use crate::error::SyncError;
use crate::streaming::{Row, RowMatch, Subscription};

/// Row-level access to the remote backend, treated as a black box.
///
/// All reads and writes cross this boundary as loose JSON rows; typed
/// validation happens above it. Implementations must scope `update_rows` and
/// `delete_rows` to the full [`RowMatch`] and deliver change events in commit
/// order per subscription channel.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// All rows owned by `owner_id`, ordered by creation descending.
    async fn fetch_owned(&self, table: &str, owner_id: &str) -> Result<Vec<Row>, SyncError>;

    /// Insert one row. Returns the stored row with server-assigned fields
    /// (`id`, `created_at`) filled in.
    async fn insert_row(&self, table: &str, row: Row) -> Result<Row, SyncError>;

    /// Patch rows matching `(id, owner_id)`. Returns the affected count;
    /// zero means the target does not exist or belongs to someone else.
    async fn update_rows(
        &self,
        table: &str,
        matcher: &RowMatch,
        patch: Row,
    ) -> Result<u64, SyncError>;

    /// Delete rows matching `(id, owner_id)`. Returns the affected count.
    async fn delete_rows(&self, table: &str, matcher: &RowMatch) -> Result<u64, SyncError>;

    /// Open a change-notification channel delivering events for rows owned
    /// by `owner_id`, in commit order, until the handle is released.
    async fn subscribe(&self, table: &str, owner_id: &str) -> Result<Subscription, SyncError>;
}

/// Authentication context exposed by the backend client.
pub trait AuthProvider: Send + Sync {
    /// Identifier of the signed-in user, if any.
    fn current_user_id(&self) -> Option<String>;
}
