//! Error taxonomy for the synchronization layer.

use serde::{Deserialize, Serialize};

/// Structured errors surfaced by stores and the remote client.
///
/// These cross into presentation code, so they are cloneable and carry plain
/// messages instead of wrapped source errors, and all of them end up in the
/// snapshot's `error` field. A scoped update or delete that matches nothing
/// is not an error at all; stores report it as a benign `Ok(false)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum SyncError {
    /// A mutation was attempted with no signed-in user.
    #[error("sign-in required")]
    AuthRequired,

    /// The backend call failed: network, permission, or validation.
    #[error("remote request failed: {message}")]
    Remote { message: String },

    /// A row from the backend did not match the table's record schema.
    #[error("invalid record from backend: {message}")]
    InvalidRecord { message: String },
}

impl SyncError {
    pub fn remote(message: impl Into<String>) -> Self {
        Self::Remote {
            message: message.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidRecord {
            message: message.into(),
        }
    }
}
