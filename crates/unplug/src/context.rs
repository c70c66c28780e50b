//! Explicit dependency wiring for the synchronization engine.
//!
//! Stores receive a [`SyncContext`] holding the remote client and the auth
//! context instead of reaching into a global service registry. The
//! composition root (app shell, test harness) builds one context and hands it
//! to every store constructor.

use std::sync::{Arc, RwLock};

use unplug_api::{AuthProvider, RemoteClient};

/// Services a store needs: the backend client and the authentication context.
#[derive(Clone)]
pub struct SyncContext {
    remote: Arc<dyn RemoteClient>,
    auth: Arc<dyn AuthProvider>,
}

impl SyncContext {
    pub fn new(remote: Arc<dyn RemoteClient>, auth: Arc<dyn AuthProvider>) -> Self {
        Self { remote, auth }
    }

    pub fn remote(&self) -> &dyn RemoteClient {
        self.remote.as_ref()
    }

    pub fn current_user_id(&self) -> Option<String> {
        self.auth.current_user_id()
    }
}

/// Process-local auth session for development shells and tests.
///
/// The hosted backend's auth client satisfies [`AuthProvider`] directly; this
/// implementation just tracks a switchable signed-in user.
#[derive(Debug, Default)]
pub struct SessionAuth {
    user: RwLock<Option<String>>,
}

impl SessionAuth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signed_in(user_id: impl Into<String>) -> Self {
        Self {
            user: RwLock::new(Some(user_id.into())),
        }
    }

    pub fn sign_in(&self, user_id: impl Into<String>) {
        *self.user.write().unwrap() = Some(user_id.into());
    }

    pub fn sign_out(&self) {
        *self.user.write().unwrap() = None;
    }
}

impl AuthProvider for SessionAuth {
    fn current_user_id(&self) -> Option<String> {
        self.user.read().unwrap().clone()
    }
}
