//! # Backend Router
//!
//! Picks the backend for one call. The mode is an argument, not a live read, so a session
//! transition during an in-flight operation cannot retarget it halfway.

use crate::session::{SessionMode, SessionProvider};
use crate::store::{LocalBackend, LocalStore, StoredEntity};
use std::sync::Arc;
use sync_framework::Backend;
use tracing::debug;

pub struct BackendRouter<T: StoredEntity> {
    remote: Arc<dyn Backend<T>>,
    local: Arc<LocalStore<T>>,
}

impl<T: StoredEntity> Clone for BackendRouter<T> {
    fn clone(&self) -> Self {
        Self {
            remote: self.remote.clone(),
            local: self.local.clone(),
        }
    }
}

impl<T: StoredEntity> BackendRouter<T> {
    pub fn new(remote: Arc<dyn Backend<T>>, local: Arc<LocalStore<T>>) -> Self {
        Self { remote, local }
    }

    /// Authenticated calls go to the remote API; guest and demo calls to the local store.
    pub fn route(&self, mode: SessionMode) -> Arc<dyn Backend<T>> {
        debug!(entity_type = T::KIND, %mode, "Routing request");
        match mode {
            SessionMode::Authenticated => self.remote.clone(),
            SessionMode::Guest | SessionMode::Demo => {
                Arc::new(LocalBackend::new(self.local.clone(), mode))
            }
        }
    }

    /// Reads the provider once and routes on the result.
    pub fn route_for(&self, session: &dyn SessionProvider) -> (SessionMode, Arc<dyn Backend<T>>) {
        let mode = session.mode();
        (mode, self.route(mode))
    }

    pub fn local(&self) -> &Arc<LocalStore<T>> {
        &self.local
    }
}
