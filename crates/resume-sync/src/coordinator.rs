//! # Mutation Coordinator
//!
//! Every create, update, delete and duplicate goes through here. Each follows a fixed
//! protocol against the shared [`QueryCache`]:
//!
//! - **Create**: dispatch, then append to the list slot, set the entity slot and mark the
//!   list for re-fetch.
//! - **Update**: snapshot both views of the id, apply the patch optimistically (cancelling
//!   in-flight reads), dispatch, then either write the server's entity through or restore
//!   the snapshot. A successful remote update schedules a delayed revalidation.
//! - **Delete**: cancel reads, drop the id from the list with a snapshot of the prior list,
//!   dispatch, drop the entity slot on settle, restore the list on failure. The list is
//!   re-fetched afterwards except in guest mode.
//!
//! Updates and deletes of one id run on that id's [`MutationLanes`] lane, so they never
//! interleave. Failures are rolled back, recorded in [`MutationState`] and reported to the
//! [`ErrorSink`]; they are also returned to the caller.

use crate::model::Resume;
use crate::router::BackendRouter;
use crate::session::SessionMode;
use crate::sink::{ErrorSink, FailureEvent, Operation};
use crate::store::StoredEntity;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use sync_framework::{MutationLanes, QueryCache, SyncError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Delay before re-fetching an entity after a successful remote update. `None`
    /// disables revalidation.
    pub revalidate_after: Option<Duration>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            revalidate_after: Some(Duration::from_millis(150)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MutationFailure {
    pub operation: Operation,
    pub id: Option<String>,
    pub error: SyncError,
}

/// Observable coordinator state. The last failure stays until [`MutationCoordinator::clear_error`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MutationState {
    pub pending: usize,
    pub last_error: Option<MutationFailure>,
}

struct Inner<T: StoredEntity> {
    router: BackendRouter<T>,
    cache: Arc<QueryCache<T>>,
    lanes: MutationLanes<String>,
    sink: Arc<dyn ErrorSink>,
    state: watch::Sender<MutationState>,
    revalidations: Mutex<HashMap<String, JoinHandle<()>>>,
    config: CoordinatorConfig,
}

/// Decrements the pending count when the operation settles, however it exits.
struct PendingGuard<'a>(&'a watch::Sender<MutationState>);

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.0
            .send_modify(|state| state.pending = state.pending.saturating_sub(1));
    }
}

pub struct MutationCoordinator<T: StoredEntity> {
    inner: Arc<Inner<T>>,
}

impl<T: StoredEntity> Clone for MutationCoordinator<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: StoredEntity> Inner<T> {
    fn begin(&self) -> PendingGuard<'_> {
        self.state.send_modify(|state| state.pending += 1);
        PendingGuard(&self.state)
    }

    fn fail(&self, operation: Operation, id: Option<String>, mode: SessionMode, error: &SyncError) {
        self.sink.report(FailureEvent::new(
            operation,
            T::KIND,
            id.clone(),
            mode,
            error,
        ));
        self.state.send_modify(|state| {
            state.last_error = Some(MutationFailure {
                operation,
                id,
                error: error.clone(),
            })
        });
    }

    fn revalidations(&self) -> MutexGuard<'_, HashMap<String, JoinHandle<()>>> {
        self.revalidations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn cancel_revalidation(&self, id: &str) {
        if let Some(handle) = self.revalidations().remove(id) {
            handle.abort();
        }
    }

    async fn update_in_lane(
        self: Arc<Self>,
        mode: SessionMode,
        id: String,
        patch: T::Patch,
        operation: Operation,
    ) -> Result<T, SyncError> {
        let _pending = self.begin();
        let snapshot = self.cache.snapshot_entry(&id);
        let optimistic = self.cache.apply_patch(&id, &patch);

        match self.router.route(mode).update(&id, patch).await {
            Ok(saved) => {
                // Keep a newer optimistic value if one landed while the request was out.
                let current = self.cache.get(&id);
                if current.is_none() || current == optimistic {
                    self.cache.write_through(saved.clone());
                } else {
                    debug!(entity_type = T::KIND, %id, "Newer local edit kept over response");
                }
                if !mode.is_local() {
                    self.schedule_revalidation(mode, id, saved.clone());
                }
                Ok(saved)
            }
            Err(e) => {
                self.cache.restore(&id, snapshot);
                warn!(entity_type = T::KIND, %id, error = %e, "Update failed, rolled back");
                self.fail(operation, Some(id), mode, &e);
                Err(e)
            }
        }
    }

    fn schedule_revalidation(self: &Arc<Self>, mode: SessionMode, id: String, saved: T) {
        let Some(delay) = self.config.revalidate_after else {
            return;
        };
        let inner = Arc::clone(self);
        let key = id.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if inner.cache.get(&id).as_ref() != Some(&saved) {
                debug!(entity_type = T::KIND, %id, "Skipping revalidation, cache moved on");
                return;
            }
            let ticket = inner.cache.begin_read(&id);
            match inner.router.route(mode).get(&id).await {
                Ok(fresh) => {
                    if inner.cache.finish_read(ticket, fresh) {
                        debug!(entity_type = T::KIND, %id, "Revalidated");
                    }
                }
                Err(e) => warn!(entity_type = T::KIND, %id, error = %e, "Revalidation failed"),
            }
        });
        if let Some(previous) = self.revalidations().insert(key, handle) {
            previous.abort();
        }
    }

    async fn delete_in_lane(&self, mode: SessionMode, id: String) -> Result<(), SyncError> {
        let _pending = self.begin();
        self.cancel_revalidation(&id);
        self.cache.cancel_reads(&id);
        let prior_list = self.cache.remove_from_list(&id);

        let result = self.router.route(mode).delete(&id).await;
        self.cache.remove(&id);
        if let Err(e) = &result {
            if let Some(items) = prior_list {
                self.cache.restore_list(items);
            }
            warn!(entity_type = T::KIND, %id, error = %e, "Delete failed, list restored");
            self.fail(Operation::Delete, Some(id), mode, e);
        }
        // Guest data has no remote copy to reconcile against.
        if mode != SessionMode::Guest {
            self.cache.invalidate_list();
        }
        result
    }
}

impl<T: StoredEntity> MutationCoordinator<T> {
    pub fn new(
        router: BackendRouter<T>,
        cache: Arc<QueryCache<T>>,
        sink: Arc<dyn ErrorSink>,
        config: CoordinatorConfig,
    ) -> Self {
        let (state, _) = watch::channel(MutationState::default());
        Self {
            inner: Arc::new(Inner {
                router,
                cache,
                lanes: MutationLanes::new(),
                sink,
                state,
                revalidations: Mutex::new(HashMap::new()),
                config,
            }),
        }
    }

    pub fn cache(&self) -> &Arc<QueryCache<T>> {
        &self.inner.cache
    }

    pub fn router(&self) -> &BackendRouter<T> {
        &self.inner.router
    }

    pub fn subscribe(&self) -> watch::Receiver<MutationState> {
        self.inner.state.subscribe()
    }

    pub fn state(&self) -> MutationState {
        self.inner.state.borrow().clone()
    }

    pub fn clear_error(&self) {
        self.inner.state.send_modify(|state| state.last_error = None);
    }

    /// Fetches the collection into the list slot. A result that raced an optimistic
    /// write is returned but not cached.
    #[instrument(skip(self), fields(entity_type = T::KIND))]
    pub async fn fetch_all(&self, mode: SessionMode) -> Result<Vec<T>, SyncError> {
        let ticket = self.inner.cache.begin_list_read();
        match self.inner.router.route(mode).list().await {
            Ok(items) => {
                self.inner.cache.finish_list_read(ticket, items.clone());
                Ok(items)
            }
            Err(e) => {
                self.inner.fail(Operation::Fetch, None, mode, &e);
                Err(e)
            }
        }
    }

    #[instrument(skip(self), fields(entity_type = T::KIND))]
    pub async fn fetch(&self, mode: SessionMode, id: &str) -> Result<T, SyncError> {
        let id = id.to_string();
        let ticket = self.inner.cache.begin_read(&id);
        match self.inner.router.route(mode).get(&id).await {
            Ok(entity) => {
                self.inner.cache.finish_read(ticket, entity.clone());
                Ok(entity)
            }
            Err(e) => {
                self.inner.fail(Operation::Fetch, Some(id), mode, &e);
                Err(e)
            }
        }
    }

    /// The cached list, re-fetched when missing or stale.
    pub async fn list(&self, mode: SessionMode) -> Result<Vec<T>, SyncError> {
        match self.inner.cache.list() {
            Some(items) if !self.inner.cache.is_list_stale() => Ok(items),
            _ => self.fetch_all(mode).await,
        }
    }

    /// The cached entity, re-fetched when missing or stale.
    pub async fn get(&self, mode: SessionMode, id: &str) -> Result<T, SyncError> {
        let key = id.to_string();
        match self.inner.cache.get(&key) {
            Some(entity) if !self.inner.cache.is_stale(&key) => Ok(entity),
            _ => self.fetch(mode, id).await,
        }
    }

    #[instrument(skip(self, draft), fields(entity_type = T::KIND))]
    pub async fn create(&self, mode: SessionMode, draft: T::Draft) -> Result<T, SyncError> {
        self.create_as(mode, draft, Operation::Create).await
    }

    async fn create_as(
        &self,
        mode: SessionMode,
        draft: T::Draft,
        operation: Operation,
    ) -> Result<T, SyncError> {
        let inner = &self.inner;
        let _pending = inner.begin();
        match inner.router.route(mode).create(draft).await {
            Ok(created) => {
                inner.cache.append_to_list(created.clone());
                inner.cache.set(created.clone());
                inner.cache.invalidate_list();
                info!(id = %created.id(), %mode, "{operation} settled");
                Ok(created)
            }
            Err(e) => {
                inner.fail(operation, None, mode, &e);
                Err(e)
            }
        }
    }

    #[instrument(skip(self, patch), fields(entity_type = T::KIND))]
    pub async fn update(
        &self,
        mode: SessionMode,
        id: String,
        patch: T::Patch,
    ) -> Result<T, SyncError> {
        self.update_as(mode, id, patch, Operation::Update).await
    }

    /// Same as [`update`](Self::update); failures are reported under `operation`.
    pub async fn update_as(
        &self,
        mode: SessionMode,
        id: String,
        patch: T::Patch,
        operation: Operation,
    ) -> Result<T, SyncError> {
        let inner = self.inner.clone();
        self.inner
            .lanes
            .run(id.clone(), inner.update_in_lane(mode, id, patch, operation))
            .await?
    }

    #[instrument(skip(self), fields(entity_type = T::KIND))]
    pub async fn delete(&self, mode: SessionMode, id: String) -> Result<(), SyncError> {
        let inner = self.inner.clone();
        let key = id.clone();
        let result = self
            .inner
            .lanes
            .run(key.clone(), async move { inner.delete_in_lane(mode, id).await })
            .await?;
        if result.is_ok() {
            self.inner.lanes.close(&key);
        }
        result
    }

    /// Cancels pending revalidations and retires every lane.
    pub fn shutdown(&self) {
        for (_, handle) in self.inner.revalidations().drain() {
            handle.abort();
        }
        self.inner.lanes.shutdown();
    }
}

impl MutationCoordinator<Resume> {
    /// Creates a copy titled `"<title> (Copy)"` through the create protocol.
    #[instrument(skip(self, resume), fields(source = %resume.id))]
    pub async fn duplicate(&self, mode: SessionMode, resume: &Resume) -> Result<Resume, SyncError> {
        self.create_as(mode, resume.duplicate_draft(), Operation::Duplicate)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ResumeDraft;
    use crate::model::ResumePatch;
    use crate::sink::ChannelSink;
    use crate::store::{LocalStore, MemoryStore};
    use chrono::Utc;
    use sync_framework::mock::MockBackend;
    use sync_framework::{RequestKind, SyncEntity};
    use tokio::sync::mpsc;
    use tokio::time::{sleep, Instant};

    const AUTH: SessionMode = SessionMode::Authenticated;

    struct Fixture {
        mock: MockBackend<Resume>,
        coordinator: MutationCoordinator<Resume>,
        failures: mpsc::Receiver<FailureEvent>,
    }

    fn fixture(config: CoordinatorConfig) -> Fixture {
        let mock = MockBackend::<Resume>::new();
        let router = BackendRouter::new(
            Arc::new(mock.backend()),
            Arc::new(LocalStore::new(Arc::new(MemoryStore::new()))),
        );
        let (sink, failures) = ChannelSink::new(16);
        let coordinator = MutationCoordinator::new(
            router,
            Arc::new(QueryCache::new()),
            Arc::new(sink),
            config,
        );
        Fixture {
            mock,
            coordinator,
            failures,
        }
    }

    fn no_revalidation() -> CoordinatorConfig {
        CoordinatorConfig {
            revalidate_after: None,
        }
    }

    fn resume(id: &str, title: &str) -> Resume {
        Resume::from_draft(id.into(), ResumeDraft::titled(title), Utc::now())
    }

    fn server_error() -> SyncError {
        SyncError::Server {
            status: 500,
            message: "boom".into(),
        }
    }

    #[tokio::test]
    async fn test_failed_update_restores_both_views() {
        let mut f = fixture(no_revalidation());
        let original = resume("r-1", "Original");
        f.mock.expect_list().return_ok(vec![original.clone()]);
        f.mock.expect_get("r-1".into()).return_ok(original.clone());
        f.mock.expect_update("r-1".into()).return_err(server_error());

        f.coordinator.fetch_all(AUTH).await.unwrap();
        f.coordinator.fetch(AUTH, "r-1").await.unwrap();
        let cache = f.coordinator.cache();
        let before = cache.get(&"r-1".to_string());

        let result = f
            .coordinator
            .update(AUTH, "r-1".into(), ResumePatch::title("Edited"))
            .await;
        assert!(matches!(result, Err(SyncError::Server { status: 500, .. })));
        assert_eq!(cache.get(&"r-1".to_string()), before);
        assert_eq!(cache.list_entry(&"r-1".to_string()), before);

        let state = f.coordinator.state();
        assert_eq!(state.pending, 0);
        let failure = state.last_error.unwrap();
        assert_eq!(failure.operation, Operation::Update);
        assert_eq!(failure.id.as_deref(), Some("r-1"));

        let event = f.failures.recv().await.unwrap();
        assert_eq!(event.entity_type, "resume");
        assert_eq!(event.status, Some(500));

        f.coordinator.clear_error();
        assert!(f.coordinator.state().last_error.is_none());
        f.mock.verify();
    }

    #[tokio::test]
    async fn test_successful_update_writes_through() {
        let f = fixture(no_revalidation());
        let original = resume("r-1", "Original");
        let mut saved = original.apply_patch(&ResumePatch::title("Edited"));
        saved.touch(Utc::now());
        f.mock.expect_list().return_ok(vec![original]);
        f.mock.expect_update("r-1".into()).return_ok(saved.clone());

        f.coordinator.fetch_all(AUTH).await.unwrap();
        let result = f
            .coordinator
            .update(AUTH, "r-1".into(), ResumePatch::title("Edited"))
            .await
            .unwrap();
        assert_eq!(result, saved);

        let cache = f.coordinator.cache();
        assert_eq!(cache.get(&"r-1".to_string()), Some(saved.clone()));
        assert_eq!(cache.list_entry(&"r-1".to_string()), Some(saved));
        f.mock.verify();
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_update_revalidates_after_delay() {
        let f = fixture(CoordinatorConfig::default());
        let original = resume("r-1", "Original");
        let saved = original.apply_patch(&ResumePatch::title("Edited"));
        let mut fresh = saved.clone();
        fresh.title = "Edited on server".into();
        f.mock.expect_update("r-1".into()).return_ok(saved.clone());
        f.mock.expect_get("r-1".into()).return_ok(fresh.clone());

        f.coordinator.cache().set(original);
        f.coordinator
            .update(AUTH, "r-1".into(), ResumePatch::title("Edited"))
            .await
            .unwrap();
        assert_eq!(f.mock.count(RequestKind::Get), 0);

        sleep(Duration::from_millis(100)).await;
        assert_eq!(f.mock.count(RequestKind::Get), 0);

        sleep(Duration::from_millis(100)).await;
        assert_eq!(f.mock.count(RequestKind::Get), 1);
        assert_eq!(f.coordinator.cache().get(&"r-1".to_string()), Some(fresh));
        f.mock.verify();
    }

    #[tokio::test(start_paused = true)]
    async fn test_updates_to_one_id_do_not_overlap() {
        let f = fixture(no_revalidation());
        let original = resume("r-1", "Original");
        f.mock
            .expect_update("r-1".into())
            .delayed(Duration::from_millis(100))
            .return_ok(original.apply_patch(&ResumePatch::title("A")));
        f.mock
            .expect_update("r-1".into())
            .return_ok(original.apply_patch(&ResumePatch::title("B")));

        let start = Instant::now();
        let first = f
            .coordinator
            .update(AUTH, "r-1".into(), ResumePatch::title("A"));
        let second = f
            .coordinator
            .update(AUTH, "r-1".into(), ResumePatch::title("B"));
        let (a, b) = tokio::join!(first, second);
        assert_eq!(a.unwrap().title, "A");
        assert_eq!(b.unwrap().title, "B");

        let requests = f.mock.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests[1].at.duration_since(start) >= Duration::from_millis(100));
        f.mock.verify();
    }

    #[tokio::test]
    async fn test_delete_removes_and_restores_on_failure() {
        let f = fixture(no_revalidation());
        let items = vec![resume("a", "A"), resume("b", "B"), resume("c", "C")];
        f.mock.expect_list().return_ok(items.clone());
        f.mock.expect_delete("b".into()).return_ok(());
        f.mock.expect_delete("a".into()).return_err(server_error());

        f.coordinator.fetch_all(AUTH).await.unwrap();
        f.coordinator.delete(AUTH, "b".into()).await.unwrap();
        let after: Vec<_> = f
            .coordinator
            .cache()
            .list()
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(after, vec!["a", "c"]);
        assert!(f.coordinator.cache().is_list_stale());

        let remaining = f.coordinator.cache().list().unwrap();
        assert!(f.coordinator.delete(AUTH, "a".into()).await.is_err());
        assert_eq!(f.coordinator.cache().list().unwrap(), remaining);
        assert_eq!(
            f.coordinator.state().last_error.unwrap().operation,
            Operation::Delete
        );
        f.mock.verify();
    }

    #[tokio::test]
    async fn test_delete_from_three_item_list_restores_original_order() {
        let f = fixture(no_revalidation());
        let items = vec![resume("a", "A"), resume("b", "B"), resume("c", "C")];
        f.mock.expect_list().return_ok(items.clone());
        f.mock.expect_delete("b".into()).return_err(server_error());

        f.coordinator.fetch_all(AUTH).await.unwrap();
        assert!(f.coordinator.delete(AUTH, "b".into()).await.is_err());
        assert_eq!(f.coordinator.cache().list(), Some(items));
        f.mock.verify();
    }

    #[tokio::test]
    async fn test_guest_delete_skips_list_invalidation() {
        let f = fixture(no_revalidation());
        let guest = SessionMode::Guest;
        let created = f
            .coordinator
            .create(guest, ResumeDraft::titled("Local"))
            .await
            .unwrap();
        f.coordinator.fetch_all(guest).await.unwrap();
        f.coordinator.delete(guest, created.id.clone()).await.unwrap();

        let cache = f.coordinator.cache();
        assert_eq!(cache.list(), Some(vec![]));
        assert!(!cache.is_list_stale());
        assert_eq!(cache.get(&created.id), None);
        assert!(f.mock.requests().is_empty());
    }

    #[tokio::test]
    async fn test_create_appends_and_marks_list_stale() {
        let f = fixture(no_revalidation());
        let existing = resume("a", "A");
        let created = resume("b", "B");
        f.mock.expect_list().return_ok(vec![existing.clone()]);
        f.mock.expect_create().return_ok(created.clone());

        f.coordinator.fetch_all(AUTH).await.unwrap();
        f.coordinator
            .create(AUTH, ResumeDraft::titled("B"))
            .await
            .unwrap();

        let cache = f.coordinator.cache();
        assert_eq!(cache.list(), Some(vec![existing, created.clone()]));
        assert_eq!(cache.get(&"b".to_string()), Some(created));
        assert!(cache.is_list_stale());
        f.mock.verify();
    }

    #[tokio::test]
    async fn test_duplicate_stacks_suffix_with_new_ids() {
        let f = fixture(no_revalidation());
        let guest = SessionMode::Guest;
        let original = f
            .coordinator
            .create(guest, ResumeDraft::titled("Resume"))
            .await
            .unwrap();
        let copy = f.coordinator.duplicate(guest, &original).await.unwrap();
        let copy_of_copy = f.coordinator.duplicate(guest, &copy).await.unwrap();

        assert_eq!(copy.title, "Resume (Copy)");
        assert_eq!(copy_of_copy.title, "Resume (Copy) (Copy)");
        assert_ne!(copy.id, original.id);
        assert_ne!(copy_of_copy.id, copy.id);
        assert_eq!(f.coordinator.list(guest).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_list_serves_fresh_cache_without_fetching() {
        let f = fixture(no_revalidation());
        f.mock.expect_list().return_ok(vec![resume("a", "A")]);

        f.coordinator.list(AUTH).await.unwrap();
        let again = f.coordinator.list(AUTH).await.unwrap();
        assert_eq!(again.len(), 1);
        assert_eq!(f.mock.count(RequestKind::List), 1);
        f.mock.verify();
    }
}
