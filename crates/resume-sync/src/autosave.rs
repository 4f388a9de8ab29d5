//! # Autosave Scheduler
//!
//! Coalesces bursts of edits to one document into a single coordinator update.
//!
//! Per id the scheduler keeps a pending patch (every edit since the last flush, merged
//! last-write-wins), the patches of batches still in flight, a debounce timer, and a base:
//! the cache entry as last confirmed by the backend, before any unsaved edit.
//! Each [`AutosaveScheduler::schedule`] call:
//!
//! 1. drops the edit if its serialized form equals the previous one,
//! 2. mirrors it into the live cache immediately (live preview),
//! 3. merges it into the pending patch and restarts the debounce timer.
//!
//! When the timer fires the batch is flushed through
//! [`MutationCoordinator::update`](crate::coordinator::MutationCoordinator::update). On
//! success the save indicator goes visible, then fading, then hidden. On failure the live
//! cache is rebuilt from the base plus every edit that is still unsettled (other batches in
//! flight, the pending batch), so the failed edit disappears and nothing else does. The
//! error lands in the id's [`SaveStatus`] and the dedupe key is cleared.
//!
//! [`AutosaveScheduler::dispose`] cancels every timer for an id. Nothing the scheduler owns
//! writes to the cache or the status after that.

use crate::coordinator::MutationCoordinator;
use crate::session::SessionProvider;
use crate::sink::Operation;
use crate::store::StoredEntity;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use sync_framework::{EntrySnapshot, SyncError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct AutosaveConfig {
    pub debounce: Duration,
    pub fade_after: Duration,
    pub hide_after_fade: Duration,
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(1000),
            fade_after: Duration::from_millis(2500),
            hide_after_fade: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SaveIndicator {
    #[default]
    Hidden,
    Visible,
    Fading,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SaveStatus {
    pub saving: bool,
    pub indicator: SaveIndicator,
    pub last_saved: Option<DateTime<Utc>>,
    pub last_error: Option<SyncError>,
}

struct Slot<T: StoredEntity> {
    generation: u64,
    pending: Option<T::Patch>,
    in_flight: Vec<(u64, T::Patch)>,
    next_batch: u64,
    base: Option<EntrySnapshot<T>>,
    last_key: Option<String>,
    debounce: Option<JoinHandle<()>>,
    fade: Option<JoinHandle<()>>,
    status: watch::Sender<SaveStatus>,
}

impl<T: StoredEntity> Slot<T> {
    fn new(generation: u64) -> Self {
        let (status, _) = watch::channel(SaveStatus::default());
        Self {
            generation,
            pending: None,
            in_flight: Vec::new(),
            next_batch: 0,
            base: None,
            last_key: None,
            debounce: None,
            fade: None,
            status,
        }
    }

    fn cancel_timers(&mut self) {
        if let Some(timer) = self.debounce.take() {
            timer.abort();
        }
        if let Some(timer) = self.fade.take() {
            timer.abort();
        }
    }

    fn is_settled(&self) -> bool {
        self.pending.is_none() && self.in_flight.is_empty()
    }
}

struct Inner<T: StoredEntity> {
    coordinator: MutationCoordinator<T>,
    session: Arc<dyn SessionProvider>,
    config: AutosaveConfig,
    slots: Mutex<HashMap<String, Slot<T>>>,
    generations: AtomicU64,
}

pub struct AutosaveScheduler<T: StoredEntity> {
    inner: Arc<Inner<T>>,
}

impl<T: StoredEntity> Clone for AutosaveScheduler<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: StoredEntity> Inner<T> {
    fn slots(&self) -> MutexGuard<'_, HashMap<String, Slot<T>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn slot<'a>(&self, slots: &'a mut HashMap<String, Slot<T>>, id: &str) -> &'a mut Slot<T> {
        slots
            .entry(id.to_string())
            .or_insert_with(|| Slot::new(self.generations.fetch_add(1, Ordering::Relaxed)))
    }

    fn start_debounce(self: &Arc<Self>, id: String, generation: u64) -> JoinHandle<()> {
        let inner = Arc::clone(self);
        let delay = self.config.debounce;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            inner.flush(id, generation).await;
        })
    }

    fn start_fade(self: &Arc<Self>, id: String, generation: u64) -> JoinHandle<()> {
        let inner = Arc::clone(self);
        let (fade_after, hide_after) = (self.config.fade_after, self.config.hide_after_fade);
        tokio::spawn(async move {
            tokio::time::sleep(fade_after).await;
            if !inner.set_indicator(&id, generation, SaveIndicator::Fading) {
                return;
            }
            tokio::time::sleep(hide_after).await;
            inner.set_indicator(&id, generation, SaveIndicator::Hidden);
        })
    }

    fn set_indicator(&self, id: &str, generation: u64, indicator: SaveIndicator) -> bool {
        let slots = self.slots();
        match slots.get(id) {
            Some(slot) if slot.generation == generation => {
                slot.status.send_modify(|status| status.indicator = indicator);
                true
            }
            _ => false,
        }
    }

    /// Sends the pending batch, if any. Every step after the await re-checks that the slot
    /// is still the one that started the flush.
    async fn flush(self: Arc<Self>, id: String, generation: u64) {
        let (patch, batch) = {
            let mut slots = self.slots();
            let Some(slot) = slots.get_mut(&id) else {
                return;
            };
            if slot.generation != generation {
                return;
            }
            // Detach: later edits must not abort a write already on its way.
            slot.debounce = None;
            let Some(patch) = slot.pending.take() else {
                return;
            };
            let batch = slot.next_batch;
            slot.next_batch += 1;
            slot.in_flight.push((batch, patch.clone()));
            slot.status.send_modify(|status| status.saving = true);
            (patch, batch)
        };

        let mode = self.session.mode();
        debug!(entity_type = T::KIND, %id, %mode, "Flushing autosave batch");
        let result = self
            .coordinator
            .update_as(mode, id.clone(), patch, Operation::Autosave)
            .await;

        let mut slots = self.slots();
        let Some(slot) = slots.get_mut(&id) else {
            debug!(entity_type = T::KIND, %id, "Autosave settled after dispose");
            return;
        };
        if slot.generation != generation {
            return;
        }
        slot.in_flight.retain(|(n, _)| *n != batch);
        match result {
            Ok(saved) => {
                slot.base = if slot.is_settled() {
                    None
                } else {
                    // Later edits now roll back to what this batch stored.
                    slot.base.take().map(|base| EntrySnapshot {
                        list_entry: base.list_entry.map(|_| saved.clone()),
                        entity: Some(saved),
                    })
                };
                slot.status.send_modify(|status| {
                    status.saving = false;
                    status.indicator = SaveIndicator::Visible;
                    status.last_saved = Some(Utc::now());
                    status.last_error = None;
                });
                if let Some(timer) = slot.fade.take() {
                    timer.abort();
                }
                slot.fade = Some(self.start_fade(id.clone(), generation));
                info!(entity_type = T::KIND, %id, "Autosaved");
            }
            Err(e) => {
                let cache = self.coordinator.cache();
                if let Some(base) = &slot.base {
                    cache.restore(&id, base.clone());
                    for (_, unsettled) in &slot.in_flight {
                        cache.apply_patch(&id, unsettled);
                    }
                    if let Some(newer) = &slot.pending {
                        cache.apply_patch(&id, newer);
                    }
                }
                if slot.is_settled() {
                    slot.base = None;
                }
                slot.last_key = None;
                slot.status.send_modify(|status| {
                    status.saving = false;
                    status.last_error = Some(e.clone());
                });
                warn!(entity_type = T::KIND, %id, error = %e, "Autosave failed, edit reverted");
            }
        }
    }
}

impl<T: StoredEntity> AutosaveScheduler<T> {
    pub fn new(
        coordinator: MutationCoordinator<T>,
        session: Arc<dyn SessionProvider>,
        config: AutosaveConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                coordinator,
                session,
                config,
                slots: Mutex::new(HashMap::new()),
                generations: AtomicU64::new(0),
            }),
        }
    }

    /// Queues an edit. Returns `false` when it repeats the previous edit and was dropped.
    pub fn schedule(&self, id: &str, patch: T::Patch) -> bool {
        let key = match serde_json::to_string(&patch) {
            Ok(key) => Some(key),
            Err(e) => {
                warn!(entity_type = T::KIND, %id, error = %e, "Edit not serializable, dedupe skipped");
                None
            }
        };

        let inner = &self.inner;
        let mut slots = inner.slots();
        let slot = inner.slot(&mut slots, id);
        if key.is_some() && slot.last_key == key {
            debug!(entity_type = T::KIND, %id, "Duplicate edit ignored");
            return false;
        }
        slot.last_key = key;

        let cache = inner.coordinator.cache();
        let id_key = id.to_string();
        if slot.base.is_none() {
            slot.base = Some(cache.snapshot_entry(&id_key));
        }
        slot.pending = Some(match slot.pending.take() {
            Some(earlier) => T::merge_patches(earlier, patch.clone()),
            None => patch.clone(),
        });
        cache.apply_patch(&id_key, &patch);

        if let Some(timer) = slot.debounce.take() {
            timer.abort();
        }
        slot.debounce = Some(inner.start_debounce(id_key, slot.generation));
        true
    }

    /// Flushes the pending batch immediately instead of waiting for the timer.
    pub async fn flush_now(&self, id: &str) -> SaveStatus {
        let generation = {
            let mut slots = self.inner.slots();
            let slot = self.inner.slot(&mut slots, id);
            if let Some(timer) = slot.debounce.take() {
                timer.abort();
            }
            slot.generation
        };
        self.inner.clone().flush(id.to_string(), generation).await;
        self.status(id)
    }

    /// Flushes every id with pending edits.
    pub async fn flush_all(&self) {
        let ids: Vec<String> = self
            .inner
            .slots()
            .iter()
            .filter(|(_, slot)| slot.pending.is_some())
            .map(|(id, _)| id.clone())
            .collect();
        for id in ids {
            self.flush_now(&id).await;
        }
    }

    pub fn subscribe(&self, id: &str) -> watch::Receiver<SaveStatus> {
        let mut slots = self.inner.slots();
        self.inner.slot(&mut slots, id).status.subscribe()
    }

    pub fn status(&self, id: &str) -> SaveStatus {
        self.inner
            .slots()
            .get(id)
            .map(|slot| slot.status.borrow().clone())
            .unwrap_or_default()
    }

    pub fn has_pending(&self, id: &str) -> bool {
        self.inner
            .slots()
            .get(id)
            .is_some_and(|slot| slot.pending.is_some())
    }

    /// Cancels all timers for the id and drops its unsent edits.
    pub fn dispose(&self, id: &str) {
        if let Some(mut slot) = self.inner.slots().remove(id) {
            slot.cancel_timers();
            if slot.pending.is_some() {
                debug!(entity_type = T::KIND, %id, "Disposed with unsent edits");
            }
        }
    }

    pub fn dispose_all(&self) {
        for (_, mut slot) in self.inner.slots().drain() {
            slot.cancel_timers();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::CoordinatorConfig;
    use crate::model::{ContentPatch, PersonalInfoPatch, Resume, ResumeDraft, ResumePatch};
    use crate::router::BackendRouter;
    use crate::session::{SessionMode, StaticSession};
    use crate::sink::TracingSink;
    use crate::store::{LocalStore, MemoryStore};
    use sync_framework::mock::MockBackend;
    use sync_framework::{QueryCache, RequestKind, SyncEntity};
    use tokio::time::{sleep, Instant};

    struct Fixture {
        mock: MockBackend<Resume>,
        autosave: AutosaveScheduler<Resume>,
        cache: Arc<QueryCache<Resume>>,
        original: Resume,
    }

    fn fixture() -> Fixture {
        let mock = MockBackend::<Resume>::new();
        let router = BackendRouter::new(
            Arc::new(mock.backend()),
            Arc::new(LocalStore::new(Arc::new(MemoryStore::new()))),
        );
        let cache = Arc::new(QueryCache::new());
        let coordinator = MutationCoordinator::new(
            router,
            cache.clone(),
            Arc::new(TracingSink),
            CoordinatorConfig {
                revalidate_after: None,
            },
        );
        let original = Resume::from_draft("r-1".into(), ResumeDraft::titled("T"), Utc::now());
        cache.set(original.clone());
        let autosave = AutosaveScheduler::new(
            coordinator,
            Arc::new(StaticSession::new(SessionMode::Authenticated)),
            AutosaveConfig::default(),
        );
        Fixture {
            mock,
            autosave,
            cache,
            original,
        }
    }

    fn name(value: &str) -> ResumePatch {
        ResumePatch::content(ContentPatch {
            personal_info: Some(PersonalInfoPatch {
                name: Some(value.into()),
                ..Default::default()
            }),
            ..Default::default()
        })
    }

    fn summary(value: &str) -> ResumePatch {
        ResumePatch::content(ContentPatch {
            personal_info: Some(PersonalInfoPatch {
                summary: Some(value.into()),
                ..Default::default()
            }),
            ..Default::default()
        })
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn cached(f: &Fixture) -> Resume {
        f.cache.get(&"r-1".to_string()).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_flushes_once_after_last_edit() {
        let f = fixture();
        let merged = f
            .original
            .apply_patch(&name("A"))
            .apply_patch(&ResumePatch::title("T2"))
            .apply_patch(&summary("S"));
        f.mock.expect_update("r-1".into()).return_ok(merged.clone());

        let start = Instant::now();
        assert!(f.autosave.schedule("r-1", name("A")));
        sleep(ms(200)).await;
        assert!(f.autosave.schedule("r-1", ResumePatch::title("T2")));
        sleep(ms(200)).await;
        assert!(f.autosave.schedule("r-1", summary("S")));

        // Live preview before anything is persisted.
        assert_eq!(cached(&f), merged);

        sleep(ms(999)).await;
        assert_eq!(f.mock.count(RequestKind::Update), 0);
        sleep(ms(2)).await;
        assert_eq!(f.mock.count(RequestKind::Update), 1);

        let request = &f.mock.requests()[0];
        let at = request.at.duration_since(start);
        assert!(at >= ms(1400) && at < ms(1410), "flushed at {at:?}");
        let sent = request.patch.clone().unwrap();
        assert_eq!(f.original.apply_patch(&sent), merged);
        assert_eq!(sent.title.as_deref(), Some("T2"));

        sleep(ms(10)).await;
        let status = f.autosave.status("r-1");
        assert!(!status.saving);
        assert!(status.last_saved.is_some());
        f.mock.verify();
    }

    #[tokio::test(start_paused = true)]
    async fn test_identical_edits_are_deduplicated() {
        let f = fixture();
        let saved = f.original.apply_patch(&name("X"));
        f.mock.expect_update("r-1".into()).return_ok(saved);

        assert!(f.autosave.schedule("r-1", name("X")));
        assert!(!f.autosave.schedule("r-1", name("X")));
        sleep(ms(1500)).await;
        assert!(!f.autosave.schedule("r-1", name("X")));
        sleep(ms(1500)).await;

        assert_eq!(f.mock.count(RequestKind::Update), 1);
        f.mock.verify();
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_flush_reverts_live_cache() {
        let f = fixture();
        f.mock.expect_update("r-1".into()).return_err(SyncError::Server {
            status: 503,
            message: "unavailable".into(),
        });

        f.autosave.schedule("r-1", ResumePatch::title("Edited"));
        assert_eq!(cached(&f).title, "Edited");

        sleep(ms(1100)).await;
        assert_eq!(cached(&f), f.original);
        let status = f.autosave.status("r-1");
        assert!(!status.saving);
        assert!(matches!(status.last_error, Some(SyncError::Server { status: 503, .. })));
        assert_eq!(status.indicator, SaveIndicator::Hidden);

        // The same edit again is not suppressed.
        assert!(f.autosave.schedule("r-1", ResumePatch::title("Edited")));
        f.mock.verify();
    }

    #[tokio::test(start_paused = true)]
    async fn test_edits_during_failed_flush_survive_rollback() {
        let f = fixture();
        f.mock
            .expect_update("r-1".into())
            .delayed(ms(300))
            .return_err(SyncError::Network("reset".into()));
        let retried = f.original.apply_patch(&summary("later"));
        f.mock.expect_update("r-1".into()).return_ok(retried.clone());

        f.autosave.schedule("r-1", ResumePatch::title("Edited"));
        sleep(ms(1100)).await;
        // In flight: a newer edit arrives.
        f.autosave.schedule("r-1", summary("later"));
        sleep(ms(300)).await;

        let after_failure = cached(&f);
        assert_eq!(after_failure.title, "T");
        assert_eq!(after_failure.content.personal_info.summary, "later");
        assert!(f.autosave.has_pending("r-1"));

        sleep(ms(1000)).await;
        assert_eq!(f.mock.count(RequestKind::Update), 2);
        f.mock.verify();
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_failed_batches_revert_to_last_saved() {
        let f = fixture();
        f.mock
            .expect_update("r-1".into())
            .delayed(ms(1500))
            .return_err(SyncError::Network("reset".into()));
        f.mock
            .expect_update("r-1".into())
            .return_err(SyncError::Network("reset".into()));

        f.autosave.schedule("r-1", ResumePatch::title("A"));
        sleep(ms(1100)).await;
        // The first batch is in flight; this one flushes behind it.
        f.autosave.schedule("r-1", summary("B"));
        sleep(ms(2000)).await;

        assert_eq!(f.mock.count(RequestKind::Update), 2);
        assert_eq!(cached(&f), f.original);
        assert!(!f.autosave.has_pending("r-1"));
        assert!(f.autosave.status("r-1").last_error.is_some());
        f.mock.verify();
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_batch_keeps_later_saved_batch() {
        let f = fixture();
        let saved = f.original.apply_patch(&summary("B"));
        f.mock
            .expect_update("r-1".into())
            .delayed(ms(1500))
            .return_err(SyncError::Network("reset".into()));
        f.mock.expect_update("r-1".into()).return_ok(saved.clone());

        f.autosave.schedule("r-1", ResumePatch::title("A"));
        sleep(ms(1100)).await;
        f.autosave.schedule("r-1", summary("B"));
        sleep(ms(2000)).await;

        assert_eq!(f.mock.count(RequestKind::Update), 2);
        assert_eq!(cached(&f), saved);
        assert!(f.autosave.status("r-1").last_saved.is_some());
        f.mock.verify();
    }

    #[tokio::test(start_paused = true)]
    async fn test_indicator_fades_then_hides() {
        let f = fixture();
        f.mock
            .expect_update("r-1".into())
            .return_ok(f.original.apply_patch(&name("X")));
        let status = f.autosave.subscribe("r-1");

        f.autosave.schedule("r-1", name("X"));
        sleep(ms(1010)).await;
        assert_eq!(status.borrow().indicator, SaveIndicator::Visible);

        sleep(ms(2500)).await;
        assert_eq!(status.borrow().indicator, SaveIndicator::Fading);

        sleep(ms(500)).await;
        assert_eq!(status.borrow().indicator, SaveIndicator::Hidden);
        f.mock.verify();
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispose_cancels_everything() {
        let f = fixture();
        f.autosave.schedule("r-1", name("X"));
        let status = f.autosave.subscribe("r-1");
        f.autosave.dispose("r-1");

        sleep(ms(5000)).await;
        assert!(f.mock.requests().is_empty());
        assert!(status.has_changed().is_err());
        assert!(!f.autosave.has_pending("r-1"));
        f.mock.verify();
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispose_during_fade_stops_transitions() {
        let f = fixture();
        f.mock
            .expect_update("r-1".into())
            .return_ok(f.original.apply_patch(&name("X")));
        let status = f.autosave.subscribe("r-1");

        f.autosave.schedule("r-1", name("X"));
        sleep(ms(1010)).await;
        assert_eq!(status.borrow().indicator, SaveIndicator::Visible);
        f.autosave.dispose("r-1");

        sleep(ms(4000)).await;
        assert_eq!(status.borrow().indicator, SaveIndicator::Visible);
        f.mock.verify();
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_now_skips_the_wait() {
        let f = fixture();
        f.mock
            .expect_update("r-1".into())
            .return_ok(f.original.apply_patch(&name("X")));

        f.autosave.schedule("r-1", name("X"));
        let status = f.autosave.flush_now("r-1").await;
        assert!(status.last_saved.is_some());
        assert_eq!(f.mock.count(RequestKind::Update), 1);

        sleep(ms(2000)).await;
        assert_eq!(f.mock.count(RequestKind::Update), 1);
        f.mock.verify();
    }
}
