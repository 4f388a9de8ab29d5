//! # System Lifecycle & Orchestration
//!
//! [`SyncSystem`] is the conductor: it builds every component from a [`SyncConfig`], wires
//! them together, and tears them down in order.
//!
//! ## Wiring
//!
//! 1. **Storage** - a [`FileStore`] when a data directory is configured, otherwise a
//!    [`MemoryStore`]. Both collections share it.
//! 2. **Remote** - an [`HttpBackend`] per collection when an API URL is configured,
//!    otherwise a spawned [`ResourceServer`] per collection standing in for the API.
//! 3. **Routing** - a [`BackendRouter`] per collection over the remote backend and the
//!    local store.
//! 4. **Caches** - one [`QueryCache`] per collection, hydrated from the last shutdown's
//!    snapshot.
//! 5. **Coordinators** and the resume [`AutosaveScheduler`].
//!
//! ## Session reads
//!
//! Every façade method reads the session provider exactly once and passes the resulting
//! [`SessionMode`] down. A sign-in that happens while a call is in flight affects the next
//! call, never the current one.
//!
//! ## Graceful Shutdown
//!
//! 1. Flush pending autosave batches, then cancel every timer.
//! 2. Persist cache snapshots to the key-value store.
//! 3. Drop the coordinators, which closes the resource servers' channels.
//! 4. Await the server tasks.

use crate::autosave::AutosaveScheduler;
use crate::config::SyncConfig;
use crate::coordinator::MutationCoordinator;
use crate::http::HttpBackend;
use crate::model::{
    ContentPatch, Profile, ProfileDraft, ProfileLink, ProfilePatch, Resume, ResumeDraft,
    ResumePatch,
};
use crate::resolver::resolve;
use crate::router::BackendRouter;
use crate::session::{SessionMode, SessionProvider};
use crate::sink::{ErrorSink, TracingSink};
use crate::store::{FileStore, KeyValueStore, LocalStore, MemoryStore, StoredEntity};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use sync_framework::{Backend, CacheSnapshot, QueryCache, ResourceServer, SyncError};
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

const SERVER_BUFFER: usize = 64;
const SERVER_STOP_TIMEOUT: Duration = Duration::from_secs(1);

/// Storage key of a collection's persisted cache snapshot.
pub fn cache_key<T: StoredEntity>() -> String {
    format!("resume-builder:query-cache:{}", T::COLLECTION)
}

pub struct SyncSystem {
    pub session: Arc<dyn SessionProvider>,
    pub resumes: MutationCoordinator<Resume>,
    pub profiles: MutationCoordinator<Profile>,
    pub autosave: AutosaveScheduler<Resume>,
    kv: Arc<dyn KeyValueStore>,
    handles: Vec<JoinHandle<()>>,
}

impl SyncSystem {
    pub async fn new(config: SyncConfig, session: Arc<dyn SessionProvider>) -> Result<Self> {
        Self::with_sink(config, session, Arc::new(TracingSink)).await
    }

    pub async fn with_sink(
        config: SyncConfig,
        session: Arc<dyn SessionProvider>,
        sink: Arc<dyn ErrorSink>,
    ) -> Result<Self> {
        let kv: Arc<dyn KeyValueStore> = match &config.data_dir {
            Some(dir) => Arc::new(
                FileStore::open(dir)
                    .await
                    .with_context(|| format!("cannot open data directory {}", dir.display()))?,
            ),
            None => Arc::new(MemoryStore::new()),
        };
        Self::with_store(config, session, kv, sink).await
    }

    /// Builds the system over a caller-supplied key-value store; `config.data_dir` is
    /// ignored.
    pub async fn with_store(
        config: SyncConfig,
        session: Arc<dyn SessionProvider>,
        kv: Arc<dyn KeyValueStore>,
        sink: Arc<dyn ErrorSink>,
    ) -> Result<Self> {
        let mut handles = Vec::new();
        let resume_remote = remote_backend::<Resume>(&config, &mut handles)?;
        let profile_remote = remote_backend::<Profile>(&config, &mut handles)?;

        let resumes = MutationCoordinator::new(
            BackendRouter::new(resume_remote, Arc::new(LocalStore::new(kv.clone()))),
            Arc::new(hydrated_cache::<Resume>(kv.as_ref()).await),
            sink.clone(),
            config.coordinator(),
        );
        let profiles = MutationCoordinator::new(
            BackendRouter::new(profile_remote, Arc::new(LocalStore::new(kv.clone()))),
            Arc::new(hydrated_cache::<Profile>(kv.as_ref()).await),
            sink,
            config.coordinator(),
        );
        let autosave = AutosaveScheduler::new(resumes.clone(), session.clone(), config.autosave());

        info!(
            mode = %session.mode(),
            remote = config.api_url.as_deref().unwrap_or("in-process"),
            "Sync system started"
        );
        Ok(Self {
            session,
            resumes,
            profiles,
            autosave,
            kv,
            handles,
        })
    }

    pub fn mode(&self) -> SessionMode {
        self.session.mode()
    }

    // ---------------------------------------------------------------------
    // Resumes
    // ---------------------------------------------------------------------

    pub async fn list_resumes(&self) -> Result<Vec<Resume>, SyncError> {
        self.resumes.list(self.mode()).await
    }

    pub async fn get_resume(&self, id: &str) -> Result<Resume, SyncError> {
        self.resumes.get(self.mode(), id).await
    }

    pub async fn create_resume(&self, draft: ResumeDraft) -> Result<Resume, SyncError> {
        self.resumes.create(self.mode(), draft).await
    }

    pub async fn update_resume(&self, id: &str, patch: ResumePatch) -> Result<Resume, SyncError> {
        self.resumes.update(self.mode(), id.to_string(), patch).await
    }

    /// Cancels any pending autosave for the resume before deleting it.
    pub async fn delete_resume(&self, id: &str) -> Result<(), SyncError> {
        self.autosave.dispose(id);
        self.resumes.delete(self.mode(), id.to_string()).await
    }

    pub async fn duplicate_resume(&self, id: &str) -> Result<Resume, SyncError> {
        let mode = self.mode();
        let source = self.resumes.get(mode, id).await?;
        self.resumes.duplicate(mode, &source).await
    }

    /// Live edit: visible in the cache at once, persisted after the debounce window.
    pub fn edit_resume(&self, id: &str, patch: ResumePatch) -> bool {
        self.autosave.schedule(id, patch)
    }

    // ---------------------------------------------------------------------
    // Profiles
    // ---------------------------------------------------------------------

    pub async fn list_profiles(&self) -> Result<Vec<Profile>, SyncError> {
        self.profiles.list(self.mode()).await
    }

    pub async fn get_profile(&self, id: &str) -> Result<Profile, SyncError> {
        self.profiles.get(self.mode(), id).await
    }

    pub async fn create_profile(&self, draft: ProfileDraft) -> Result<Profile, SyncError> {
        self.profiles.create(self.mode(), draft).await
    }

    pub async fn update_profile(
        &self,
        id: &str,
        patch: ProfilePatch,
    ) -> Result<Profile, SyncError> {
        self.profiles.update(self.mode(), id.to_string(), patch).await
    }

    pub async fn delete_profile(&self, id: &str) -> Result<(), SyncError> {
        self.profiles.delete(self.mode(), id.to_string()).await
    }

    // ---------------------------------------------------------------------
    // Profile-derived resumes
    // ---------------------------------------------------------------------

    /// Creates a resume whose content is resolved from a profile.
    #[instrument(skip(self, link), fields(profile_id = %link.profile_id))]
    pub async fn create_linked_resume(
        &self,
        title: &str,
        link: ProfileLink,
    ) -> Result<Resume, SyncError> {
        let mode = self.mode();
        let profile = self.profiles.get(mode, &link.profile_id).await?;
        let resolved = resolve(&profile, &link);
        let draft = ResumeDraft {
            title: title.to_string(),
            content: resolved.content,
            profile_link: Some(link),
        };
        self.resumes.create(mode, draft).await
    }

    /// Re-resolves a linked resume from its profile and persists the result when it
    /// changed.
    #[instrument(skip(self))]
    pub async fn refresh_from_profile(&self, resume_id: &str) -> Result<Resume, SyncError> {
        let mode = self.mode();
        let resume = self.resumes.get(mode, resume_id).await?;
        let Some(link) = resume.profile_link.clone() else {
            return Err(SyncError::validation(
                "profileLink",
                "resume is not linked to a profile",
            ));
        };
        let profile = self.profiles.get(mode, &link.profile_id).await?;
        let resolved = resolve(&profile, &link);
        if resolved.content == resume.content {
            return Ok(resume);
        }
        info!(resume_id, "Resume drifted from its profile, refreshing");
        self.resumes
            .update(
                mode,
                resume.id.clone(),
                ResumePatch::content(ContentPatch::replace_all(resolved.content)),
            )
            .await
    }

    /// Flushes pending edits, persists the caches and stops every background task.
    pub async fn shutdown(self) -> Result<()> {
        info!("Shutting down sync system");
        self.autosave.flush_all().await;
        self.autosave.dispose_all();
        self.resumes.shutdown();
        self.profiles.shutdown();

        persist_cache(self.kv.as_ref(), self.resumes.cache()).await?;
        persist_cache(self.kv.as_ref(), self.profiles.cache()).await?;

        let Self {
            session,
            resumes,
            profiles,
            autosave,
            kv,
            handles,
        } = self;
        drop((session, resumes, profiles, autosave, kv));

        for handle in handles {
            if tokio::time::timeout(SERVER_STOP_TIMEOUT, handle).await.is_err() {
                warn!("Resource server did not stop in time");
            }
        }
        info!("Sync system stopped");
        Ok(())
    }
}

fn remote_backend<T: StoredEntity>(
    config: &SyncConfig,
    handles: &mut Vec<JoinHandle<()>>,
) -> Result<Arc<dyn Backend<T>>> {
    match &config.api_url {
        Some(url) => {
            let backend =
                HttpBackend::<T>::new(url.as_str(), config.api_token.clone(), config.http_timeout)
                    .with_context(|| format!("cannot create {} client", T::KIND))?;
            Ok(Arc::new(backend))
        }
        None => {
            let (server, backend) = ResourceServer::<T>::new(SERVER_BUFFER);
            handles.push(tokio::spawn(server.run()));
            Ok(Arc::new(backend))
        }
    }
}

async fn hydrated_cache<T: StoredEntity>(kv: &dyn KeyValueStore) -> QueryCache<T> {
    let cache = QueryCache::new();
    let key = cache_key::<T>();
    match kv.get(&key).await {
        Ok(Some(raw)) => match serde_json::from_str::<CacheSnapshot<T>>(&raw) {
            Ok(snapshot) => {
                cache.hydrate(snapshot);
                info!(entity_type = T::KIND, "Cache restored from last session");
            }
            Err(e) => warn!(entity_type = T::KIND, error = %e, "Ignoring unreadable cache snapshot"),
        },
        Ok(None) => {}
        Err(e) => warn!(entity_type = T::KIND, error = %e, "Cache snapshot unavailable"),
    }
    cache
}

async fn persist_cache<T: StoredEntity>(kv: &dyn KeyValueStore, cache: &QueryCache<T>) -> Result<()> {
    let raw = serde_json::to_string(&cache.snapshot())
        .with_context(|| format!("cannot serialize {} cache", T::KIND))?;
    kv.set(&cache_key::<T>(), raw)
        .await
        .with_context(|| format!("cannot persist {} cache", T::KIND))
}
