use super::seed::{demo_profile, demo_resume};
use super::{KeyValueStore, StoreError};
use crate::model::{Profile, Resume};
use crate::session::SessionMode;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use sync_framework::{Backend, SyncEntity, SyncError};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

pub const RESUMES_KEY: &str = "resume-builder:resumes";
pub const DOCUMENT_INDEX_KEY: &str = "resume-builder:documents";
pub const PROFILES_KEY: &str = "resume-builder:profiles";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeCollection {
    #[serde(default)]
    pub resumes: Vec<Resume>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileCollection {
    #[serde(default)]
    pub profiles: Vec<Profile>,
    #[serde(default)]
    pub active_profile_id: Option<String>,
}

/// Lightweight listing row mirrored next to the resume collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentIndexEntry {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// How an entity type is laid out in the local key-value store.
pub trait StoredEntity: SyncEntity<Id = String> {
    type Collection: Serialize + DeserializeOwned + Default + Send + Sync;

    const STORAGE_KEY: &'static str;

    /// Key of the derived document index, for types that keep one.
    const INDEX_KEY: Option<&'static str> = None;

    fn items(collection: &Self::Collection) -> &Vec<Self>;
    fn items_mut(collection: &mut Self::Collection) -> &mut Vec<Self>;

    fn index_entry(&self) -> Option<DocumentIndexEntry> {
        None
    }

    fn validate_new(draft: &Self::Draft, existing: &[Self]) -> Result<(), SyncError>;
    fn validate_patch(&self, patch: &Self::Patch, existing: &[Self]) -> Result<(), SyncError>;

    /// Fix-ups after an item left the collection.
    fn on_removed(_collection: &mut Self::Collection, _id: &str) {}

    /// Fills an empty collection with demo content.
    fn seed(collection: &mut Self::Collection, now: DateTime<Utc>);
}

impl StoredEntity for Resume {
    type Collection = ResumeCollection;

    const STORAGE_KEY: &'static str = RESUMES_KEY;
    const INDEX_KEY: Option<&'static str> = Some(DOCUMENT_INDEX_KEY);

    fn items(collection: &ResumeCollection) -> &Vec<Self> {
        &collection.resumes
    }

    fn items_mut(collection: &mut ResumeCollection) -> &mut Vec<Self> {
        &mut collection.resumes
    }

    fn index_entry(&self) -> Option<DocumentIndexEntry> {
        Some(DocumentIndexEntry {
            id: self.id.clone(),
            title: self.title.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }

    fn validate_new(draft: &Self::Draft, existing: &[Self]) -> Result<(), SyncError> {
        require_non_empty("title", &draft.title)?;
        unique(
            "resume titled",
            &draft.title,
            None,
            existing.iter().map(|r| (r.id.as_str(), r.title.as_str())),
        )
    }

    fn validate_patch(&self, patch: &Self::Patch, existing: &[Self]) -> Result<(), SyncError> {
        match &patch.title {
            Some(title) => {
                require_non_empty("title", title)?;
                unique(
                    "resume titled",
                    title,
                    Some(&self.id),
                    existing.iter().map(|r| (r.id.as_str(), r.title.as_str())),
                )
            }
            None => Ok(()),
        }
    }

    fn seed(collection: &mut ResumeCollection, now: DateTime<Utc>) {
        collection.resumes.push(demo_resume(now));
    }
}

impl StoredEntity for Profile {
    type Collection = ProfileCollection;

    const STORAGE_KEY: &'static str = PROFILES_KEY;

    fn items(collection: &ProfileCollection) -> &Vec<Self> {
        &collection.profiles
    }

    fn items_mut(collection: &mut ProfileCollection) -> &mut Vec<Self> {
        &mut collection.profiles
    }

    fn validate_new(draft: &Self::Draft, existing: &[Self]) -> Result<(), SyncError> {
        require_non_empty("name", &draft.name)?;
        unique(
            "profile named",
            &draft.name,
            None,
            existing.iter().map(|p| (p.id.as_str(), p.name.as_str())),
        )
    }

    fn validate_patch(&self, patch: &Self::Patch, existing: &[Self]) -> Result<(), SyncError> {
        match &patch.name {
            Some(name) => {
                require_non_empty("name", name)?;
                unique(
                    "profile named",
                    name,
                    Some(&self.id),
                    existing.iter().map(|p| (p.id.as_str(), p.name.as_str())),
                )
            }
            None => Ok(()),
        }
    }

    fn on_removed(collection: &mut ProfileCollection, id: &str) {
        if collection.active_profile_id.as_deref() == Some(id) {
            collection.active_profile_id = None;
        }
    }

    fn seed(collection: &mut ProfileCollection, now: DateTime<Utc>) {
        let profile = demo_profile(now);
        collection.active_profile_id = Some(profile.id.clone());
        collection.profiles.push(profile);
    }
}

fn require_non_empty(field: &str, value: &str) -> Result<(), SyncError> {
    if value.trim().is_empty() {
        Err(SyncError::validation(field, format!("{field} must not be empty")))
    } else {
        Ok(())
    }
}

/// Case-insensitive uniqueness among `(id, label)` pairs, ignoring the item's own id.
fn unique<'a>(
    what: &str,
    label: &str,
    own_id: Option<&str>,
    mut existing: impl Iterator<Item = (&'a str, &'a str)>,
) -> Result<(), SyncError> {
    let label = label.trim();
    if existing.any(|(id, other)| Some(id) != own_id && other.trim().eq_ignore_ascii_case(label)) {
        Err(SyncError::Conflict(format!("a {what} '{label}' already exists")))
    } else {
        Ok(())
    }
}

/// Typed collection of one entity type in a [`KeyValueStore`].
///
/// The primary collection is the single source of truth. The document index (resumes
/// only) is derived from it: rewritten after every write and verified on read.
/// Writes are serialized by an internal lock so read-modify-write cycles never interleave.
pub struct LocalStore<T: StoredEntity> {
    kv: Arc<dyn KeyValueStore>,
    seeded: AtomicBool,
    write_lock: Mutex<()>,
    _entity: PhantomData<fn() -> T>,
}

impl<T: StoredEntity> LocalStore<T> {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            kv,
            seeded: AtomicBool::new(false),
            write_lock: Mutex::new(()),
            _entity: PhantomData,
        }
    }

    async fn load(&self) -> Result<T::Collection, SyncError> {
        match self.kv.get(T::STORAGE_KEY).await? {
            Some(raw) => serde_json::from_str(&raw).map_err(|source| {
                StoreError::Json {
                    key: T::STORAGE_KEY.to_string(),
                    source,
                }
                .into()
            }),
            None => Ok(T::Collection::default()),
        }
    }

    fn index_of(collection: &T::Collection) -> Vec<DocumentIndexEntry> {
        T::items(collection)
            .iter()
            .filter_map(T::index_entry)
            .collect()
    }

    async fn save(&self, collection: &T::Collection) -> Result<(), SyncError> {
        let raw = serde_json::to_string(collection).map_err(|source| StoreError::Json {
            key: T::STORAGE_KEY.to_string(),
            source,
        })?;
        self.kv.set(T::STORAGE_KEY, raw).await?;

        // The index is derived; a failed write here is repaired on the next read.
        if let Some(index_key) = T::INDEX_KEY {
            if let Err(e) = self.write_index(index_key, &Self::index_of(collection)).await {
                warn!(entity_type = T::KIND, key = index_key, error = %e, "Index write failed");
            }
        }
        Ok(())
    }

    async fn write_index(
        &self,
        index_key: &str,
        entries: &[DocumentIndexEntry],
    ) -> Result<(), StoreError> {
        let raw = serde_json::to_string(entries).map_err(|source| StoreError::Json {
            key: index_key.to_string(),
            source,
        })?;
        self.kv.set(index_key, raw).await
    }

    /// Returns the full collection. Demo sessions get demo content when the collection is
    /// empty, at most once per store; guest sessions never do.
    #[instrument(skip(self), fields(entity_type = T::KIND))]
    pub async fn get_all(&self, mode: SessionMode) -> Result<Vec<T>, SyncError> {
        if mode == SessionMode::Demo && !self.seeded.load(Ordering::SeqCst) {
            let _guard = self.write_lock.lock().await;
            let mut collection = self.load().await?;
            if T::items(&collection).is_empty() && !self.seeded.swap(true, Ordering::SeqCst) {
                T::seed(&mut collection, Utc::now());
                self.save(&collection).await?;
                info!(count = T::items(&collection).len(), "Seeded demo content");
            }
            return Ok(T::items(&collection).clone());
        }
        let collection = self.load().await?;
        Ok(T::items(&collection).clone())
    }

    /// Linear scan of the primary collection.
    pub async fn find_by_id(&self, id: &str) -> Result<T, SyncError> {
        let collection = self.load().await?;
        T::items(&collection)
            .iter()
            .find(|item| item.id() == id)
            .cloned()
            .ok_or_else(|| SyncError::NotFound(format!("{} {id}", T::KIND)))
    }

    #[instrument(skip(self, draft), fields(entity_type = T::KIND))]
    pub async fn create(&self, draft: T::Draft) -> Result<T, SyncError> {
        let _guard = self.write_lock.lock().await;
        let mut collection = self.load().await?;
        T::validate_new(&draft, T::items(&collection))?;

        let item = T::from_draft(T::new_id(), draft, Utc::now());
        T::items_mut(&mut collection).push(item.clone());
        self.save(&collection).await?;
        info!(id = %item.id(), "Created locally");
        Ok(item)
    }

    #[instrument(skip(self, patch), fields(entity_type = T::KIND))]
    pub async fn update(&self, id: &str, patch: &T::Patch) -> Result<T, SyncError> {
        let _guard = self.write_lock.lock().await;
        let mut collection = self.load().await?;
        let index = T::items(&collection)
            .iter()
            .position(|item| item.id() == id)
            .ok_or_else(|| SyncError::NotFound(format!("{} {id}", T::KIND)))?;
        let current = &T::items(&collection)[index];
        current.validate_patch(patch, T::items(&collection))?;

        let mut next = current.apply_patch(patch);
        next.touch(Utc::now());
        T::items_mut(&mut collection)[index] = next.clone();
        self.save(&collection).await?;
        debug!("Updated locally");
        Ok(next)
    }

    #[instrument(skip(self), fields(entity_type = T::KIND))]
    pub async fn delete(&self, id: &str) -> Result<(), SyncError> {
        let _guard = self.write_lock.lock().await;
        let mut collection = self.load().await?;
        let items = T::items_mut(&mut collection);
        let index = items
            .iter()
            .position(|item| item.id() == id)
            .ok_or_else(|| SyncError::NotFound(format!("{} {id}", T::KIND)))?;
        items.remove(index);
        T::on_removed(&mut collection, id);
        self.save(&collection).await?;
        info!("Deleted locally");
        Ok(())
    }

    /// Reads the document index, rebuilding it from the primary collection when it is
    /// missing, unreadable or out of sync.
    pub async fn document_index(&self) -> Result<Vec<DocumentIndexEntry>, SyncError> {
        let Some(index_key) = T::INDEX_KEY else {
            return Ok(Vec::new());
        };
        let _guard = self.write_lock.lock().await;
        let expected = Self::index_of(&self.load().await?);

        let stored = self
            .kv
            .get(index_key)
            .await?
            .and_then(|raw| serde_json::from_str::<Vec<DocumentIndexEntry>>(&raw).ok());
        if stored.as_ref() != Some(&expected) {
            warn!(entity_type = T::KIND, key = index_key, "Document index out of sync, rebuilding");
            self.write_index(index_key, &expected).await?;
        }
        Ok(expected)
    }
}

impl LocalStore<Profile> {
    pub async fn active_profile_id(&self) -> Result<Option<String>, SyncError> {
        Ok(self.load().await?.active_profile_id)
    }

    pub async fn set_active_profile(&self, id: Option<&str>) -> Result<(), SyncError> {
        let _guard = self.write_lock.lock().await;
        let mut collection = self.load().await?;
        if let Some(id) = id {
            if !collection.profiles.iter().any(|p| p.id == id) {
                return Err(SyncError::NotFound(format!("profile {id}")));
            }
        }
        collection.active_profile_id = id.map(str::to_string);
        self.save(&collection).await
    }
}

/// A [`LocalStore`] bound to a session mode, usable wherever a [`Backend`] is expected.
pub struct LocalBackend<T: StoredEntity> {
    store: Arc<LocalStore<T>>,
    mode: SessionMode,
}

impl<T: StoredEntity> LocalBackend<T> {
    pub fn new(store: Arc<LocalStore<T>>, mode: SessionMode) -> Self {
        Self { store, mode }
    }
}

#[async_trait]
impl<T: StoredEntity> Backend<T> for LocalBackend<T> {
    async fn list(&self) -> Result<Vec<T>, SyncError> {
        self.store.get_all(self.mode).await
    }

    async fn get(&self, id: &String) -> Result<T, SyncError> {
        self.store.find_by_id(id).await
    }

    async fn create(&self, draft: T::Draft) -> Result<T, SyncError> {
        self.store.create(draft).await
    }

    async fn update(&self, id: &String, patch: T::Patch) -> Result<T, SyncError> {
        self.store.update(id, &patch).await
    }

    async fn delete(&self, id: &String) -> Result<(), SyncError> {
        self.store.delete(id).await
    }
}
