//! # Local Persistence
//!
//! Guest and demo sessions have no remote API; their documents live in a key-value store
//! instead. This module has two layers:
//!
//! - [`KeyValueStore`]: string values under string keys, the shape of a browser-embedded
//!   store. [`MemoryStore`] keeps them in memory, [`FileStore`] writes one JSON file per key.
//! - [`LocalStore`]: typed collections (`{ "resumes": [...] }`, `{ "profiles": [...] }`) on
//!   top of a key-value store, with validation, demo seeding and the derived document index.
//!   [`LocalBackend`] exposes one as a [`Backend`](sync_framework::Backend).

mod file;
mod local;
mod memory;
mod seed;

pub use file::FileStore;
pub use local::{
    DocumentIndexEntry, LocalBackend, LocalStore, ProfileCollection, ResumeCollection,
    StoredEntity, DOCUMENT_INDEX_KEY, PROFILES_KEY, RESUMES_KEY,
};
pub use memory::MemoryStore;
pub use seed::{demo_profile, demo_resume, DEMO_PROFILE_ID, DEMO_RESUME_ID};

use async_trait::async_trait;
use sync_framework::SyncError;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage I/O failed for '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
    #[error("value under '{key}' is not valid JSON: {source}")]
    Json {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

impl From<StoreError> for SyncError {
    fn from(error: StoreError) -> Self {
        SyncError::Other(error.to_string())
    }
}

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn set(&self, key: &str, value: String) -> Result<(), StoreError>;
    async fn remove(&self, key: &str) -> Result<(), StoreError>;
}
