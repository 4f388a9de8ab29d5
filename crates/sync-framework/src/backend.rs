//! # Backend Trait
//!
//! A `Backend<T>` is anything that can serve the REST-shaped surface of one document
//! collection: the channel client talking to a [`ResourceServer`](crate::ResourceServer),
//! an HTTP API, or a local persistent store. The coordinator only ever sees this trait,
//! which is what lets a router swap the target per call.

use crate::entity::SyncEntity;
use crate::error::SyncError;
use async_trait::async_trait;

#[async_trait]
pub trait Backend<T: SyncEntity>: Send + Sync {
    /// Fetch the full collection.
    async fn list(&self) -> Result<Vec<T>, SyncError>;

    /// Fetch one entity. Absence is [`SyncError::NotFound`], never an empty success.
    async fn get(&self, id: &T::Id) -> Result<T, SyncError>;

    /// Create an entity; the backend assigns the id and timestamps.
    async fn create(&self, draft: T::Draft) -> Result<T, SyncError>;

    /// Apply a partial update and return the persisted entity.
    async fn update(&self, id: &T::Id, patch: T::Patch) -> Result<T, SyncError>;

    async fn delete(&self, id: &T::Id) -> Result<(), SyncError>;
}
