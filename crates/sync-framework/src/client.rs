//! # Channel Backend
//!
//! This module defines the generic client for communicating with a resource server
//! over a Tokio channel.

use crate::backend::Backend;
use crate::entity::SyncEntity;
use crate::error::SyncError;
use crate::message::{BackendRequest, Response};
use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

/// ## ChannelBackend
///
/// The `ChannelBackend<T>` implements [`Backend`] by forwarding each call as a
/// [`BackendRequest<T>`] over a Tokio mpsc channel and awaiting the reply on a oneshot
/// channel. It holds only a sender, so cloning is cheap and clones can be shared across
/// tasks.
///
/// A closed request channel surfaces as [`SyncError::BackendClosed`]; a server that drops
/// the reply sender surfaces as [`SyncError::BackendDropped`].
#[derive(Clone)]
pub struct ChannelBackend<T: SyncEntity> {
    sender: mpsc::Sender<BackendRequest<T>>,
}

impl<T: SyncEntity> ChannelBackend<T> {
    pub fn new(sender: mpsc::Sender<BackendRequest<T>>) -> Self {
        Self { sender }
    }

    async fn request<R>(
        &self,
        build: impl FnOnce(Response<R>) -> BackendRequest<T>,
    ) -> Result<R, SyncError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(build(respond_to))
            .await
            .map_err(|_| SyncError::BackendClosed)?;
        response.await.map_err(|_| SyncError::BackendDropped)?
    }
}

#[async_trait]
impl<T: SyncEntity> Backend<T> for ChannelBackend<T> {
    async fn list(&self) -> Result<Vec<T>, SyncError> {
        self.request(|respond_to| BackendRequest::List { respond_to })
            .await
    }

    async fn get(&self, id: &T::Id) -> Result<T, SyncError> {
        let id = id.clone();
        self.request(|respond_to| BackendRequest::Get { id, respond_to })
            .await
    }

    async fn create(&self, draft: T::Draft) -> Result<T, SyncError> {
        self.request(|respond_to| BackendRequest::Create { draft, respond_to })
            .await
    }

    async fn update(&self, id: &T::Id, patch: T::Patch) -> Result<T, SyncError> {
        let id = id.clone();
        self.request(|respond_to| BackendRequest::Update {
            id,
            patch,
            respond_to,
        })
        .await
    }

    async fn delete(&self, id: &T::Id) -> Result<(), SyncError> {
        let id = id.clone();
        self.request(|respond_to| BackendRequest::Delete { id, respond_to })
            .await
    }
}
