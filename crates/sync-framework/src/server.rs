//! # Resource Server
//!
//! This module defines the `ResourceServer`, an actor that plays the part of a remote API
//! for one document collection. It processes messages sequentially and owns its store
//! exclusively, so no locking is needed.

use crate::client::ChannelBackend;
use crate::entity::SyncEntity;
use crate::error::SyncError;
use crate::message::BackendRequest;
use chrono::Utc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// The generic actor that serves a collection of entities.
///
/// # Architecture Note
/// This struct is the "Server" half of the actor. It owns the state (`store`) and
/// the receiver end of the channel. The "Client" half is a [`ChannelBackend`], which
/// implements [`Backend`](crate::Backend) and can be handed to anything that expects a
/// remote API.
///
/// **Concurrency Model**:
/// Each server processes its own messages *sequentially* in a loop. Requests from many
/// clients interleave only at message boundaries, exactly like a single-writer API.
///
/// # Usage Pattern
///
/// 1.  **Create**: Call `ResourceServer::new()` to get the `server` and its `backend`.
/// 2.  **Configure**: Optionally add simulated latency or seed records.
/// 3.  **Run**: Spawn `server.run()` in a background task.
///
/// # Operations
///
/// * **Create**: assigns `T::new_id()` and the current time, stores the entity and returns it.
/// * **Get / Update / Delete**: look the entity up by id; absence is `NotFound`.
/// * **Update**: applies the patch copy-on-write, then [`SyncEntity::touch`]es the result.
/// * **List**: returns every entity in creation order.
pub struct ResourceServer<T: SyncEntity> {
    receiver: mpsc::Receiver<BackendRequest<T>>,
    store: Vec<T>,
    latency: Option<Duration>,
}

impl<T: SyncEntity> ResourceServer<T> {
    /// Creates a new `ResourceServer` and the `ChannelBackend` that talks to it.
    ///
    /// # Arguments
    ///
    /// * `buffer_size` - The capacity of the MPSC channel. If the channel is full,
    ///   calls through the backend wait until there is space.
    pub fn new(buffer_size: usize) -> (Self, ChannelBackend<T>) {
        let (sender, receiver) = mpsc::channel(buffer_size);
        let server = Self {
            receiver,
            store: Vec::new(),
            latency: None,
        };
        (server, ChannelBackend::new(sender))
    }

    /// Delays every reply by `latency`, to make optimistic updates observable.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Seeds the store with existing records.
    pub fn with_records(mut self, records: impl IntoIterator<Item = T>) -> Self {
        self.store.extend(records);
        self
    }

    fn position(&self, id: &T::Id) -> Option<usize> {
        self.store.iter().position(|item| item.id() == id)
    }

    /// Runs the server's event loop, processing messages until every backend clone is dropped.
    pub async fn run(mut self) {
        let entity_type = T::KIND;
        info!(entity_type, size = self.store.len(), "Server started");

        while let Some(msg) = self.receiver.recv().await {
            if let Some(latency) = self.latency {
                tokio::time::sleep(latency).await;
            }

            match msg {
                BackendRequest::List { respond_to } => {
                    debug!(entity_type, size = self.store.len(), "List");
                    let _ = respond_to.send(Ok(self.store.clone()));
                }
                BackendRequest::Get { id, respond_to } => {
                    let result = match self.position(&id) {
                        Some(index) => Ok(self.store[index].clone()),
                        None => Err(SyncError::NotFound(id.to_string())),
                    };
                    debug!(entity_type, %id, found = result.is_ok(), "Get");
                    let _ = respond_to.send(result);
                }
                BackendRequest::Create { draft, respond_to } => {
                    debug!(entity_type, ?draft, "Create");
                    let item = T::from_draft(T::new_id(), draft, Utc::now());
                    self.store.push(item.clone());
                    info!(entity_type, id = %item.id(), size = self.store.len(), "Created");
                    let _ = respond_to.send(Ok(item));
                }
                BackendRequest::Update {
                    id,
                    patch,
                    respond_to,
                } => {
                    debug!(entity_type, %id, ?patch, "Update");
                    match self.position(&id) {
                        Some(index) => {
                            let mut next = self.store[index].apply_patch(&patch);
                            next.touch(Utc::now());
                            self.store[index] = next.clone();
                            info!(entity_type, %id, "Updated");
                            let _ = respond_to.send(Ok(next));
                        }
                        None => {
                            warn!(entity_type, %id, "Not found");
                            let _ = respond_to.send(Err(SyncError::NotFound(id.to_string())));
                        }
                    }
                }
                BackendRequest::Delete { id, respond_to } => {
                    debug!(entity_type, %id, "Delete");
                    match self.position(&id) {
                        Some(index) => {
                            self.store.remove(index);
                            info!(entity_type, %id, size = self.store.len(), "Deleted");
                            let _ = respond_to.send(Ok(()));
                        }
                        None => {
                            warn!(entity_type, %id, "Not found");
                            let _ = respond_to.send(Err(SyncError::NotFound(id.to_string())));
                        }
                    }
                }
            }
        }

        info!(entity_type, size = self.store.len(), "Shutdown");
    }
}
