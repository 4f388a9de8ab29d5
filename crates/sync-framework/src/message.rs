//! # Backend Messages
//!
//! This module defines the generic message types used for communication between
//! a [`ChannelBackend`](crate::ChannelBackend) and whatever serves its requests
//! (the in-memory [`ResourceServer`](crate::ResourceServer) or a test harness).

use crate::entity::SyncEntity;
use crate::error::SyncError;
use std::fmt;
use tokio::sync::oneshot;

/// Type alias for the one-shot response channel used by servers.
pub type Response<T> = oneshot::Sender<Result<T, SyncError>>;

/// Request sent over the channel. The variants map directly to the REST surface
/// every document collection exposes (list, read, create, partial update, delete).
#[derive(Debug)]
pub enum BackendRequest<T: SyncEntity> {
    List {
        respond_to: Response<Vec<T>>,
    },
    Get {
        id: T::Id,
        respond_to: Response<T>,
    },
    Create {
        draft: T::Draft,
        respond_to: Response<T>,
    },
    Update {
        id: T::Id,
        patch: T::Patch,
        respond_to: Response<T>,
    },
    Delete {
        id: T::Id,
        respond_to: Response<()>,
    },
}

/// Discriminant of a [`BackendRequest`], used for logging and mock expectations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    List,
    Get,
    Create,
    Update,
    Delete,
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RequestKind::List => "list",
            RequestKind::Get => "get",
            RequestKind::Create => "create",
            RequestKind::Update => "update",
            RequestKind::Delete => "delete",
        };
        f.write_str(name)
    }
}

impl<T: SyncEntity> BackendRequest<T> {
    pub fn kind(&self) -> RequestKind {
        match self {
            BackendRequest::List { .. } => RequestKind::List,
            BackendRequest::Get { .. } => RequestKind::Get,
            BackendRequest::Create { .. } => RequestKind::Create,
            BackendRequest::Update { .. } => RequestKind::Update,
            BackendRequest::Delete { .. } => RequestKind::Delete,
        }
    }

    /// The targeted entity, for requests addressing a single one.
    pub fn id(&self) -> Option<&T::Id> {
        match self {
            BackendRequest::Get { id, .. }
            | BackendRequest::Update { id, .. }
            | BackendRequest::Delete { id, .. } => Some(id),
            BackendRequest::List { .. } | BackendRequest::Create { .. } => None,
        }
    }
}
