//! # Sync Errors
//!
//! This module defines the error taxonomy shared by every backend, the cache machinery and
//! the domain layer. Remote failures are classified by HTTP status; local failures map onto
//! the same variants so callers never need to know which backend served a request.

use std::collections::BTreeMap;

/// Field-keyed validation messages (`{"title": ["must not be empty"]}`).
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// Errors that can occur while reading or writing synchronized entities.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SyncError {
    #[error("Validation failed on {} field(s)", .0.len())]
    Validation(FieldErrors),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Forbidden")]
    Forbidden,
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },
    #[error("Network error: {0}")]
    Network(String),
    #[error("Backend closed")]
    BackendClosed,
    #[error("Backend dropped response channel")]
    BackendDropped,
    #[error("{0}")]
    Other(String),
}

impl SyncError {
    /// Builds a single-field validation error.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut fields = FieldErrors::new();
        fields.insert(field.into(), vec![message.into()]);
        SyncError::Validation(fields)
    }

    /// Classifies a non-success HTTP status.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 => SyncError::Unauthorized,
            403 => SyncError::Forbidden,
            404 => SyncError::NotFound(message),
            409 => SyncError::Conflict(message),
            422 => SyncError::validation("_", message),
            500..=599 => SyncError::Server { status, message },
            _ => SyncError::Other(format!("HTTP {status}: {message}")),
        }
    }

    /// The HTTP status this error corresponds to, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            SyncError::Validation(_) => Some(422),
            SyncError::NotFound(_) => Some(404),
            SyncError::Unauthorized => Some(401),
            SyncError::Forbidden => Some(403),
            SyncError::Conflict(_) => Some(409),
            SyncError::Server { status, .. } => Some(*status),
            SyncError::Network(_)
            | SyncError::BackendClosed
            | SyncError::BackendDropped
            | SyncError::Other(_) => None,
        }
    }

    /// Transport-level failures where retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SyncError::Network(_)
                | SyncError::Server { .. }
                | SyncError::BackendClosed
                | SyncError::BackendDropped
        )
    }
}
