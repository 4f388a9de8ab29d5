//! Error-reporting sink: fire-and-forget structured failure events.
//!
//! Reporting never blocks a mutation. [`ChannelSink`] drops events when its consumer lags
//! instead of waiting for room.

use crate::session::SessionMode;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use sync_framework::SyncError;
use tokio::sync::mpsc;
use tracing::{error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    Fetch,
    Create,
    Update,
    Delete,
    Duplicate,
    Autosave,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::Fetch => "fetch",
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::Duplicate => "duplicate",
            Operation::Autosave => "autosave",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureEvent {
    pub operation: Operation,
    pub entity_type: &'static str,
    pub entity_id: Option<String>,
    pub mode: String,
    pub status: Option<u16>,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl FailureEvent {
    pub fn new(
        operation: Operation,
        entity_type: &'static str,
        entity_id: Option<String>,
        mode: SessionMode,
        error: &SyncError,
    ) -> Self {
        Self {
            operation,
            entity_type,
            entity_id,
            mode: mode.to_string(),
            status: error.status(),
            message: error.to_string(),
            at: Utc::now(),
        }
    }
}

pub trait ErrorSink: Send + Sync {
    /// Must return promptly.
    fn report(&self, event: FailureEvent);
}

/// Logs every failure at `error` level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ErrorSink for TracingSink {
    fn report(&self, event: FailureEvent) {
        error!(
            operation = %event.operation,
            entity_type = event.entity_type,
            id = ?event.entity_id,
            mode = %event.mode,
            status = ?event.status,
            "{}",
            event.message
        );
    }
}

/// Forwards failures to a bounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::Sender<FailureEvent>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<FailureEvent>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { sender }, receiver)
    }
}

impl ErrorSink for ChannelSink {
    fn report(&self, event: FailureEvent) {
        if let Err(e) = self.sender.try_send(event) {
            warn!(error = %e, "Dropped failure event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> FailureEvent {
        FailureEvent::new(
            Operation::Update,
            "resume",
            Some("r-1".into()),
            SessionMode::Authenticated,
            &SyncError::Server {
                status: 500,
                message: "boom".into(),
            },
        )
    }

    #[tokio::test]
    async fn test_channel_sink_never_blocks() {
        let (sink, mut receiver) = ChannelSink::new(1);
        sink.report(event());
        // Full: dropped, not awaited.
        sink.report(event());

        let received = receiver.recv().await.unwrap();
        assert_eq!(received.status, Some(500));
        assert_eq!(received.mode, "authenticated");
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn test_closed_channel_is_ignored() {
        let (sink, receiver) = ChannelSink::new(4);
        drop(receiver);
        sink.report(event());
    }
}
