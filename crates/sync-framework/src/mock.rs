//! # Mock Backend & Testing Guide
//!
//! The `MockBackend<T>` type serves the same channel protocol as a
//! [`ResourceServer`](crate::ResourceServer), but answers from a queue of expectations
//! instead of a store. It lets you script replies (including errors and delays) for unit
//! tests of anything that talks to a [`Backend`](crate::Backend), and records every request
//! it received so tests can assert on what was actually sent.
//!
//! ## When to use Mocks vs a Real Server
//!
//! | Feature | MockBackend | ResourceServer |
//! |---------|-------------|----------------|
//! | **Speed** | Instant (in-memory) | Fast (but keeps real state) |
//! | **Determinism** | Scripted replies | Real state transitions |
//! | **Use Case** | Coordinator / autosave logic | End-to-end flows |
//! | **Error Injection** | Easy (`return_err`) | Not supported |
//! | **Timing** | `delayed(d)` per reply | One global latency |
//!
//! ## Testing Strategies
//!
//! **Pattern 0: Fluent expectations.** Queue replies in the order the code under test is
//! expected to call, run it, then `verify()`:
//!
//! ```rust,ignore
//! let mock = MockBackend::<Resume>::new();
//! mock.expect_update("r-1".to_string()).return_err(SyncError::Server { status: 500, message: "boom".into() });
//!
//! let result = coordinator.update(SessionMode::Authenticated, &id, patch).await;
//! assert!(result.is_err());
//! mock.verify();
//! ```
//!
//! **Pattern 1: Channel-level control.** When a test must hold a reply open while something
//! else happens (a stale read racing an optimistic write, say), use
//! [`create_mock_backend`] and answer requests by hand from the receiver.
//!
//! **Pattern 2: Full system.** Run a real [`ResourceServer`](crate::ResourceServer) and
//! assert on state. See `tests/integration_test.rs`.
//!
//! Unexpected requests are answered with [`SyncError::Other`] and recorded as mismatches;
//! `verify()` panics on any mismatch or unmet expectation.

use crate::client::ChannelBackend;
use crate::entity::SyncEntity;
use crate::error::SyncError;
use crate::message::{BackendRequest, RequestKind, Response};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

// =============================================================================
// EXPECTATION BUILDER API
// =============================================================================

enum Reply<T: SyncEntity> {
    List(Result<Vec<T>, SyncError>),
    Entity(Result<T, SyncError>),
    Unit(Result<(), SyncError>),
}

struct Expectation<T: SyncEntity> {
    kind: RequestKind,
    id: Option<T::Id>,
    delay: Option<Duration>,
    reply: Reply<T>,
}

/// A request as the mock received it.
#[derive(Debug, Clone)]
pub struct RecordedRequest<T: SyncEntity> {
    pub kind: RequestKind,
    pub id: Option<T::Id>,
    pub draft: Option<T::Draft>,
    pub patch: Option<T::Patch>,
    pub at: Instant,
}

struct Shared<T: SyncEntity> {
    expectations: VecDeque<Expectation<T>>,
    requests: Vec<RecordedRequest<T>>,
    mismatches: Vec<String>,
}

fn lock<T: SyncEntity>(shared: &Mutex<Shared<T>>) -> MutexGuard<'_, Shared<T>> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A mock backend with expectation tracking for fluent testing.
pub struct MockBackend<T: SyncEntity> {
    backend: ChannelBackend<T>,
    shared: Arc<Mutex<Shared<T>>>,
    _handle: tokio::task::JoinHandle<()>,
}

impl<T: SyncEntity> Default for MockBackend<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: SyncEntity> MockBackend<T> {
    /// Creates a new mock with no expectations. Must be called inside a Tokio runtime.
    pub fn new() -> Self {
        let (sender, mut receiver) = mpsc::channel::<BackendRequest<T>>(100);
        let shared = Arc::new(Mutex::new(Shared {
            expectations: VecDeque::new(),
            requests: Vec::new(),
            mismatches: Vec::new(),
        }));
        let shared_clone = shared.clone();

        // Spawn background task to handle requests
        let handle = tokio::spawn(async move {
            while let Some(request) = receiver.recv().await {
                let kind = request.kind();
                let id = request.id().cloned();
                let expectation = {
                    let mut state = lock(&shared_clone);
                    state.requests.push(record(&request));
                    let expectation = state.expectations.pop_front();
                    match &expectation {
                        Some(exp)
                            if exp.kind == kind
                                && exp.id.as_ref().map_or(true, |e| Some(e) == id.as_ref()) => {}
                        Some(exp) => state.mismatches.push(format!(
                            "expected {} {:?}, got {} {:?}",
                            exp.kind, exp.id, kind, id
                        )),
                        None => state
                            .mismatches
                            .push(format!("unexpected {kind} {id:?}")),
                    }
                    expectation
                };

                match expectation {
                    Some(exp) if exp.kind == kind => match exp.delay {
                        Some(delay) => {
                            tokio::spawn(async move {
                                tokio::time::sleep(delay).await;
                                respond(request, exp.reply);
                            });
                        }
                        None => respond(request, exp.reply),
                    },
                    _ => reject(request, format!("mock: unexpected {kind} request")),
                }
            }
        });

        Self {
            backend: ChannelBackend::new(sender),
            shared,
            _handle: handle,
        }
    }

    /// Returns the backend for the code under test.
    pub fn backend(&self) -> ChannelBackend<T> {
        self.backend.clone()
    }

    fn builder<R>(
        &self,
        kind: RequestKind,
        id: Option<T::Id>,
        wrap: fn(Result<R, SyncError>) -> Reply<T>,
    ) -> ExpectationBuilder<T, R> {
        ExpectationBuilder {
            kind,
            id,
            delay: None,
            wrap,
            shared: self.shared.clone(),
        }
    }

    pub fn expect_list(&self) -> ExpectationBuilder<T, Vec<T>> {
        self.builder(RequestKind::List, None, Reply::List)
    }

    pub fn expect_get(&self, id: T::Id) -> ExpectationBuilder<T, T> {
        self.builder(RequestKind::Get, Some(id), Reply::Entity)
    }

    pub fn expect_create(&self) -> ExpectationBuilder<T, T> {
        self.builder(RequestKind::Create, None, Reply::Entity)
    }

    pub fn expect_update(&self, id: T::Id) -> ExpectationBuilder<T, T> {
        self.builder(RequestKind::Update, Some(id), Reply::Entity)
    }

    pub fn expect_delete(&self, id: T::Id) -> ExpectationBuilder<T, ()> {
        self.builder(RequestKind::Delete, Some(id), Reply::Unit)
    }

    /// Every request received so far, in arrival order.
    pub fn requests(&self) -> Vec<RecordedRequest<T>> {
        lock(&self.shared).requests.clone()
    }

    /// Number of received requests of one kind.
    pub fn count(&self, kind: RequestKind) -> usize {
        lock(&self.shared)
            .requests
            .iter()
            .filter(|r| r.kind == kind)
            .count()
    }

    /// Verifies that all expectations were met and nothing unexpected arrived.
    pub fn verify(&self) {
        let state = lock(&self.shared);
        if !state.mismatches.is_empty() {
            panic!("Mock received unexpected requests: {:?}", state.mismatches);
        }
        if !state.expectations.is_empty() {
            panic!(
                "Not all expectations were met. {} remaining",
                state.expectations.len()
            );
        }
    }
}

/// Builder for one expected request.
pub struct ExpectationBuilder<T: SyncEntity, R> {
    kind: RequestKind,
    id: Option<T::Id>,
    delay: Option<Duration>,
    wrap: fn(Result<R, SyncError>) -> Reply<T>,
    shared: Arc<Mutex<Shared<T>>>,
}

impl<T: SyncEntity, R> ExpectationBuilder<T, R> {
    /// Holds the reply back for `delay` (measured on the Tokio clock).
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Sets the expectation to return a successful result.
    pub fn return_ok(self, value: R) {
        self.push(Ok(value));
    }

    /// Sets the expectation to return an error.
    pub fn return_err(self, error: SyncError) {
        self.push(Err(error));
    }

    fn push(self, result: Result<R, SyncError>) {
        let reply = (self.wrap)(result);
        lock(&self.shared).expectations.push_back(Expectation {
            kind: self.kind,
            id: self.id,
            delay: self.delay,
            reply,
        });
    }
}

fn record<T: SyncEntity>(request: &BackendRequest<T>) -> RecordedRequest<T> {
    let (draft, patch) = match request {
        BackendRequest::Create { draft, .. } => (Some(draft.clone()), None),
        BackendRequest::Update { patch, .. } => (None, Some(patch.clone())),
        _ => (None, None),
    };
    RecordedRequest {
        kind: request.kind(),
        id: request.id().cloned(),
        draft,
        patch,
        at: Instant::now(),
    }
}

fn respond<T: SyncEntity>(request: BackendRequest<T>, reply: Reply<T>) {
    match (request, reply) {
        (BackendRequest::List { respond_to }, Reply::List(result)) => {
            let _ = respond_to.send(result);
        }
        (BackendRequest::Get { respond_to, .. }, Reply::Entity(result))
        | (BackendRequest::Create { respond_to, .. }, Reply::Entity(result))
        | (BackendRequest::Update { respond_to, .. }, Reply::Entity(result)) => {
            let _ = respond_to.send(result);
        }
        (BackendRequest::Delete { respond_to, .. }, Reply::Unit(result)) => {
            let _ = respond_to.send(result);
        }
        (request, _) => reject(request, "mock: reply does not fit request".to_string()),
    }
}

fn reject<T: SyncEntity>(request: BackendRequest<T>, message: String) {
    let error = SyncError::Other(message);
    match request {
        BackendRequest::List { respond_to } => {
            let _ = respond_to.send(Err(error));
        }
        BackendRequest::Get { respond_to, .. }
        | BackendRequest::Create { respond_to, .. }
        | BackendRequest::Update { respond_to, .. } => {
            let _ = respond_to.send(Err(error));
        }
        BackendRequest::Delete { respond_to, .. } => {
            let _ = respond_to.send(Err(error));
        }
    }
}

// =============================================================================
// CHANNEL-LEVEL HELPERS
// =============================================================================

/// Creates a backend and the receiver its requests arrive on.
///
/// # Testing Strategy
/// The test owns the receiver and answers each request by hand, which makes it possible
/// to hold a reply open while the code under test does something else, then release it.
pub fn create_mock_backend<T: SyncEntity>(
    buffer_size: usize,
) -> (ChannelBackend<T>, mpsc::Receiver<BackendRequest<T>>) {
    let (sender, receiver) = mpsc::channel(buffer_size);
    (ChannelBackend::new(sender), receiver)
}

/// Helper to verify that the next message is a List request
pub async fn expect_list<T: SyncEntity>(
    receiver: &mut mpsc::Receiver<BackendRequest<T>>,
) -> Option<Response<Vec<T>>> {
    match receiver.recv().await {
        Some(BackendRequest::List { respond_to }) => Some(respond_to),
        _ => None,
    }
}

/// Helper to verify that the next message is a Get request
pub async fn expect_get<T: SyncEntity>(
    receiver: &mut mpsc::Receiver<BackendRequest<T>>,
) -> Option<(T::Id, Response<T>)> {
    match receiver.recv().await {
        Some(BackendRequest::Get { id, respond_to }) => Some((id, respond_to)),
        _ => None,
    }
}

/// Helper to verify that the next message is a Create request
pub async fn expect_create<T: SyncEntity>(
    receiver: &mut mpsc::Receiver<BackendRequest<T>>,
) -> Option<(T::Draft, Response<T>)> {
    match receiver.recv().await {
        Some(BackendRequest::Create { draft, respond_to }) => Some((draft, respond_to)),
        _ => None,
    }
}

/// Helper to verify that the next message is an Update request
pub async fn expect_update<T: SyncEntity>(
    receiver: &mut mpsc::Receiver<BackendRequest<T>>,
) -> Option<(T::Id, T::Patch, Response<T>)> {
    match receiver.recv().await {
        Some(BackendRequest::Update {
            id,
            patch,
            respond_to,
        }) => Some((id, patch, respond_to)),
        _ => None,
    }
}

/// Helper to verify that the next message is a Delete request
pub async fn expect_delete<T: SyncEntity>(
    receiver: &mut mpsc::Receiver<BackendRequest<T>>,
) -> Option<(T::Id, Response<()>)> {
    match receiver.recv().await {
        Some(BackendRequest::Delete { id, respond_to }) => Some((id, respond_to)),
        _ => None,
    }
}
