//! # Resume Sync
//!
//! Client-side synchronization engine for a resume builder. It keeps an in-memory cache of
//! resumes and profiles consistent with whichever storage backend the session targets,
//! applies edits optimistically with rollback, and debounces bursts of edits into single
//! writes.
//!
//! ## Components
//!
//! - **[resolver]**: pure resolution of a resume's content from a master [`Profile`] and a
//!   [`ProfileLink`](model::ProfileLink).
//! - **[store]**: guest and demo persistence in a key-value store, with demo seeding and a
//!   derived document index.
//! - **[router]**: per-call choice between the remote API and the local store.
//! - **[coordinator]**: create / update / delete / duplicate with snapshots and rollback.
//! - **[autosave]**: per-document debounce, live preview and save status.
//! - **[lifecycle]**: [`SyncSystem`], which wires everything from a [`SyncConfig`].
//!
//! The generic machinery (cache, lanes, backends, mocks) lives in [`sync_framework`].
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! let session = Arc::new(StaticSession::new(SessionMode::Guest));
//! let system = SyncSystem::new(SyncConfig::default(), session).await?;
//!
//! let resume = system.create_resume(ResumeDraft::titled("CV")).await?;
//! system.edit_resume(&resume.id, ResumePatch::title("My CV"));
//! system.shutdown().await?;
//! ```

pub mod autosave;
pub mod config;
pub mod coordinator;
pub mod http;
pub mod lifecycle;
pub mod model;
pub mod resolver;
pub mod router;
pub mod session;
pub mod sink;
pub mod store;

pub use autosave::{AutosaveConfig, AutosaveScheduler, SaveIndicator, SaveStatus};
pub use config::SyncConfig;
pub use coordinator::{CoordinatorConfig, MutationCoordinator, MutationFailure, MutationState};
pub use lifecycle::SyncSystem;
pub use model::{Profile, Resume};
pub use session::{SessionMode, SessionProvider, StaticSession};
