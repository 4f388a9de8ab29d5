//! # Sync Framework
//!
//! This crate provides the domain-free building blocks of a client-side synchronization
//! engine: a typed cache of documents kept consistent with whichever storage backend the
//! current call targets, with optimistic writes that can be rolled back.
//!
//! ## Architecture Overview
//!
//! The framework separates concerns into four layers:
//!
//! 1. **Entity Layer** ([`SyncEntity`]) - Your documents, their create payloads and patches
//! 2. **Transport Layer** ([`Backend`]) - Where a request goes: a channel to a
//!    [`ResourceServer`], an HTTP API, a local store
//! 3. **Cache Layer** ([`QueryCache`]) - Single-entity and list slots, read tickets,
//!    change events
//! 4. **Ordering Layer** ([`MutationLanes`]) - Per-id serialization of mutations
//!
//! Domain crates write their business rules once, in the entity trait and a coordinator
//! built on these pieces; the framework handles message passing, stale-read protection
//! and rollback bookkeeping.
//!
//! ## Actor Model, Twice
//!
//! Two components are actors in the Tokio sense: a task owning state, fed by an mpsc
//! channel, replying on oneshot channels.
//!
//! - [`ResourceServer`] owns a collection and serves [`BackendRequest`]s one at a time. It
//!   stands in for a remote API in demos and tests.
//! - Each lane of [`MutationLanes`] owns the right to mutate one id and runs queued jobs one
//!   at a time.
//!
//! **Further Reading**:
//! - [Actors in Rust](https://ryhl.io/blog/actors-with-tokio/) - Practical guide to implementing actors with Tokio
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use sync_framework::{Backend, ResourceServer};
//!
//! let (server, backend) = ResourceServer::<Resume>::new(32);
//! tokio::spawn(server.run());
//!
//! let created = backend.create(draft).await?;
//! let fetched = backend.get(created.id()).await?;
//! ```
//!
//! ## Concurrency Model
//!
//! - The cache is shared; its lock is never held across an `.await`
//! - Values in the cache are replaced, never mutated in place (copy-on-write)
//! - Mutations of one id are serialized; different ids proceed in parallel
//! - Reads racing an optimistic write are discarded via epochs
//!
//! ## Testing
//!
//! [`mock::MockBackend`] answers backend requests from scripted expectations and records
//! what it received. See the [`mock`] module for the full API and usage patterns.

pub mod backend;
pub mod cache;
pub mod client;
pub mod entity;
pub mod error;
pub mod lanes;
pub mod message;
pub mod mock;
pub mod server;
pub mod tracing;

#[cfg(test)]
mod testing;

// Re-export core types for convenience
pub use backend::Backend;
pub use cache::{CacheEvent, CacheSnapshot, EntrySnapshot, QueryCache};
pub use client::ChannelBackend;
pub use entity::SyncEntity;
pub use error::{FieldErrors, SyncError};
pub use lanes::MutationLanes;
pub use message::{BackendRequest, RequestKind, Response};
pub use server::ResourceServer;
