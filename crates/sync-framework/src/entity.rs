//! # SyncEntity Trait
//!
//! The `SyncEntity` trait defines the contract every synchronized document (resume, profile, …)
//! must implement to be managed by the generic cache, lanes and backends in this crate. It
//! specifies associated types for IDs, create payloads and partial updates, and the pure
//! functions the engine needs to build, patch and coalesce entities without knowing their shape.
//!
//! # Architecture Note
//! By defining one contract that every document type satisfies, the query cache, the
//! in-memory resource server and the mock backend are written *once* and reused for each type.
//!
//! We use "Associated Types" (type Id, type Draft, type Patch) to enforce type safety.
//! A `Resume` entity requires a `ResumePatch`, and you can't accidentally send it a
//! `ProfilePatch`. The compiler prevents this class of bugs entirely.
//!
//! # Copy-on-write
//! Cached values are never mutated in place. [`SyncEntity::apply_patch`] takes `&self` and
//! returns the next value, so a snapshot taken before an optimistic write stays intact.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::{Debug, Display};
use std::hash::Hash;

/// Trait that any synchronized document must implement.
///
/// # Patch semantics
/// `Patch` is a partial update. Implementations decide how deep the merge goes; the
/// engine only relies on two properties:
/// - `apply_patch` is pure and deterministic.
/// - `merge_patches(a, b)` applied once equals applying `a` then `b` (last write wins).
pub trait SyncEntity:
    Clone + Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// The unique identifier for this entity (e.g., String, Uuid).
    type Id: Eq + Hash + Clone + Send + Sync + Display + Debug + 'static;

    /// The data required to create a new instance (DTO - Data Transfer Object).
    type Draft: Clone + Debug + Serialize + Send + Sync + 'static;

    /// A partial update. Its serialized form is used as a dedupe key, so absent
    /// fields must not appear in it.
    type Patch: Clone + Debug + Default + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Singular name used in logs (e.g. `"resume"`).
    const KIND: &'static str;

    /// Collection name used for REST paths and storage (e.g. `"resumes"`).
    const COLLECTION: &'static str;

    fn id(&self) -> &Self::Id;

    /// Generates a fresh identifier for locally created entities.
    fn new_id() -> Self::Id;

    /// Construct the full entity from a fresh ID, the draft and the creation time.
    fn from_draft(id: Self::Id, draft: Self::Draft, now: DateTime<Utc>) -> Self;

    /// Returns a copy of `self` with `patch` merged on top.
    fn apply_patch(&self, patch: &Self::Patch) -> Self;

    /// Coalesces two patches into one; fields in `later` win.
    fn merge_patches(earlier: Self::Patch, later: Self::Patch) -> Self::Patch;

    /// Records a persisted modification (updated timestamp, version counter).
    fn touch(&mut self, now: DateTime<Utc>);
}
