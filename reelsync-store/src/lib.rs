//! Replicated store and entity repository for ReelSync.
//!
//! This crate is the local-first data layer of the client. All synchronized
//! state (playlists, watch history, subscriptions, preferences) lives in a
//! single replicated document which is created once per process and survives
//! every room change. The rest of the application never touches the document
//! directly:
//!
//! - [`ReplicatedStore`] wraps the document, its four named collections, the
//!   merge surface (state vectors, diffs, update application) and a broadcast
//!   stream of change notifications.
//! - [`Repository`] provides generic CRUD/query operations over one list
//!   collection, parameterized by entity type.
//! - [`Subscriptions`] and [`PreferencesHandle`] cover the two collections
//!   with non-generic semantics (a string set and a singleton record).
//!
//! Conflict resolution is delegated to the document engine: concurrent list
//! edits merge structurally and concurrent field writes resolve by
//! last-writer-wins. The one identity invariant the engine cannot express,
//! "at most one live entry per id", is repaired explicitly via
//! [`Repository::remove_duplicates`].
//!
//! # Error posture
//!
//! Repository operations never return errors: misuse (empty ids, unmatched
//! filters) is a `None` return, and internal serialization problems are
//! logged and reduced to no-ops. Only the merge surface, which deals with
//! foreign bytes, returns [`StoreResult`].

mod doc;
mod error;
mod preferences;
mod repository;
mod subscriptions;
mod value;

pub use doc::{ReplicatedStore, StoreUpdate, UpdateOrigin};
pub use error::{StoreError, StoreResult};
pub use preferences::PreferencesHandle;
pub use repository::{BATCH_SIZE, Filter, Patch, Query, Repository, UpdateSpec};
pub use subscriptions::Subscriptions;
