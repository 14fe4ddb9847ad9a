//! Core type definitions for ReelSync.
//!
//! This crate defines the fundamental, transport-agnostic types shared by
//! the store and session layers:
//! - Peer (presence session) identifiers
//! - The room descriptor that scopes a sync group
//! - The synchronized entity model (playlists, history, subscriptions,
//!   preferences) together with the `Entity`/`Record` traits the generic
//!   repository is parameterized over
//!
//! Everything UI-facing (view models, route state, player state) lives in
//! the application layer, not here.

mod ids;
mod model;
mod room;

pub use ids::PeerId;
pub use model::{
    Entity, HistoryItem, Playlist, Preferences, PreferencesUpdate, Record, StoreCollection,
    StreamRef,
};
pub use room::RoomDescriptor;
