//! Session lifecycle for ReelSync rooms.
//!
//! A session attaches the process-wide replicated store to a sync room:
//! one peer-to-peer transport that exchanges document updates and presence,
//! and one local persistence provider that makes the room's data durable.
//! [`SessionManager`] owns both lifecycles, keyed by the room id from the
//! current [`reelsync_types::RoomDescriptor`]:
//!
//! - a room change disconnects old providers before connecting new ones,
//! - an empty room id tears everything down and leaves the store offline,
//! - provider failures surface as status transitions, never as errors.
//!
//! Transports are pluggable through the [`PeerProvider`] and
//! [`PersistenceProvider`] traits; this crate ships an in-process network
//! and a SQLite-backed persistence as reference implementations.

mod error;
mod manager;
mod provider;
pub mod providers;
mod settings;
mod status;

pub use error::{SessionError, SessionResult};
pub use manager::{SessionConfig, SessionManager};
pub use provider::{
    PeerProvider, PeerProviderFactory, PersistenceFactory, PersistenceProvider, ProviderOptions,
};
pub use settings::SettingsStore;
pub use status::{PeerHandle, PresenceDelta, ProviderStatus, SessionEvent, SyncStatus};
