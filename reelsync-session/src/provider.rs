//! Provider traits: the seams between the session manager and concrete
//! transports.
//!
//! The manager owns provider lifecycles but never knows transport details;
//! it talks to a peer network and to durable local storage exclusively
//! through these traits. Reference implementations live in
//! [`crate::providers`]; production builds plug in real transports through
//! the same factories.

use crate::error::SessionResult;
use crate::status::{PeerHandle, PresenceDelta};
use async_trait::async_trait;
use reelsync_store::ReplicatedStore;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Options handed to the peer provider factory alongside the room.
#[derive(Debug, Clone, Default)]
pub struct ProviderOptions {
    /// Signaling endpoints for transports that need rendezvous.
    pub signaling: Vec<String>,
    /// Room password, when the room has one.
    pub password: Option<String>,
}

/// A peer-to-peer transport bound to one room and one store.
///
/// Implementations forward locally originated store updates to the room,
/// apply remote updates back into the store, and track presence. They must
/// not forward updates that arrived from peers; the store tags each update
/// with its origin for exactly this purpose.
#[async_trait]
pub trait PeerProvider: Send + Sync {
    /// Joins the room and starts relaying updates.
    async fn connect(&self) -> SessionResult<()>;

    /// Leaves the room and stops relaying. Idempotent.
    async fn disconnect(&self);

    /// Whether the provider is currently attached to the room.
    fn is_connected(&self) -> bool;

    /// Announces the local peer's display name to the room.
    async fn set_presence(&self, name: &str);

    /// The peers currently visible in the room, including the local peer
    /// once it has announced itself.
    fn presence(&self) -> Vec<PeerHandle>;

    /// Subscribes to presence changes.
    fn subscribe_presence(&self) -> broadcast::Receiver<PresenceDelta>;
}

/// Durable local storage bound to one room and one store.
#[async_trait]
pub trait PersistenceProvider: Send + Sync {
    /// Replays previously stored state into the store, then starts
    /// persisting new updates. Resolves when the initial replay completes.
    async fn sync(&self) -> SessionResult<()>;

    /// Stops persisting and releases storage resources.
    async fn close(&self);
}

/// Builds peer providers bound to a `(room, store)` pair.
pub trait PeerProviderFactory: Send + Sync {
    fn create(
        &self,
        room_id: &str,
        options: &ProviderOptions,
        store: Arc<ReplicatedStore>,
    ) -> SessionResult<Arc<dyn PeerProvider>>;
}

/// Builds persistence providers bound to a `(room, store)` pair.
pub trait PersistenceFactory: Send + Sync {
    fn create(
        &self,
        room_id: &str,
        store: Arc<ReplicatedStore>,
    ) -> SessionResult<Arc<dyn PersistenceProvider>>;
}
