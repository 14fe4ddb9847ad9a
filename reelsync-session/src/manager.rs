//! The session manager: provider lifecycles keyed by room id.
//!
//! The manager owns at most one peer provider and one persistence provider
//! at a time. A room change always tears the old providers down before new
//! ones come up, so two transports are never attached to the store at once.
//! The store itself is untouched by room changes; only providers come and
//! go.
//!
//! Provider failures never escape to callers. A connect or replay failure
//! is logged and becomes a `Disconnected` status, and the session stays in
//! that state until the next room change.

use crate::provider::{
    PeerProvider, PeerProviderFactory, PersistenceFactory, PersistenceProvider, ProviderOptions,
};
use crate::status::{ProviderStatus, SessionEvent, SyncStatus};
use reelsync_store::ReplicatedStore;
use reelsync_types::RoomDescriptor;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Capacity of the session-event channel.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Session manager configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Presence name announced when the room descriptor has none.
    pub device_name: String,
    /// Signaling endpoints forwarded to the peer provider factory.
    pub signaling: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            device_name: "ReelSync Device".to_string(),
            signaling: Vec::new(),
        }
    }
}

/// Status publication shared with the presence handler task.
struct StatusHub {
    status: watch::Sender<SyncStatus>,
    events: broadcast::Sender<SessionEvent>,
}

impl StatusHub {
    fn set_peer(&self, status: ProviderStatus) {
        self.status.send_modify(|s| s.peer = status);
        let _ = self.events.send(SessionEvent::PeerStatus(status));
    }

    fn set_persistence(&self, status: ProviderStatus) {
        self.status.send_modify(|s| s.persistence = status);
        let _ = self.events.send(SessionEvent::PersistenceStatus(status));
    }
}

/// The providers currently attached, if any.
#[derive(Default)]
struct ActiveSession {
    room_id: Option<String>,
    peer: Option<Arc<dyn PeerProvider>>,
    persistence: Option<Arc<dyn PersistenceProvider>>,
    presence_task: Option<JoinHandle<()>>,
}

/// Owns provider lifecycles and publishes session status.
pub struct SessionManager {
    store: Arc<ReplicatedStore>,
    peer_factory: Arc<dyn PeerProviderFactory>,
    persistence_factory: Arc<dyn PersistenceFactory>,
    config: SessionConfig,
    hub: Arc<StatusHub>,
    session: Mutex<ActiveSession>,
}

impl SessionManager {
    /// Creates a manager bound to the given store and factories.
    pub fn new(
        store: Arc<ReplicatedStore>,
        peer_factory: Arc<dyn PeerProviderFactory>,
        persistence_factory: Arc<dyn PersistenceFactory>,
        config: SessionConfig,
    ) -> Self {
        let (status, _) = watch::channel(SyncStatus::default());
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            store,
            peer_factory,
            persistence_factory,
            config,
            hub: Arc::new(StatusHub { status, events }),
            session: Mutex::new(ActiveSession::default()),
        }
    }

    /// Subscribes to the aggregate session status. The watch channel
    /// coalesces rapid transitions; use [`SessionManager::events`] to
    /// observe every step.
    pub fn status(&self) -> watch::Receiver<SyncStatus> {
        self.hub.status.subscribe()
    }

    /// Subscribes to individual session transitions.
    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.hub.events.subscribe()
    }

    /// The room id the manager is currently attached to, if any.
    pub async fn current_room(&self) -> Option<String> {
        self.session.lock().await.room_id.clone()
    }

    /// Reacts to a room descriptor: tears existing providers down and, when
    /// the descriptor names a room, builds and connects new ones.
    ///
    /// Setting the same room again reconnects; the caller decides whether a
    /// descriptor change is worth acting on.
    pub async fn set_room(&self, room: &RoomDescriptor) {
        let mut session = self.session.lock().await;
        self.teardown(&mut session).await;

        let Some(room_id) = room.room_id() else {
            debug!("no active room, providers stay down");
            return;
        };
        session.room_id = Some(room_id.to_string());

        self.connect_peer(&mut session, room_id, room).await;
        self.open_persistence(&mut session, room_id).await;
    }

    /// Drives the manager from a watch channel of room descriptors,
    /// including the initial value. Returns when the sender is dropped.
    pub async fn run(&self, mut rooms: watch::Receiver<RoomDescriptor>) {
        loop {
            let room = rooms.borrow_and_update().clone();
            self.set_room(&room).await;
            if rooms.changed().await.is_err() {
                break;
            }
        }
    }

    /// Disconnects all providers. Called on process teardown.
    pub async fn shutdown(&self) {
        let mut session = self.session.lock().await;
        self.teardown(&mut session).await;
        info!("session manager shut down");
    }

    async fn connect_peer(
        &self,
        session: &mut ActiveSession,
        room_id: &str,
        room: &RoomDescriptor,
    ) {
        self.hub.set_peer(ProviderStatus::Connecting);
        let options = ProviderOptions {
            signaling: self.config.signaling.clone(),
            password: room.password.clone(),
        };
        let connected = match self.peer_factory.create(room_id, &options, self.store.clone()) {
            Ok(provider) => match provider.connect().await {
                Ok(()) => Some(provider),
                Err(e) => {
                    warn!(room = room_id, "peer provider failed to connect: {e}");
                    None
                }
            },
            Err(e) => {
                warn!(room = room_id, "peer provider creation failed: {e}");
                None
            }
        };
        let Some(provider) = connected else {
            self.hub.set_peer(ProviderStatus::Disconnected);
            return;
        };

        let name = room
            .name
            .clone()
            .unwrap_or_else(|| self.config.device_name.clone());
        provider.set_presence(&name).await;

        session.presence_task = Some(self.spawn_presence_handler(provider.clone()));
        // seed the member list so the local peer shows up before the
        // first remote delta arrives
        self.hub
            .status
            .send_modify(|s| s.peers = provider.presence());
        session.peer = Some(provider);
        self.hub.set_peer(ProviderStatus::Connected);
        info!(room = room_id, "peer provider connected");
    }

    async fn open_persistence(&self, session: &mut ActiveSession, room_id: &str) {
        self.hub.set_persistence(ProviderStatus::Connecting);
        match self.persistence_factory.create(room_id, self.store.clone()) {
            Ok(provider) => match provider.sync().await {
                Ok(()) => {
                    session.persistence = Some(provider);
                    self.hub.set_persistence(ProviderStatus::Connected);
                    info!(room = room_id, "persistence provider synced");
                }
                Err(e) => {
                    warn!(room = room_id, "persistence replay failed: {e}");
                    // drop without close: the durable log must survive a
                    // failed attach so the next one can recover from it
                    drop(provider);
                    self.hub.set_persistence(ProviderStatus::Disconnected);
                }
            },
            Err(e) => {
                warn!(room = room_id, "persistence provider creation failed: {e}");
                self.hub.set_persistence(ProviderStatus::Disconnected);
            }
        }
    }

    /// Single ordered consumer of the provider's presence stream. Deltas
    /// are processed one at a time, so status snapshots never interleave.
    fn spawn_presence_handler(&self, provider: Arc<dyn PeerProvider>) -> JoinHandle<()> {
        let hub = self.hub.clone();
        let mut deltas = provider.subscribe_presence();
        tokio::spawn(async move {
            loop {
                match deltas.recv().await {
                    Ok(delta) => {
                        if delta.is_empty() {
                            continue;
                        }
                        let peers = provider.presence();
                        let connected = provider.is_connected();
                        hub.status.send_modify(|s| {
                            s.peers = peers.clone();
                            s.last_sync = Some(now_millis());
                            s.peer = if connected {
                                ProviderStatus::Connected
                            } else {
                                ProviderStatus::Disconnected
                            };
                        });
                        let _ = hub.events.send(SessionEvent::Presence(peers));
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "presence stream lagged, skipping deltas");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    async fn teardown(&self, session: &mut ActiveSession) {
        if let Some(task) = session.presence_task.take() {
            task.abort();
        }
        if let Some(peer) = session.peer.take() {
            peer.disconnect().await;
            self.hub.set_peer(ProviderStatus::Disconnected);
        }
        if let Some(persistence) = session.persistence.take() {
            persistence.close().await;
            self.hub.set_persistence(ProviderStatus::Disconnected);
        }
        if session.room_id.take().is_some() {
            self.hub.status.send_modify(|s| s.peers.clear());
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
