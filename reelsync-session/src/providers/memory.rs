//! In-process peer network.
//!
//! [`MemoryNetwork`] joins providers by room id over broadcast channels and
//! relays two kinds of traffic: encoded document updates and presence
//! frames. Every provider in a room sees every frame; senders filter out
//! their own. Joining peers exchange full document state, which is safe
//! because update application is idempotent.
//!
//! This is the reference transport and the test double in one. The wire
//! protocol of a real deployment lives behind the same [`PeerProvider`]
//! trait.

use crate::error::{SessionError, SessionResult};
use crate::provider::{PeerProvider, PeerProviderFactory, ProviderOptions};
use crate::status::{PeerHandle, PresenceDelta};
use async_trait::async_trait;
use reelsync_store::{ReplicatedStore, UpdateOrigin};
use reelsync_types::PeerId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const FRAME_CHANNEL_CAPACITY: usize = 256;
const PRESENCE_CHANNEL_CAPACITY: usize = 64;

/// One frame on the in-process wire.
#[derive(Debug, Clone)]
enum Frame {
    /// An encoded document update from one peer.
    Update { from: PeerId, payload: Vec<u8> },
    /// A peer joined and wants the current state.
    Join { from: PeerId },
    /// A peer announced or changed its presence.
    Presence { peer: PeerHandle },
    /// A peer left the room.
    Leave { peer_id: PeerId },
}

struct RoomSlot {
    frames: broadcast::Sender<Frame>,
    password: Option<String>,
}

/// Routes frames between providers that joined the same room id.
#[derive(Default)]
pub struct MemoryNetwork {
    rooms: Mutex<HashMap<String, RoomSlot>>,
}

impl MemoryNetwork {
    /// Creates an empty network.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The first joiner fixes the room's password; later joiners must
    /// present the same one.
    fn join(
        &self,
        room_id: &str,
        password: Option<&str>,
    ) -> SessionResult<broadcast::Sender<Frame>> {
        let mut rooms = self.rooms.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = rooms.get(room_id) {
            if slot.password.as_deref() != password {
                return Err(SessionError::Provider(format!(
                    "wrong password for room {room_id}"
                )));
            }
            return Ok(slot.frames.clone());
        }
        let (frames, _) = broadcast::channel(FRAME_CHANNEL_CAPACITY);
        rooms.insert(
            room_id.to_string(),
            RoomSlot {
                frames: frames.clone(),
                password: password.map(str::to_owned),
            },
        );
        Ok(frames)
    }
}

/// State shared between the provider handle and its pump task.
struct PeerState {
    id: PeerId,
    store: Arc<ReplicatedStore>,
    connected: AtomicBool,
    peers: Mutex<HashMap<PeerId, PeerHandle>>,
    own: Mutex<Option<PeerHandle>>,
    presence_events: broadcast::Sender<PresenceDelta>,
}

impl PeerState {
    fn handle_frame(&self, frame: Frame, frames: &broadcast::Sender<Frame>) {
        match frame {
            Frame::Update { from, payload } if from != self.id => {
                if let Err(e) = self.store.apply_update(&payload, UpdateOrigin::Peer) {
                    warn!(peer = %from, "dropping undecodable peer update: {e}");
                }
            }
            Frame::Join { from } if from != self.id => {
                // hand the newcomer our state and our presence
                let _ = frames.send(Frame::Update {
                    from: self.id,
                    payload: self.store.encode_full(),
                });
                let own = self
                    .own
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone();
                if let Some(own) = own {
                    let _ = frames.send(Frame::Presence { peer: own });
                }
            }
            Frame::Presence { peer } if peer.peer_id != self.id => {
                let previous = self
                    .peers
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(peer.peer_id, peer.clone());
                let delta = match previous {
                    None => PresenceDelta {
                        added: vec![peer],
                        ..PresenceDelta::default()
                    },
                    Some(_) => PresenceDelta {
                        updated: vec![peer],
                        ..PresenceDelta::default()
                    },
                };
                let _ = self.presence_events.send(delta);
            }
            Frame::Leave { peer_id } if peer_id != self.id => {
                let removed = self
                    .peers
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(&peer_id);
                if removed.is_some() {
                    let _ = self.presence_events.send(PresenceDelta {
                        removed: vec![peer_id],
                        ..PresenceDelta::default()
                    });
                }
            }
            _ => {}
        }
    }
}

/// A peer provider attached to a [`MemoryNetwork`] room.
pub struct MemoryPeer {
    state: Arc<PeerState>,
    network: Arc<MemoryNetwork>,
    room_id: String,
    password: Option<String>,
    frames: Mutex<Option<broadcast::Sender<Frame>>>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl MemoryPeer {
    fn new(
        network: Arc<MemoryNetwork>,
        room_id: &str,
        password: Option<String>,
        store: Arc<ReplicatedStore>,
    ) -> Self {
        let (presence_events, _) = broadcast::channel(PRESENCE_CHANNEL_CAPACITY);
        Self {
            state: Arc::new(PeerState {
                id: PeerId::new(),
                store,
                connected: AtomicBool::new(false),
                peers: Mutex::new(HashMap::new()),
                own: Mutex::new(None),
                presence_events,
            }),
            network,
            room_id: room_id.to_string(),
            password,
            frames: Mutex::new(None),
            pump: Mutex::new(None),
        }
    }

    /// This provider's session identity.
    #[must_use]
    pub fn peer_id(&self) -> PeerId {
        self.state.id
    }

    fn frames(&self) -> Option<broadcast::Sender<Frame>> {
        self.frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl PeerProvider for MemoryPeer {
    async fn connect(&self) -> SessionResult<()> {
        let frames = self.network.join(&self.room_id, self.password.as_deref())?;
        let mut frame_rx = frames.subscribe();
        let mut store_rx = self.state.store.subscribe();

        // announce ourselves and seed the room with our state
        let _ = frames.send(Frame::Join {
            from: self.state.id,
        });
        let _ = frames.send(Frame::Update {
            from: self.state.id,
            payload: self.state.store.encode_full(),
        });

        let state = self.state.clone();
        let frames_out = frames.clone();
        let pump = tokio::spawn(async move {
            loop {
                tokio::select! {
                    update = store_rx.recv() => match update {
                        Ok(update) if update.origin != UpdateOrigin::Peer => {
                            let _ = frames_out.send(Frame::Update {
                                from: state.id,
                                payload: update.payload,
                            });
                        }
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            // fell behind the store; resend full state instead
                            warn!(skipped, "store update stream lagged, resyncing");
                            let _ = frames_out.send(Frame::Update {
                                from: state.id,
                                payload: state.store.encode_full(),
                            });
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    frame = frame_rx.recv() => match frame {
                        Ok(frame) => state.handle_frame(frame, &frames_out),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "room frame stream lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        });

        *self.frames.lock().unwrap_or_else(PoisonError::into_inner) = Some(frames);
        *self.pump.lock().unwrap_or_else(PoisonError::into_inner) = Some(pump);
        self.state.connected.store(true, Ordering::SeqCst);
        debug!(room = %self.room_id, peer = %self.state.id, "joined in-process room");
        Ok(())
    }

    async fn disconnect(&self) {
        if !self.state.connected.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(frames) = self.frames() {
            let _ = frames.send(Frame::Leave {
                peer_id: self.state.id,
            });
        }
        let pump = self
            .pump
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(pump) = pump {
            pump.abort();
        }
        *self.frames.lock().unwrap_or_else(PoisonError::into_inner) = None;
        self.state
            .peers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        debug!(room = %self.room_id, peer = %self.state.id, "left in-process room");
    }

    fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::SeqCst)
    }

    async fn set_presence(&self, name: &str) {
        let handle = PeerHandle {
            peer_id: self.state.id,
            name: name.to_string(),
        };
        *self.state.own.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle.clone());
        if let Some(frames) = self.frames() {
            let _ = frames.send(Frame::Presence { peer: handle });
        }
    }

    fn presence(&self) -> Vec<PeerHandle> {
        let mut peers: Vec<PeerHandle> = self
            .state
            .peers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        if self.is_connected() {
            let own = self
                .state
                .own
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            if let Some(own) = own {
                peers.push(own);
            }
        }
        peers.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.peer_id.cmp(&b.peer_id)));
        peers
    }

    fn subscribe_presence(&self) -> broadcast::Receiver<PresenceDelta> {
        self.state.presence_events.subscribe()
    }
}

/// Factory producing [`MemoryPeer`] providers on a shared network.
pub struct MemoryPeerFactory {
    network: Arc<MemoryNetwork>,
}

impl MemoryPeerFactory {
    /// Creates a factory for the given network.
    pub fn new(network: Arc<MemoryNetwork>) -> Self {
        Self { network }
    }
}

impl PeerProviderFactory for MemoryPeerFactory {
    fn create(
        &self,
        room_id: &str,
        options: &ProviderOptions,
        store: Arc<ReplicatedStore>,
    ) -> SessionResult<Arc<dyn PeerProvider>> {
        Ok(Arc::new(MemoryPeer::new(
            self.network.clone(),
            room_id,
            options.password.clone(),
            store,
        )))
    }
}
