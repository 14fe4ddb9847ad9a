//! Session status and presence types.

use reelsync_types::PeerId;
use std::fmt;

/// Connection state of one provider. Every provider starts `Disconnected`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProviderStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ProviderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        };
        f.write_str(s)
    }
}

/// One peer visible in the room, as announced through presence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerHandle {
    pub peer_id: PeerId,
    pub name: String,
}

/// A presence change as reported by a peer provider: which peers appeared,
/// changed their announced state, or left since the last delta.
#[derive(Debug, Clone, Default)]
pub struct PresenceDelta {
    pub added: Vec<PeerHandle>,
    pub updated: Vec<PeerHandle>,
    pub removed: Vec<PeerId>,
}

impl PresenceDelta {
    /// Whether the delta carries any change at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }
}

/// The aggregate session state published through the status watch channel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncStatus {
    /// Peer transport provider state.
    pub peer: ProviderStatus,
    /// Local persistence provider state.
    pub persistence: ProviderStatus,
    /// Flat list of peers currently visible in the room.
    pub peers: Vec<PeerHandle>,
    /// When presence last changed, milliseconds since the Unix epoch.
    pub last_sync: Option<u64>,
}

/// A single session transition, published on a broadcast channel so
/// observers see every step even when the watch channel coalesces.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    PeerStatus(ProviderStatus),
    PersistenceStatus(ProviderStatus),
    Presence(Vec<PeerHandle>),
}
