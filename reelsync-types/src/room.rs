//! Room descriptor — the user-chosen sync group.

use serde::{Deserialize, Serialize};

/// Describes the sync room a session should join.
///
/// Sourced from durable local settings; the session layer only reacts to
/// its value. An absent or empty `id` means "no room": providers are torn
/// down but in-memory data survives.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomDescriptor {
    /// Room identifier shared by all peers in the sync group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Optional room password, forwarded to the transport provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Display name announced to other peers via presence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl RoomDescriptor {
    /// Creates a descriptor for the given room id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            password: None,
            name: None,
        }
    }

    /// Sets the room password.
    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Returns the room id when present and non-empty.
    #[must_use]
    pub fn room_id(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| !id.is_empty())
    }

    /// Whether this descriptor names a joinable room.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.room_id().is_some()
    }
}
