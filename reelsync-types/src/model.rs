//! Synchronized entity model.
//!
//! These are the four collections held by the replicated store. Field names
//! serialize as camelCase so JSON backups stay compatible with the export
//! format the surrounding application already produces.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// An entity that can live in a repository-managed collection.
///
/// `id` is optional because upserts may insert caller-supplied partial
/// records; identity-based operations treat an absent id as a miss.
pub trait Entity: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// The entity's identity within its collection, if it has one.
    fn id(&self) -> Option<&str>;
}

/// The named list collections of the replicated store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreCollection {
    /// User-created or mirrored playlists.
    Playlists,
    /// Watch history, one entry per canonical video id.
    History,
}

/// An entity with a statically known home collection.
///
/// This is what makes the repository fully typed: each entity type names
/// its collection at compile time, so there is no runtime collection lookup.
pub trait Record: Entity {
    /// The collection this entity type is stored in.
    const COLLECTION: StoreCollection;
}

/// A reference to a stream inside a playlist.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StreamRef {
    pub url: String,
    pub title: String,
    pub thumbnail: String,
    pub uploader_name: String,
    pub uploader_url: String,
    /// Duration in seconds.
    pub duration: i64,
}

/// A user playlist: ordered stream references plus owner metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Playlist {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    /// Owner display name.
    pub uploader: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uploader_url: Option<String>,
    /// Ordered stream references.
    pub related_streams: Vec<StreamRef>,
}

impl Entity for Playlist {
    fn id(&self) -> Option<&str> {
        if self.id.is_empty() { None } else { Some(&self.id) }
    }
}

impl Record for Playlist {
    const COLLECTION: StoreCollection = StoreCollection::Playlists;
}

/// One watched video. Mutated in place on rewatch, keyed by the canonical
/// video id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HistoryItem {
    /// Canonical video id.
    pub id: String,
    pub title: String,
    pub url: String,
    pub thumbnail: String,
    pub uploader_name: String,
    pub uploader_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uploader_avatar: Option<String>,
    pub uploader_verified: bool,
    /// Duration in seconds.
    pub duration: i64,
    pub views: i64,
    /// Upload time, milliseconds since Unix epoch.
    pub uploaded: i64,
    /// Playback position in seconds. Concurrent updates from two devices
    /// resolve by the engine's last-writer-wins semantics, not here.
    pub current_time: f64,
    /// When the video was last watched, milliseconds since Unix epoch.
    pub watched_at: u64,
}

impl Entity for HistoryItem {
    fn id(&self) -> Option<&str> {
        if self.id.is_empty() { None } else { Some(&self.id) }
    }
}

impl Record for HistoryItem {
    const COLLECTION: StoreCollection = StoreCollection::History;
}

/// Player preferences. A singleton record: never deleted, only overwritten
/// field by field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Preferences {
    pub autoplay: bool,
    pub muted: bool,
    pub volume: f64,
    pub speed: f64,
    pub quality: String,
    pub theatre_mode: bool,
    pub r#loop: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            autoplay: false,
            muted: false,
            volume: 1.0,
            speed: 1.0,
            quality: "auto".to_string(),
            theatre_mode: false,
            r#loop: false,
        }
    }
}

/// Field-by-field patch for [`Preferences`]. Absent fields are untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PreferencesUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub autoplay: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub muted: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub theatre_mode: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r#loop: Option<bool>,
}

impl PreferencesUpdate {
    /// A patch that only sets the volume.
    #[must_use]
    pub fn volume(volume: f64) -> Self {
        Self {
            volume: Some(volume),
            ..Self::default()
        }
    }

    /// A patch that only sets the playback speed.
    #[must_use]
    pub fn speed(speed: f64) -> Self {
        Self {
            speed: Some(speed),
            ..Self::default()
        }
    }

    /// Whether the patch changes anything at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
