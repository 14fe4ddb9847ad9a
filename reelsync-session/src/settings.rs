//! Durable local settings.
//!
//! Settings live in one JSON file of top-level keys. This layer only knows
//! the room descriptor, stored under the `"room"` key; other parts of the
//! application keep their own keys in the same file and are preserved
//! verbatim on save.

use crate::error::SessionResult;
use reelsync_types::RoomDescriptor;
use serde_json::{Map, Value as JsonValue};
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::debug;

const ROOM_KEY: &str = "room";

/// JSON key-value settings file.
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    /// Creates a store over the given file. The file is created on first
    /// save.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Loads the saved room descriptor. A missing file, missing key, or
    /// null value reads as the default (no room).
    pub fn load_room(&self) -> SessionResult<RoomDescriptor> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(RoomDescriptor::default()),
            Err(e) => return Err(e.into()),
        };
        let settings: JsonValue = serde_json::from_str(&raw)?;
        match settings.get(ROOM_KEY) {
            None | Some(JsonValue::Null) => Ok(RoomDescriptor::default()),
            Some(value) => Ok(serde_json::from_value(value.clone())?),
        }
    }

    /// Saves the room descriptor, preserving unrelated keys.
    pub fn save_room(&self, room: &RoomDescriptor) -> SessionResult<()> {
        let mut settings = match std::fs::read_to_string(&self.path) {
            Ok(raw) => serde_json::from_str::<JsonValue>(&raw)
                .ok()
                .and_then(|v| match v {
                    JsonValue::Object(map) => Some(map),
                    _ => None,
                })
                .unwrap_or_default(),
            Err(e) if e.kind() == ErrorKind::NotFound => Map::new(),
            Err(e) => return Err(e.into()),
        };
        settings.insert(ROOM_KEY.to_string(), serde_json::to_value(room)?);

        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }
        std::fs::write(
            &self.path,
            serde_json::to_string_pretty(&JsonValue::Object(settings))?,
        )?;
        debug!(path = %self.path.display(), "saved room settings");
        Ok(())
    }
}
