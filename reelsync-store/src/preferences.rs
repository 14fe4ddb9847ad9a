//! The preferences singleton.
//!
//! Preferences live in the document's `preferences` map, one engine entry
//! per field, so concurrent edits from two devices resolve per field by
//! last-writer-wins. The record is never deleted, only overwritten.

use crate::doc::{ReplicatedStore, UpdateOrigin};
use crate::value::{any_to_json, json_to_any};
use reelsync_types::{Preferences, PreferencesUpdate};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::warn;
use yrs::{Map, Out, Transact};

/// Handle for reading and writing the preferences record.
pub struct PreferencesHandle {
    store: Arc<ReplicatedStore>,
}

impl PreferencesHandle {
    /// Creates a handle bound to the given store.
    pub fn new(store: Arc<ReplicatedStore>) -> Self {
        Self { store }
    }

    /// Returns the current preferences. Fields that were never written
    /// take their default values.
    #[must_use]
    pub fn get(&self) -> Preferences {
        let map = self.store.preferences_ref();
        let txn = self.store.doc().transact();
        let mut fields = serde_json::Map::new();
        for key in preference_keys() {
            if let Some(Out::Any(any)) = map.get(&txn, key.as_str()) {
                fields.insert(key, any_to_json(&any));
            }
        }
        drop(txn);
        match serde_json::from_value(JsonValue::Object(fields)) {
            Ok(prefs) => prefs,
            Err(e) => {
                warn!("stored preferences failed to deserialize, using defaults: {e}");
                Preferences::default()
            }
        }
    }

    /// Overwrites every preference field with the given values.
    pub fn set(&self, preferences: &Preferences) {
        self.write_fields(serde_json::to_value(preferences));
    }

    /// Overwrites only the fields present in the patch.
    pub fn apply(&self, update: &PreferencesUpdate) {
        if update.is_empty() {
            return;
        }
        self.write_fields(serde_json::to_value(update));
    }

    fn write_fields(&self, fields: Result<JsonValue, serde_json::Error>) {
        let fields = match fields {
            Ok(JsonValue::Object(map)) => map,
            Ok(_) | Err(_) => {
                warn!("preferences did not serialize to an object, skipping write");
                return;
            }
        };
        let map = self.store.preferences_ref();
        self.store.commit(UpdateOrigin::Local, |txn| {
            for (key, value) in &fields {
                map.insert(txn, key.as_str(), json_to_any(value));
            }
        });
    }
}

/// The set of known preference field names, in serialized (camelCase) form.
pub(crate) fn preference_keys() -> Vec<String> {
    match serde_json::to_value(Preferences::default()) {
        Ok(JsonValue::Object(map)) => map.keys().cloned().collect(),
        _ => Vec::new(),
    }
}
