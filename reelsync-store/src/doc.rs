//! The replicated store: one shared, mergeable document per process.
//!
//! The store is constructed once by the application root and passed by
//! reference to every consumer (repositories, the session manager, the UI
//! mirror). Rooms come and go; the store never does. Providers attach to it
//! and detach from it, but in-memory data survives every room change.
//!
//! Change notification works at transaction granularity: every mutating
//! operation commits exactly one document transaction and publishes the
//! encoded update for that transaction, tagged with its origin. Providers
//! use the origin to decide what to forward (peer transports relay local
//! edits, the persistence provider stores everything it did not produce
//! itself), and the UI mirror re-snapshots on any notification.

use crate::error::{StoreError, StoreResult};
use crate::preferences::preference_keys;
use crate::value::{any_to_json, json_to_any};
use reelsync_types::StoreCollection;
use serde_json::{Value as JsonValue, json};
use tokio::sync::broadcast;
use tracing::debug;
use yrs::updates::decoder::Decode;
use yrs::updates::encoder::Encode;
use yrs::{
    Any, Array, ArrayRef, Doc, Map, MapRef, Out, ReadTxn, StateVector, Transact, TransactionMut,
    Update,
};

/// Capacity of the change-notification channel. Receivers that fall further
/// behind than this observe a lag error and resynchronize from a snapshot.
const UPDATE_CHANNEL_CAPACITY: usize = 256;

/// A v1-encoded update that contains no changes.
const EMPTY_UPDATE_V1: [u8; 2] = [0, 0];

/// Where an update entered this replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOrigin {
    /// Produced by a local repository operation.
    Local,
    /// Received from a remote peer over a transport provider.
    Peer,
    /// Replayed from durable local storage.
    Persistence,
}

/// A change notification: one committed transaction, encoded.
#[derive(Debug, Clone)]
pub struct StoreUpdate {
    /// Where the change entered this replica.
    pub origin: UpdateOrigin,
    /// The v1-encoded update for the transaction.
    pub payload: Vec<u8>,
}

/// The process-wide replicated document and its four named collections.
pub struct ReplicatedStore {
    doc: Doc,
    playlists: ArrayRef,
    history: ArrayRef,
    subscriptions: ArrayRef,
    preferences: MapRef,
    updates: broadcast::Sender<StoreUpdate>,
}

impl ReplicatedStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::from_doc(Doc::new())
    }

    /// Creates a store with a fixed engine client id, for deterministic
    /// replica setups in tests.
    #[must_use]
    pub fn with_client_id(client_id: u64) -> Self {
        Self::from_doc(Doc::with_client_id(client_id))
    }

    fn from_doc(doc: Doc) -> Self {
        let playlists = doc.get_or_insert_array("playlists");
        let history = doc.get_or_insert_array("history");
        let subscriptions = doc.get_or_insert_array("subscriptions");
        let preferences = doc.get_or_insert_map("preferences");
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            doc,
            playlists,
            history,
            subscriptions,
            preferences,
            updates,
        }
    }

    /// Subscribes to change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreUpdate> {
        self.updates.subscribe()
    }

    pub(crate) fn doc(&self) -> &Doc {
        &self.doc
    }

    pub(crate) fn list(&self, collection: StoreCollection) -> &ArrayRef {
        match collection {
            StoreCollection::Playlists => &self.playlists,
            StoreCollection::History => &self.history,
        }
    }

    pub(crate) fn subscriptions_ref(&self) -> &ArrayRef {
        &self.subscriptions
    }

    pub(crate) fn preferences_ref(&self) -> &MapRef {
        &self.preferences
    }

    /// Runs `f` inside a single write transaction and publishes the
    /// resulting update with the given origin. Transactions that turn out
    /// to be no-ops publish nothing.
    pub(crate) fn commit<R>(
        &self,
        origin: UpdateOrigin,
        f: impl FnOnce(&mut TransactionMut) -> R,
    ) -> R {
        let (out, payload) = {
            let mut txn = self.doc.transact_mut();
            let out = f(&mut txn);
            (out, txn.encode_update_v1())
        };
        if payload.as_slice() != EMPTY_UPDATE_V1 {
            let _ = self.updates.send(StoreUpdate { origin, payload });
        }
        out
    }

    // ── Merge surface (delegated to the engine) ──────────────────

    /// Returns this replica's encoded state vector.
    #[must_use]
    pub fn state_vector(&self) -> Vec<u8> {
        self.doc.transact().state_vector().encode_v1()
    }

    /// Encodes the changes a remote replica with the given state vector is
    /// missing.
    pub fn diff(&self, remote_state_vector: &[u8]) -> StoreResult<Vec<u8>> {
        let sv = StateVector::decode_v1(remote_state_vector)
            .map_err(|e| StoreError::Engine(e.to_string()))?;
        Ok(self.doc.transact().encode_state_as_update_v1(&sv))
    }

    /// Encodes the full document state as a single update.
    #[must_use]
    pub fn encode_full(&self) -> Vec<u8> {
        self.doc
            .transact()
            .encode_state_as_update_v1(&StateVector::default())
    }

    /// Merges an encoded remote update into this replica and publishes it
    /// under the given origin. Merging is idempotent and order-insensitive;
    /// conflict resolution is the engine's job.
    pub fn apply_update(&self, payload: &[u8], origin: UpdateOrigin) -> StoreResult<()> {
        let update =
            Update::decode_v1(payload).map_err(|e| StoreError::Engine(e.to_string()))?;
        {
            let mut txn = self.doc.transact_mut();
            txn.apply_update(update)
                .map_err(|e| StoreError::Engine(e.to_string()))?;
        }
        let _ = self.updates.send(StoreUpdate {
            origin,
            payload: payload.to_vec(),
        });
        Ok(())
    }

    // ── Backup / restore ─────────────────────────────────────────

    /// Exports a plain-data JSON snapshot of all four collections.
    ///
    /// The snapshot is human-inspectable and engine-agnostic; it is the
    /// format the surrounding application uses for manual export and for
    /// the snapshot-before-clear recovery path.
    #[must_use]
    pub fn export_json(&self) -> JsonValue {
        let txn = self.doc.transact();
        json!({
            "playlists": read_list_json(&self.playlists, &txn),
            "history": read_list_json(&self.history, &txn),
            "subscriptions": read_list_json(&self.subscriptions, &txn),
            "preferences": read_map_json(&self.preferences, &txn),
        })
    }

    /// Appends the contents of a JSON snapshot back into the store.
    /// Returns the number of collection entries imported.
    pub fn import_json(&self, snapshot: &JsonValue) -> StoreResult<usize> {
        let obj = snapshot
            .as_object()
            .ok_or_else(|| StoreError::InvalidSnapshot("expected a JSON object".to_string()))?;

        let playlists = snapshot_list(obj.get("playlists"))?;
        let history = snapshot_list(obj.get("history"))?;
        let subscriptions = snapshot_list(obj.get("subscriptions"))?;
        let preferences = match obj.get("preferences") {
            None | Some(JsonValue::Null) => serde_json::Map::new(),
            Some(JsonValue::Object(map)) => map.clone(),
            Some(other) => {
                return Err(StoreError::InvalidSnapshot(format!(
                    "preferences must be an object, got {other}"
                )));
            }
        };

        let imported = self.commit(UpdateOrigin::Local, |txn| {
            let mut count = 0;
            for entry in &playlists {
                self.playlists.push_back(txn, json_to_any(entry));
                count += 1;
            }
            for entry in &history {
                self.history.push_back(txn, json_to_any(entry));
                count += 1;
            }
            let existing: Vec<String> = read_string_list(&self.subscriptions, txn);
            for entry in &subscriptions {
                if let JsonValue::String(channel) = entry {
                    if !existing.iter().any(|c| c == channel) {
                        self.subscriptions.push_back(txn, json_to_any(entry));
                        count += 1;
                    }
                }
            }
            for (key, value) in &preferences {
                self.preferences
                    .insert(txn, key.as_str(), json_to_any(value));
            }
            count
        });

        debug!(imported, "restored snapshot into replicated store");
        Ok(imported)
    }

    /// Removes every entry from all four collections.
    ///
    /// This is the "dangerous clear" recovery path; callers snapshot first
    /// via [`ReplicatedStore::export_json`].
    pub fn clear(&self) {
        self.commit(UpdateOrigin::Local, |txn| {
            for list in [&self.playlists, &self.history, &self.subscriptions] {
                let len = list.len(txn);
                if len > 0 {
                    list.remove_range(txn, 0, len);
                }
            }
            for key in preference_keys() {
                self.preferences.remove(txn, key.as_str());
            }
        });
    }
}

impl Default for ReplicatedStore {
    fn default() -> Self {
        Self::new()
    }
}

fn snapshot_list(value: Option<&JsonValue>) -> StoreResult<Vec<JsonValue>> {
    match value {
        None | Some(JsonValue::Null) => Ok(Vec::new()),
        Some(JsonValue::Array(items)) => Ok(items.clone()),
        Some(other) => Err(StoreError::InvalidSnapshot(format!(
            "expected an array, got {other}"
        ))),
    }
}

fn read_list_json<T: ReadTxn>(list: &ArrayRef, txn: &T) -> Vec<JsonValue> {
    let mut out = Vec::with_capacity(list.len(txn) as usize);
    for i in 0..list.len(txn) {
        if let Some(Out::Any(any)) = list.get(txn, i) {
            out.push(any_to_json(&any));
        }
    }
    out
}

fn read_map_json<T: ReadTxn>(map: &MapRef, txn: &T) -> JsonValue {
    let mut out = serde_json::Map::new();
    for key in preference_keys() {
        if let Some(Out::Any(any)) = map.get(txn, key.as_str()) {
            out.insert(key, any_to_json(&any));
        }
    }
    JsonValue::Object(out)
}

pub(crate) fn read_string_list<T: ReadTxn>(list: &ArrayRef, txn: &T) -> Vec<String> {
    let mut out = Vec::with_capacity(list.len(txn) as usize);
    for i in 0..list.len(txn) {
        if let Some(Out::Any(Any::String(s))) = list.get(txn, i) {
            out.push(s.to_string());
        }
    }
    out
}
