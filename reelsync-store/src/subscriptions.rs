//! The subscription set.
//!
//! Subscriptions are plain channel identifiers with set semantics: order is
//! irrelevant and duplicates are refused on insert. Stored as a list because
//! that is the collection shape the document engine replicates; the set
//! discipline lives here.

use crate::doc::{ReplicatedStore, UpdateOrigin, read_string_list};
use crate::value::json_to_any;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use yrs::{Any, Array, Out, Transact};

/// Handle for the subscribed-channels collection.
pub struct Subscriptions {
    store: Arc<ReplicatedStore>,
}

impl Subscriptions {
    /// Creates a handle bound to the given store.
    pub fn new(store: Arc<ReplicatedStore>) -> Self {
        Self { store }
    }

    /// Returns every subscribed channel.
    #[must_use]
    pub fn all(&self) -> Vec<String> {
        let txn = self.store.doc().transact();
        read_string_list(self.store.subscriptions_ref(), &txn)
    }

    /// Whether the channel is subscribed.
    #[must_use]
    pub fn contains(&self, channel: &str) -> bool {
        self.all().iter().any(|c| c == channel)
    }

    /// Number of subscribed channels.
    #[must_use]
    pub fn len(&self) -> usize {
        let txn = self.store.doc().transact();
        self.store.subscriptions_ref().len(&txn) as usize
    }

    /// Whether no channels are subscribed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Subscribes to a channel. Returns false if it was already present.
    pub fn add(&self, channel: &str) -> bool {
        if channel.is_empty() || self.contains(channel) {
            return false;
        }
        let list = self.store.subscriptions_ref().clone();
        self.store.commit(UpdateOrigin::Local, |txn| {
            list.push_back(txn, json_to_any(&JsonValue::String(channel.to_string())));
        });
        true
    }

    /// Subscribes to every channel not already present.
    /// Returns the number added.
    pub fn add_many(&self, channels: &[String]) -> usize {
        let list = self.store.subscriptions_ref().clone();
        self.store.commit(UpdateOrigin::Local, |txn| {
            let mut existing = read_string_list(&list, txn);
            let mut added = 0;
            for channel in channels {
                if channel.is_empty() || existing.iter().any(|c| c == channel) {
                    continue;
                }
                list.push_back(txn, json_to_any(&JsonValue::String(channel.clone())));
                existing.push(channel.clone());
                added += 1;
            }
            added
        })
    }

    /// Unsubscribes from a channel. Returns false if it was not present.
    pub fn remove(&self, channel: &str) -> bool {
        let list = self.store.subscriptions_ref().clone();
        self.store.commit(UpdateOrigin::Local, |txn| {
            let len = list.len(txn);
            for i in 0..len {
                if let Some(Out::Any(Any::String(s))) = list.get(txn, i) {
                    if s.as_ref() == channel {
                        list.remove(txn, i);
                        return true;
                    }
                }
            }
            false
        })
    }

    /// Unsubscribes from every channel matching the predicate.
    /// Returns the number removed.
    pub fn remove_matching(&self, predicate: impl Fn(&str) -> bool) -> usize {
        let list = self.store.subscriptions_ref().clone();
        self.store.commit(UpdateOrigin::Local, |txn| {
            let mut indices = Vec::new();
            for i in 0..list.len(txn) {
                if let Some(Out::Any(Any::String(s))) = list.get(txn, i) {
                    if predicate(s.as_ref()) {
                        indices.push(i);
                    }
                }
            }
            for &i in indices.iter().rev() {
                list.remove(txn, i);
            }
            indices.len()
        })
    }

    /// Unsubscribes from everything.
    pub fn clear(&self) {
        let list = self.store.subscriptions_ref().clone();
        self.store.commit(UpdateOrigin::Local, |txn| {
            let len = list.len(txn);
            if len > 0 {
                list.remove_range(txn, 0, len);
            }
        });
    }
}
