//! Generic CRUD/query operations over one named collection.
//!
//! A [`Repository`] is parameterized by entity type; the entity's `Record`
//! impl names its home collection at compile time, so there is no runtime
//! collection lookup and no dynamically typed access.
//!
//! Two disciplines hold across every operation:
//!
//! - Reads return owned, independent values, deserialized fresh from the
//!   document. Callers can never obtain a live reference into the store, so
//!   they cannot bypass change tracking by mutating a returned object.
//! - Each mutating call commits exactly one transaction per logical step
//!   (one for single-item calls, one per batch for bulk calls), which means
//!   exactly one change notification per step and partial visibility of
//!   bulk operations between batches.
//!
//! Misuse (empty ids, filters that match nothing) is a `None` return, never
//! an error; see the crate docs for the full error posture.

use crate::doc::{ReplicatedStore, UpdateOrigin};
use crate::value::{any_to_json, entry_id, json_to_any};
use reelsync_types::Record;
use serde_json::Value as JsonValue;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, warn};
use yrs::{Any, Array, ArrayRef, Out, ReadTxn, Transact};

/// Number of items written per transaction in bulk operations. A tuning
/// constant: between batches the task yields so large imports never hold
/// the event loop for more than one batch of work.
pub const BATCH_SIZE: usize = 100;

/// A boxed entity predicate.
pub type Filter<T> = Box<dyn Fn(&T) -> bool + Send + Sync>;

/// A shallow JSON-object patch merged onto an entity by `update`/`upsert`.
pub type Patch = serde_json::Map<String, JsonValue>;

/// Optional filter and sort criteria for `find_many`/`find_first`.
#[derive(Default)]
pub struct Query<T> {
    filter: Option<Filter<T>>,
    sort: Option<Box<dyn Fn(&T, &T) -> Ordering + Send + Sync>>,
}

impl<T> Query<T> {
    /// An empty query: matches everything, keeps insertion order.
    #[must_use]
    pub fn new() -> Self {
        Self {
            filter: None,
            sort: None,
        }
    }

    /// Keeps only entities matching the predicate.
    #[must_use]
    pub fn filter(mut self, f: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        self.filter = Some(Box::new(f));
        self
    }

    /// Sorts results with the comparator.
    #[must_use]
    pub fn sort_by(mut self, f: impl Fn(&T, &T) -> Ordering + Send + Sync + 'static) -> Self {
        self.sort = Some(Box::new(f));
        self
    }

    fn matches(&self, item: &T) -> bool {
        self.filter.as_ref().is_none_or(|f| f(item))
    }
}

/// One `update_many` criterion: the id to match and the patch to merge.
pub struct UpdateSpec {
    pub id: String,
    pub data: Patch,
}

impl UpdateSpec {
    /// Creates a criterion.
    pub fn new(id: impl Into<String>, data: Patch) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }
}

/// Generic repository over the collection named by `T::COLLECTION`.
pub struct Repository<T: Record> {
    store: Arc<ReplicatedStore>,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Record> Repository<T> {
    /// Creates a repository bound to the given store.
    pub fn new(store: Arc<ReplicatedStore>) -> Self {
        Self {
            store,
            _entity: PhantomData,
        }
    }

    fn list(&self) -> ArrayRef {
        self.store.list(T::COLLECTION).clone()
    }

    /// Number of entries in the collection, decodable or not.
    #[must_use]
    pub fn len(&self) -> usize {
        let txn = self.store.doc().transact();
        self.store.list(T::COLLECTION).len(&txn) as usize
    }

    /// Whether the collection is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ── Writes ───────────────────────────────────────────────────

    /// Appends an independent copy of the item to the collection.
    pub fn create(&self, item: &T) {
        let Some(any) = encode(item) else { return };
        let list = self.list();
        self.store.commit(UpdateOrigin::Local, |txn| {
            list.push_back(txn, any);
        });
    }

    /// Inserts items in batches of [`BATCH_SIZE`], yielding to the runtime
    /// between batches and reporting the cumulative count after each one.
    ///
    /// Insertion order is preserved and the whole input is inserted exactly
    /// once; other readers observe partial progress between batches.
    pub async fn create_many(&self, items: &[T], mut on_progress: impl FnMut(usize)) {
        let list = self.list();
        let mut processed = 0;
        for chunk in items.chunks(BATCH_SIZE) {
            let encoded: Vec<Any> = chunk.iter().filter_map(encode).collect();
            self.store.commit(UpdateOrigin::Local, |txn| {
                for any in encoded {
                    list.push_back(txn, any);
                }
            });
            processed += chunk.len();
            on_progress(processed);
            tokio::task::yield_now().await;
        }
        debug!(count = processed, "bulk insert finished");
    }

    /// Merges the patch onto the entity with the given id, if found, else
    /// inserts the patch as a new entity (the caller guarantees it is a
    /// complete record in that case).
    pub fn upsert(&self, id: &str, data: &Patch) {
        if id.is_empty() {
            return;
        }
        if self.apply_patch(id, data).is_some() {
            return;
        }
        let list = self.list();
        let any = json_to_any(&JsonValue::Object(data.clone()));
        self.store.commit(UpdateOrigin::Local, |txn| {
            list.push_back(txn, any);
        });
    }

    /// Update-or-insert for each item by id, with the batching and yielding
    /// discipline of [`Repository::create_many`]. Progress is reported as
    /// `(processed, total)`.
    pub async fn upsert_many(&self, items: &[T], mut on_progress: impl FnMut(usize, usize)) {
        let list = self.list();
        let total = items.len();
        let mut processed = 0;
        for chunk in items.chunks(BATCH_SIZE) {
            self.store.commit(UpdateOrigin::Local, |txn| {
                for item in chunk {
                    let Some(any) = encode(item) else { continue };
                    let existing = item.id().and_then(|id| position_by_id(&list, txn, id));
                    match existing {
                        Some(i) => {
                            list.remove(txn, i);
                            list.insert(txn, i, any);
                        }
                        None => {
                            list.push_back(txn, any);
                        }
                    }
                }
            });
            processed += chunk.len();
            on_progress(processed, total);
            tokio::task::yield_now().await;
        }
    }

    /// Merges the patch onto the entity with the given id. Returns the
    /// updated entity, or `None` (leaving the collection untouched) when
    /// the id is absent or matches nothing.
    pub fn update(&self, id: &str, data: &Patch) -> Option<T> {
        let merged = self.apply_patch(id, data)?;
        decode_json(merged)
    }

    /// Applies each criterion independently, in order. Returns how many
    /// matched, or `None` when nothing matched at all.
    pub fn update_many(&self, criteria: &[UpdateSpec]) -> Option<usize> {
        if criteria.is_empty() {
            return None;
        }
        let updated = criteria
            .iter()
            .filter(|spec| self.apply_patch(&spec.id, &spec.data).is_some())
            .count();
        if updated == 0 { None } else { Some(updated) }
    }

    /// Removes every entity matching the filter. Returns the count removed,
    /// or `None` if nothing matched.
    pub fn delete(&self, filter: impl Fn(&T) -> bool) -> Option<usize> {
        let removed = self.delete_matching(&filter);
        if removed == 0 { None } else { Some(removed) }
    }

    /// Applies each filter independently. Returns the total count removed,
    /// or `None` if nothing matched across all filters.
    pub fn delete_many(&self, filters: &[Filter<T>]) -> Option<usize> {
        if filters.is_empty() {
            return None;
        }
        let removed: usize = filters.iter().map(|f| self.delete_matching(f)).sum();
        if removed == 0 { None } else { Some(removed) }
    }

    /// Drops every entry whose id was already seen earlier in the
    /// collection, keeping the first occurrence. Returns the count removed.
    ///
    /// Exists to repair duplicate insertions after a merge of concurrent
    /// inserts on different replicas: the engine merges lists structurally,
    /// not by application-level identity. Idempotent.
    pub fn remove_duplicates(&self) -> usize {
        let list = self.list();
        let removed = self.store.commit(UpdateOrigin::Local, |txn| {
            let mut seen: HashSet<String> = HashSet::new();
            let mut removed = 0;
            let mut i = 0;
            while i < list.len(txn) {
                let id = list.get(txn, i).and_then(|out| match out {
                    Out::Any(any) => entry_id(&any).map(str::to_owned),
                    _ => None,
                });
                match id {
                    Some(id) => {
                        if seen.insert(id) {
                            i += 1;
                        } else {
                            list.remove(txn, i);
                            removed += 1;
                        }
                    }
                    None => i += 1,
                }
            }
            removed
        });
        if removed > 0 {
            debug!(removed, "dropped duplicate entries after merge");
        }
        removed
    }

    // ── Reads ────────────────────────────────────────────────────

    /// Returns an independent copy of the entity with the given id, or
    /// `None` when the id is empty or matches nothing.
    #[must_use]
    pub fn find_unique(&self, id: &str) -> Option<T> {
        if id.is_empty() {
            return None;
        }
        let list = self.list();
        let txn = self.store.doc().transact();
        let i = position_by_id(&list, &txn, id)?;
        match list.get(&txn, i) {
            Some(Out::Any(any)) => decode_json(any_to_json(&any)),
            _ => None,
        }
    }

    /// Returns independent copies of every entity matching the query, in
    /// insertion order unless sorted. `None` when the result set is empty.
    #[must_use]
    pub fn find_many(&self, query: &Query<T>) -> Option<Vec<T>> {
        let mut items: Vec<T> = self
            .read_all()
            .into_iter()
            .filter(|item| query.matches(item))
            .collect();
        if let Some(sort) = &query.sort {
            items.sort_by(|a, b| sort(a, b));
        }
        if items.is_empty() { None } else { Some(items) }
    }

    /// Returns the first entity matching the query, or `None`.
    #[must_use]
    pub fn find_first(&self, query: &Query<T>) -> Option<T> {
        self.read_all()
            .into_iter()
            .find(|item| query.matches(item))
    }

    // ── Internals ────────────────────────────────────────────────

    fn read_all(&self) -> Vec<T> {
        let list = self.list();
        let txn = self.store.doc().transact();
        let mut out = Vec::with_capacity(list.len(&txn) as usize);
        for i in 0..list.len(&txn) {
            if let Some(Out::Any(any)) = list.get(&txn, i) {
                if let Some(item) = decode_json(any_to_json(&any)) {
                    out.push(item);
                }
            }
        }
        out
    }

    /// Shallow-merges `data` onto the stored entity with the given id.
    /// Returns the merged JSON when the id matched, `None` otherwise.
    fn apply_patch(&self, id: &str, data: &Patch) -> Option<JsonValue> {
        if id.is_empty() {
            return None;
        }
        let list = self.list();
        self.store.commit(UpdateOrigin::Local, |txn| {
            let i = position_by_id(&list, txn, id)?;
            let current = match list.get(txn, i) {
                Some(Out::Any(any)) => any_to_json(&any),
                _ => return None,
            };
            let merged = shallow_merge(current, data);
            list.remove(txn, i);
            list.insert(txn, i, json_to_any(&merged));
            Some(merged)
        })
    }

    fn delete_matching(&self, filter: &(impl Fn(&T) -> bool + ?Sized)) -> usize {
        let list = self.list();
        self.store.commit(UpdateOrigin::Local, |txn| {
            let mut indices = Vec::new();
            for i in 0..list.len(txn) {
                if let Some(Out::Any(any)) = list.get(txn, i) {
                    if let Some(item) = decode_json::<T>(any_to_json(&any)) {
                        if filter(&item) {
                            indices.push(i);
                        }
                    }
                }
            }
            for &i in indices.iter().rev() {
                list.remove(txn, i);
            }
            indices.len()
        })
    }
}

/// Fields in `data` overwrite, fields not present are preserved. Nested
/// objects are replaced wholesale, not merged.
fn shallow_merge(base: JsonValue, data: &Patch) -> JsonValue {
    let mut merged = match base {
        JsonValue::Object(map) => map,
        _ => serde_json::Map::new(),
    };
    for (key, value) in data {
        merged.insert(key.clone(), value.clone());
    }
    JsonValue::Object(merged)
}

fn position_by_id<Txn: ReadTxn>(list: &ArrayRef, txn: &Txn, id: &str) -> Option<u32> {
    (0..list.len(txn)).find(|&i| match list.get(txn, i) {
        Some(Out::Any(any)) => entry_id(&any) == Some(id),
        _ => false,
    })
}

fn encode<T: Record>(item: &T) -> Option<Any> {
    match serde_json::to_value(item) {
        Ok(value) => Some(json_to_any(&value)),
        Err(e) => {
            warn!("entity failed to serialize, skipping write: {e}");
            None
        }
    }
}

fn decode_json<T: Record>(value: JsonValue) -> Option<T> {
    match serde_json::from_value(value) {
        Ok(item) => Some(item),
        Err(e) => {
            warn!("stored entity failed to deserialize, skipping: {e}");
            None
        }
    }
}
