//! Document-backed map
//!
//! A string-keyed map whose entries are the top-level fields of one JSON
//! document. No client-side lock is taken: `put` and `remove` run the
//! optimistic retry engine against CAS-guarded field writes, and `clear`
//! overwrites the whole document unconditionally.

use std::collections::{btree_map, BTreeMap};
use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::config::Config;
use crate::error::{KvError, Result};
use crate::retry::GuardedUpdate;
use super::path::field_path;
use super::store::DocumentStore;

/// Map of `String` to `V` stored in document `id`
pub struct DocumentMap<V, S: DocumentStore + ?Sized> {
    id: String,
    store: Arc<S>,
    config: Config,
    _values: PhantomData<fn() -> V>,
}

impl<V, S> DocumentMap<V, S>
where
    V: Serialize + DeserializeOwned,
    S: DocumentStore + ?Sized,
{
    /// Bind to document `id`, creating it empty if absent.
    ///
    /// Concurrent openers racing to create the same document all succeed.
    pub fn open(id: impl Into<String>, store: Arc<S>, config: Config) -> Result<Self> {
        let id = id.into();
        match store.insert(&id, &Value::Object(Map::new())) {
            Ok(cas) => debug!(document = %id, cas, "created backing document"),
            Err(KvError::DocumentExists { .. }) => {
                debug!(document = %id, "backing document already exists")
            }
            Err(e) => return Err(e),
        }
        Ok(Self {
            id,
            store,
            config,
            _values: PhantomData,
        })
    }

    /// Id of the backing document
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Insert or replace `key`, returning the previous value
    pub fn put(&self, key: &str, value: &V) -> Result<Option<V>> {
        let path = checked_path(key)?;
        let encoded = serde_json::to_value(value)?;

        let previous = GuardedUpdate::from_config("put", &self.config).run(
            || self.store.lookup_field(&self.id, &path),
            |_current| encoded.clone(),
            |next, cas| {
                self.store
                    .upsert_field(&self.id, &path, &next, cas)
                    .map(|_| ())
            },
        )?;

        decode(previous)
    }

    /// Current value of `key`
    pub fn get(&self, key: &str) -> Result<Option<V>> {
        let path = checked_path(key)?;
        let current = self.store.lookup_field(&self.id, &path)?;
        decode(current.value)
    }

    /// Remove `key`, returning the value it held
    pub fn remove(&self, key: &str) -> Result<Option<V>> {
        let path = checked_path(key)?;

        let previous = GuardedUpdate::from_config("remove", &self.config)
            .missing_path_is_absent()
            .run(
                || self.store.lookup_field(&self.id, &path),
                |_current| (),
                |(), cas| self.store.remove_field(&self.id, &path, cas).map(|_| ()),
            )?;

        decode(previous)
    }

    pub fn contains_key(&self, key: &str) -> Result<bool> {
        let path = checked_path(key)?;
        self.store.field_exists(&self.id, &path)
    }

    /// Number of entries, read as the document's field count
    pub fn size(&self) -> Result<usize> {
        Ok(self.store.field_count(&self.id, "")? as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.size()? == 0)
    }

    /// Reset to an empty document, regardless of concurrent writers
    pub fn clear(&self) -> Result<()> {
        self.store.upsert(&self.id, &Value::Object(Map::new()))?;
        Ok(())
    }

    /// Snapshot of every entry at call time
    pub fn entries(&self) -> Result<EntrySnapshot<'_, V, S>> {
        let document = self.store.get(&self.id)?;
        let object = match document.value {
            Value::Object(object) => object,
            _ => return Err(KvError::PathMismatch { path: String::new() }),
        };

        let mut entries = BTreeMap::new();
        for (key, value) in object {
            entries.insert(key, serde_json::from_value(value)?);
        }
        Ok(EntrySnapshot { map: self, entries })
    }
}

/// Entries of a [`DocumentMap`] as of one read.
///
/// Mutations go through the map's CAS-guarded operations first and are
/// mirrored into the snapshot afterwards.
pub struct EntrySnapshot<'a, V, S: DocumentStore + ?Sized> {
    map: &'a DocumentMap<V, S>,
    entries: BTreeMap<String, V>,
}

impl<'a, V, S> EntrySnapshot<'a, V, S>
where
    V: Serialize + DeserializeOwned,
    S: DocumentStore + ?Sized,
{
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.entries.get(key)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, V> {
        self.entries.iter()
    }

    pub fn keys(&self) -> btree_map::Keys<'_, String, V> {
        self.entries.keys()
    }

    /// Remove `key` from the map and the snapshot.
    ///
    /// Keys not in the snapshot are left alone. Returns what the map held.
    pub fn remove(&mut self, key: &str) -> Result<Option<V>> {
        if !self.entries.contains_key(key) {
            return Ok(None);
        }
        let previous = self.map.remove(key)?;
        self.entries.remove(key);
        Ok(previous)
    }

    /// Write `key` through the map, then into the snapshot
    pub fn set(&mut self, key: &str, value: V) -> Result<Option<V>> {
        let previous = self.map.put(key, &value)?;
        self.entries.insert(key.to_string(), value);
        Ok(previous)
    }

    /// Clear the map and the snapshot
    pub fn clear(&mut self) -> Result<()> {
        self.map.clear()?;
        self.entries.clear();
        Ok(())
    }

    pub fn into_map(self) -> BTreeMap<String, V> {
        self.entries
    }
}

impl<'s, 'a, V, S> IntoIterator for &'s EntrySnapshot<'a, V, S>
where
    S: DocumentStore + ?Sized,
{
    type Item = (&'s String, &'s V);
    type IntoIter = btree_map::Iter<'s, String, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

fn checked_path(key: &str) -> Result<String> {
    if key.is_empty() {
        return Err(KvError::InvalidArgument("Unsupported empty key".to_string()));
    }
    Ok(field_path(key))
}

fn decode<V: DeserializeOwned>(value: Option<Value>) -> Result<Option<V>> {
    value
        .map(serde_json::from_value)
        .transpose()
        .map_err(KvError::from)
}
