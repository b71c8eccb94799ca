//! Identity map: one managed instance per persisted identity.
//!
//! Entries are keyed by [`ObjectKey`] (hierarchy root plus identity), so a
//! `Cat` and an `Animal` with the same id are the same document. Each entry
//! keeps the stored document the object was last synchronized with; the
//! change tracker diffs against it at flush time.

use crate::ObjectKey;
use docmodel_core::{AnyEntity, Document};
use docmodel_mapping::MappingId;
use std::collections::HashMap;

/// A managed object and its last synchronized state.
#[derive(Debug, Clone)]
pub struct ManagedEntry {
    pub object: AnyEntity,
    /// Concrete mapping of the object
    pub mapping: MappingId,
    /// Stored form at load or last flush; `None` until first inserted
    pub snapshot: Option<Document>,
}

impl ManagedEntry {
    pub fn new(object: AnyEntity, mapping: MappingId, snapshot: Option<Document>) -> Self {
        Self {
            object,
            mapping,
            snapshot,
        }
    }
}

/// Map from object key to managed entry.
#[derive(Debug, Default)]
pub struct IdentityMap {
    entries: HashMap<ObjectKey, ManagedEntry>,
}

impl IdentityMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entry, returning the one it replaced.
    pub fn insert(&mut self, key: ObjectKey, entry: ManagedEntry) -> Option<ManagedEntry> {
        self.entries.insert(key, entry)
    }

    pub fn get(&self, key: &ObjectKey) -> Option<&ManagedEntry> {
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &ObjectKey) -> Option<&mut ManagedEntry> {
        self.entries.get_mut(key)
    }

    pub fn contains(&self, key: &ObjectKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Whether `object` is the instance registered under `key`.
    pub fn is_registered(&self, key: &ObjectKey, object: &AnyEntity) -> bool {
        self.entries
            .get(key)
            .is_some_and(|entry| entry.object.ptr_eq(object))
    }

    pub fn remove(&mut self, key: &ObjectKey) -> Option<ManagedEntry> {
        self.entries.remove(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &ObjectKey> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ObjectKey, &ManagedEntry)> {
        self.entries.iter()
    }

    /// Remove every entry, returning the keys that were managed.
    pub fn drain_keys(&mut self) -> Vec<ObjectKey> {
        self.entries.drain().map(|(key, _)| key).collect()
    }
}
