//! Storage driver abstraction.
//!
//! A [`Driver`] executes the write batches a unit of work produces during
//! flush. It is the only place documents leave the process. Every operation
//! takes a `Cx` so callers can cancel or time out a flush through asupersync.

use crate::value::{Document, Identity};
use asupersync::{Cx, Outcome};
use std::fmt;

/// A database/collection pair a batch is sent to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionRef {
    pub database: Option<String>,
    pub collection: String,
}

impl CollectionRef {
    pub fn new(database: Option<String>, collection: impl Into<String>) -> Self {
        Self {
            database,
            collection: collection.into(),
        }
    }
}

impl fmt::Display for CollectionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.database {
            Some(db) => write!(f, "{}.{}", db, self.collection),
            None => write!(f, "{}", self.collection),
        }
    }
}

/// Optimistic concurrency guard for one update.
///
/// The update only applies when the stored `field` equals `expected`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionGuard {
    pub field: String,
    pub expected: i64,
}

/// A partial update of one stored document.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentUpdate {
    /// Primary key of the target document
    pub identity: Identity,
    /// Fields to overwrite
    pub set: Document,
    /// Fields to remove
    pub unset: Vec<String>,
    pub guard: Option<VersionGuard>,
}

impl DocumentUpdate {
    pub fn new(identity: Identity) -> Self {
        Self {
            identity,
            set: Document::new(),
            unset: Vec::new(),
            guard: None,
        }
    }

    /// Whether applying this update changes nothing.
    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.unset.is_empty()
    }
}

/// Executes write batches against a document store.
///
/// Each batch targets exactly one collection. A batch either succeeds as a
/// whole or fails as a whole from the caller's point of view.
pub trait Driver: Send + Sync {
    /// Generate a fresh primary key for a new document.
    fn create_identity(&self) -> Identity;

    /// Insert documents; returns the number inserted.
    fn insert_many(
        &self,
        cx: &Cx,
        collection: &CollectionRef,
        documents: Vec<Document>,
    ) -> impl Future<Output = Outcome<u64, crate::Error>> + Send;

    /// Apply updates; returns the number of documents matched.
    ///
    /// Guarded updates whose version does not match are not applied and do
    /// not count as matched.
    fn update_many(
        &self,
        cx: &Cx,
        collection: &CollectionRef,
        updates: Vec<DocumentUpdate>,
    ) -> impl Future<Output = Outcome<u64, crate::Error>> + Send;

    /// Delete documents by primary key; returns the number deleted.
    fn delete_many(
        &self,
        cx: &Cx,
        collection: &CollectionRef,
        identities: Vec<Identity>,
    ) -> impl Future<Output = Outcome<u64, crate::Error>> + Send;
}
