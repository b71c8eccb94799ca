//! In-memory document store implementing [`Driver`].
//!
//! Documents live in per-collection maps keyed by identity. Clones share
//! storage, so a test can hand one clone to a unit of work and inspect the
//! store through another.

use docmodel_core::{
    CollectionRef, Cx, Document, DocumentUpdate, Driver, DriverError, DriverErrorKind, Error,
    FlushOperation, Identity, Outcome, Result,
};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, RwLock};

type Collections = HashMap<CollectionRef, BTreeMap<Identity, Document>>;

/// One batch the driver received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRecord {
    pub operation: FlushOperation,
    pub collection: CollectionRef,
    pub documents: usize,
}

#[derive(Clone)]
pub struct MemoryDriver {
    collections: Arc<RwLock<Collections>>,
    batches: Arc<RwLock<Vec<BatchRecord>>>,
    fail_on: Arc<RwLock<Option<(FlushOperation, Error)>>>,
    next_identity: Arc<AtomicI64>,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self {
            collections: Arc::new(RwLock::new(HashMap::new())),
            batches: Arc::new(RwLock::new(Vec::new())),
            fail_on: Arc::new(RwLock::new(None)),
            next_identity: Arc::new(AtomicI64::new(1)),
        }
    }

    /// Store a document directly, bypassing any unit of work.
    pub fn seed(&self, collection: &CollectionRef, document: Document) -> Result<()> {
        let identity = document_identity(&document)?;
        let mut collections = self
            .collections
            .write()
            .map_err(|_| Error::LockPoisoned("collections write"))?;
        collections
            .entry(collection.clone())
            .or_default()
            .insert(identity, document);
        Ok(())
    }

    pub fn get(&self, collection: &CollectionRef, identity: &Identity) -> Result<Option<Document>> {
        let collections = self
            .collections
            .read()
            .map_err(|_| Error::LockPoisoned("collections read"))?;
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.get(identity))
            .cloned())
    }

    /// All documents of a collection, ordered by identity.
    pub fn documents(&self, collection: &CollectionRef) -> Result<Vec<Document>> {
        let collections = self
            .collections
            .read()
            .map_err(|_| Error::LockPoisoned("collections read"))?;
        Ok(collections
            .get(collection)
            .map(|docs| docs.values().cloned().collect())
            .unwrap_or_default())
    }

    pub fn count(&self, collection: &CollectionRef) -> Result<usize> {
        Ok(self.documents(collection)?.len())
    }

    /// Batches received so far, in order.
    pub fn batches(&self) -> Result<Vec<BatchRecord>> {
        let batches = self
            .batches
            .read()
            .map_err(|_| Error::LockPoisoned("batches read"))?;
        Ok(batches.clone())
    }

    /// Fail the next batch of `operation` with `error`.
    pub fn fail_next(&self, operation: FlushOperation, error: Error) -> Result<()> {
        let mut fail_on = self
            .fail_on
            .write()
            .map_err(|_| Error::LockPoisoned("failure injection write"))?;
        *fail_on = Some((operation, error));
        Ok(())
    }

    fn begin(
        &self,
        cx: &Cx,
        operation: FlushOperation,
        collection: &CollectionRef,
        documents: usize,
    ) -> Outcome<(), Error> {
        if let Some(reason) = cx.cancel_reason() {
            return Outcome::Cancelled(reason);
        }
        let injected = match self.fail_on.write() {
            Ok(mut fail_on) => {
                if fail_on.as_ref().is_some_and(|(op, _)| *op == operation) {
                    fail_on.take().map(|(_, error)| error)
                } else {
                    None
                }
            }
            Err(_) => return Outcome::Err(Error::LockPoisoned("failure injection write")),
        };
        if let Some(error) = injected {
            tracing::debug!(operation = operation.as_str(), %collection, "Injected failure");
            return Outcome::Err(error);
        }

        match self.batches.write() {
            Ok(mut batches) => {
                batches.push(BatchRecord {
                    operation,
                    collection: collection.clone(),
                    documents,
                });
                Outcome::Ok(())
            }
            Err(_) => Outcome::Err(Error::LockPoisoned("batches write")),
        }
    }

    fn apply_inserts(&self, collection: &CollectionRef, documents: Vec<Document>) -> Result<u64> {
        let mut collections = self
            .collections
            .write()
            .map_err(|_| Error::LockPoisoned("collections write"))?;
        let stored = collections.entry(collection.clone()).or_default();

        let mut keyed = Vec::with_capacity(documents.len());
        for document in documents {
            let identity = document_identity(&document)?;
            if stored.contains_key(&identity) || keyed.iter().any(|(id, _)| *id == identity) {
                return Err(Error::Driver(DriverError::new(
                    DriverErrorKind::DuplicateKey,
                    format!("duplicate key {} in {}", identity, collection),
                )));
            }
            keyed.push((identity, document));
        }

        let count = keyed.len() as u64;
        stored.extend(keyed);
        Ok(count)
    }

    fn apply_updates(
        &self,
        collection: &CollectionRef,
        updates: Vec<DocumentUpdate>,
    ) -> Result<u64> {
        let mut collections = self
            .collections
            .write()
            .map_err(|_| Error::LockPoisoned("collections write"))?;
        let Some(stored) = collections.get_mut(collection) else {
            return Ok(0);
        };

        let mut matched = 0;
        for update in updates {
            let Some(document) = stored.get_mut(&update.identity) else {
                continue;
            };
            if let Some(guard) = &update.guard {
                let version = document
                    .get(&guard.field)
                    .and_then(serde_json::Value::as_i64)
                    .unwrap_or(0);
                if version != guard.expected {
                    tracing::debug!(
                        identity = %update.identity,
                        expected = guard.expected,
                        found = version,
                        "Version guard rejected update"
                    );
                    continue;
                }
            }
            document.extend(update.set);
            for field in &update.unset {
                document.remove(field);
            }
            matched += 1;
        }
        Ok(matched)
    }

    fn apply_deletes(&self, collection: &CollectionRef, identities: &[Identity]) -> Result<u64> {
        let mut collections = self
            .collections
            .write()
            .map_err(|_| Error::LockPoisoned("collections write"))?;
        let Some(stored) = collections.get_mut(collection) else {
            return Ok(0);
        };
        Ok(identities
            .iter()
            .filter(|identity| stored.remove(*identity).is_some())
            .count() as u64)
    }
}

impl Default for MemoryDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryDriver")
            .field("next_identity", &self.next_identity.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Driver for MemoryDriver {
    fn create_identity(&self) -> Identity {
        Identity::Int(self.next_identity.fetch_add(1, Ordering::Relaxed))
    }

    fn insert_many(
        &self,
        cx: &Cx,
        collection: &CollectionRef,
        documents: Vec<Document>,
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        let outcome = match self.begin(cx, FlushOperation::Insert, collection, documents.len()) {
            Outcome::Ok(()) => into_outcome(self.apply_inserts(collection, documents)),
            Outcome::Err(e) => Outcome::Err(e),
            Outcome::Cancelled(r) => Outcome::Cancelled(r),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        };
        async move { outcome }
    }

    fn update_many(
        &self,
        cx: &Cx,
        collection: &CollectionRef,
        updates: Vec<DocumentUpdate>,
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        let outcome = match self.begin(cx, FlushOperation::Update, collection, updates.len()) {
            Outcome::Ok(()) => into_outcome(self.apply_updates(collection, updates)),
            Outcome::Err(e) => Outcome::Err(e),
            Outcome::Cancelled(r) => Outcome::Cancelled(r),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        };
        async move { outcome }
    }

    fn delete_many(
        &self,
        cx: &Cx,
        collection: &CollectionRef,
        identities: Vec<Identity>,
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        let outcome = match self.begin(cx, FlushOperation::Delete, collection, identities.len()) {
            Outcome::Ok(()) => into_outcome(self.apply_deletes(collection, &identities)),
            Outcome::Err(e) => Outcome::Err(e),
            Outcome::Cancelled(r) => Outcome::Cancelled(r),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        };
        async move { outcome }
    }
}

fn document_identity(document: &Document) -> Result<Identity> {
    document
        .get("_id")
        .and_then(Identity::from_json)
        .ok_or_else(|| {
            Error::Driver(DriverError::new(
                DriverErrorKind::Write,
                "document has no _id field",
            ))
        })
}

fn into_outcome(result: Result<u64>) -> Outcome<u64, Error> {
    match result {
        Ok(count) => Outcome::Ok(count),
        Err(e) => Outcome::Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asupersync::runtime::RuntimeBuilder;
    use docmodel_core::VersionGuard;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Document {
        match value {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn unwrap_outcome<T: std::fmt::Debug>(outcome: Outcome<T, Error>) -> T {
        match outcome {
            Outcome::Ok(v) => v,
            other => std::panic::panic_any(format!("unexpected outcome: {other:?}")),
        }
    }

    #[test]
    fn test_identities_are_unique() {
        let driver = MemoryDriver::new();
        assert_ne!(driver.create_identity(), driver.create_identity());
    }

    #[test]
    fn test_duplicate_insert_rejects_whole_batch() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let driver = MemoryDriver::new();
        let heroes = CollectionRef::new(None, "heroes");
        driver.seed(&heroes, doc(json!({"_id": 1}))).unwrap();

        rt.block_on(async {
            let outcome = driver
                .insert_many(&cx, &heroes, vec![doc(json!({"_id": 2})), doc(json!({"_id": 1}))])
                .await;
            match outcome {
                Outcome::Err(Error::Driver(e)) => assert_eq!(e.kind, DriverErrorKind::DuplicateKey),
                other => panic!("unexpected outcome: {other:?}"),
            }
        });
        assert_eq!(driver.count(&heroes).unwrap(), 1);
    }

    #[test]
    fn test_guarded_update_matches_only_current_version() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let driver = MemoryDriver::new();
        let heroes = CollectionRef::new(None, "heroes");
        driver
            .seed(&heroes, doc(json!({"_id": 1, "name": "a", "__v": 2})))
            .unwrap();

        let mut stale = DocumentUpdate::new(Identity::Int(1));
        stale.set = doc(json!({"name": "stale"}));
        stale.guard = Some(VersionGuard {
            field: "__v".to_string(),
            expected: 1,
        });
        let mut fresh = DocumentUpdate::new(Identity::Int(1));
        fresh.set = doc(json!({"name": "fresh", "__v": 3}));
        fresh.unset = vec!["missing".to_string()];
        fresh.guard = Some(VersionGuard {
            field: "__v".to_string(),
            expected: 2,
        });

        rt.block_on(async {
            assert_eq!(unwrap_outcome(driver.update_many(&cx, &heroes, vec![stale]).await), 0);
            assert_eq!(unwrap_outcome(driver.update_many(&cx, &heroes, vec![fresh]).await), 1);
        });
        let stored = driver.get(&heroes, &Identity::Int(1)).unwrap().unwrap();
        assert_eq!(stored.get("name"), Some(&json!("fresh")));
        assert_eq!(stored.get("__v"), Some(&json!(3)));
    }

    #[test]
    fn test_injected_failure_fires_once() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let driver = MemoryDriver::new();
        let heroes = CollectionRef::new(None, "heroes");
        driver
            .fail_next(FlushOperation::Delete, Error::Custom("boom".to_string()))
            .unwrap();

        rt.block_on(async {
            let first = driver.delete_many(&cx, &heroes, vec![Identity::Int(1)]).await;
            assert!(matches!(first, Outcome::Err(Error::Custom(_))));
            let second = driver.delete_many(&cx, &heroes, vec![Identity::Int(1)]).await;
            assert_eq!(unwrap_outcome(second), 0);
        });
        assert_eq!(driver.batches().unwrap().len(), 1);
    }
}
