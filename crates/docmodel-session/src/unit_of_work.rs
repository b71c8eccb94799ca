//! Unit of Work for document sessions.
//!
//! The Unit of Work tracks every object a session touches and writes the
//! accumulated changes on flush:
//! - objects saved while New are scheduled for INSERT
//! - managed objects whose stored form drifted from their snapshot become
//!   UPDATEs (always under implicit tracking, only after an explicit save
//!   under explicit tracking)
//! - removed objects are scheduled for DELETE
//!
//! Object states are derived, not stored: an object is Managed when it is
//! the exact instance registered in the identity map, Removed when it is the
//! instance scheduled for deletion, Detached when its key was managed here
//! but it is not that instance, and New otherwise.
//!
//! A failed flush leaves unexecuted work scheduled; calling flush again
//! resumes from the failed batch.

use crate::ObjectKey;
use crate::change_tracker::ChangeTracker;
use crate::flush::{Batch, FlushPlan, FlushResult, PendingOp};
use crate::identity_map::{IdentityMap, ManagedEntry};
use asupersync::{Cx, Outcome};
use docmodel_core::{
    AnyEntity, ChangeTracking, CollectionRef, Document, DocumentUpdate, Driver, Entity,
    EntityRef, Error, FlushError, FlushOperation, Identity, ObjectState, Result, VersionGuard,
};
use docmodel_mapping::{MappingId, MappingRegistry, TypeMapping, codec};
use serde_json::Value as Json;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Instant;

/// An object scheduled for deletion.
#[derive(Debug, Clone)]
struct ScheduledDelete {
    object: AnyEntity,
    mapping: MappingId,
}

/// Counts of scheduled work.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PendingCounts {
    /// Scheduled inserts.
    pub new: usize,
    /// Updates computed by a flush that has not completed.
    pub dirty: usize,
    /// Scheduled deletes.
    pub deleted: usize,
    /// Explicitly tracked objects awaiting a dirty check.
    pub dirty_checks: usize,
}

impl PendingCounts {
    /// Total number of scheduled write operations.
    #[must_use]
    pub fn total(&self) -> usize {
        self.new + self.dirty + self.deleted
    }

    /// Whether nothing at all is scheduled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total() == 0 && self.dirty_checks == 0
    }
}

/// One logical session over a mapping registry and a driver.
pub struct UnitOfWork<D: Driver> {
    registry: Arc<MappingRegistry>,
    driver: D,
    identity_map: IdentityMap,
    scheduled_insertions: BTreeMap<ObjectKey, MappingId>,
    scheduled_updates: BTreeMap<ObjectKey, PendingOp>,
    scheduled_deletions: BTreeMap<ObjectKey, ScheduledDelete>,
    dirty_checks: BTreeSet<ObjectKey>,
    /// Keys that were managed here and have since left the session.
    detached: HashSet<ObjectKey>,
}

impl<D: Driver> UnitOfWork<D> {
    pub fn new(registry: Arc<MappingRegistry>, driver: D) -> Self {
        Self {
            registry,
            driver,
            identity_map: IdentityMap::new(),
            scheduled_insertions: BTreeMap::new(),
            scheduled_updates: BTreeMap::new(),
            scheduled_deletions: BTreeMap::new(),
            dirty_checks: BTreeSet::new(),
            detached: HashSet::new(),
        }
    }

    pub fn registry(&self) -> &Arc<MappingRegistry> {
        &self.registry
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Number of managed objects.
    pub fn identity_map_len(&self) -> usize {
        self.identity_map.len()
    }

    pub fn pending_counts(&self) -> PendingCounts {
        PendingCounts {
            new: self.scheduled_insertions.len(),
            dirty: self.scheduled_updates.len(),
            deleted: self.scheduled_deletions.len(),
            dirty_checks: self.dirty_checks.len(),
        }
    }

    // ========================================================================
    // Object States
    // ========================================================================

    pub fn state<M: Entity>(&self, object: &EntityRef<M>) -> Result<ObjectState> {
        self.state_any(&AnyEntity::from_ref(object))
    }

    pub fn state_any(&self, object: &AnyEntity) -> Result<ObjectState> {
        let registry = Arc::clone(&self.registry);
        let mapping = document_mapping(&registry, object)?;
        Ok(self.derive_state(mapping, object)?.0)
    }

    /// Whether `object` is managed by this unit of work.
    pub fn contains<M: Entity>(&self, object: &EntityRef<M>) -> Result<bool> {
        Ok(self.state(object)? == ObjectState::Managed)
    }

    fn derive_state(
        &self,
        mapping: &TypeMapping,
        object: &AnyEntity,
    ) -> Result<(ObjectState, Option<ObjectKey>)> {
        let Some(identity) = object.identity()? else {
            return Ok((ObjectState::New, None));
        };
        let key = ObjectKey::new(mapping.root(), identity);

        let state = if self
            .scheduled_deletions
            .get(&key)
            .is_some_and(|scheduled| scheduled.object.ptr_eq(object))
        {
            ObjectState::Removed
        } else if let Some(entry) = self.identity_map.get(&key) {
            if entry.object.ptr_eq(object) {
                ObjectState::Managed
            } else {
                ObjectState::Detached
            }
        } else if self.detached.contains(&key) {
            ObjectState::Detached
        } else {
            ObjectState::New
        };
        Ok((state, Some(key)))
    }

    // ========================================================================
    // Save / Remove
    // ========================================================================

    /// Persist an object on the next flush.
    ///
    /// New objects get an identity (from the driver when they have none)
    /// and become Managed. Saving a Managed object under explicit tracking
    /// schedules it for a dirty check.
    pub fn save<M: Entity>(&mut self, object: &EntityRef<M>) -> Result<()> {
        self.save_any(&AnyEntity::from_ref(object))
    }

    #[tracing::instrument(
        level = "debug",
        skip(self, object),
        fields(type_name = object.type_name())
    )]
    pub fn save_any(&mut self, object: &AnyEntity) -> Result<()> {
        let registry = Arc::clone(&self.registry);
        let mapping = document_mapping(&registry, object)?;

        match self.derive_state(mapping, object)? {
            (ObjectState::New, key) => self.schedule_insert(mapping, object, key),
            (ObjectState::Managed, Some(key)) => {
                if mapping.change_tracking() == ChangeTracking::DeferredExplicit
                    && !self.scheduled_insertions.contains_key(&key)
                    && self.dirty_checks.insert(key)
                {
                    tracing::debug!("Scheduled dirty check");
                }
                Ok(())
            }
            (ObjectState::Detached, Some(key)) => Err(Error::DetachedObject {
                type_name: mapping.name().to_string(),
                identity: key.identity().clone(),
            }),
            (state, _) => Err(Error::InvalidState {
                type_name: mapping.name().to_string(),
                state,
                operation: "save",
            }),
        }
    }

    fn schedule_insert(
        &mut self,
        mapping: &TypeMapping,
        object: &AnyEntity,
        key: Option<ObjectKey>,
    ) -> Result<()> {
        let key = match key {
            Some(key) => key,
            None => {
                let identity = self.driver.create_identity();
                object.assign_identity(identity.clone())?;
                ObjectKey::new(mapping.root(), identity)
            }
        };

        // Another instance with this identity still has work pending.
        if self.scheduled_deletions.contains_key(&key) {
            return Err(Error::InvalidState {
                type_name: mapping.name().to_string(),
                state: ObjectState::Removed,
                operation: "insert",
            });
        }
        if self.scheduled_updates.contains_key(&key) {
            return Err(Error::InvalidState {
                type_name: mapping.name().to_string(),
                state: ObjectState::Managed,
                operation: "insert",
            });
        }

        tracing::debug!(identity = %key.identity(), "Scheduled insert");
        self.identity_map.insert(
            key.clone(),
            ManagedEntry::new(object.clone(), mapping.id(), None),
        );
        self.scheduled_insertions.insert(key, mapping.id());
        Ok(())
    }

    /// Delete an object on the next flush.
    ///
    /// Removing an object whose insert has not been flushed cancels the
    /// insert. Removing a New or already Removed object does nothing.
    pub fn remove<M: Entity>(&mut self, object: &EntityRef<M>) -> Result<()> {
        self.remove_any(&AnyEntity::from_ref(object))
    }

    #[tracing::instrument(
        level = "debug",
        skip(self, object),
        fields(type_name = object.type_name())
    )]
    pub fn remove_any(&mut self, object: &AnyEntity) -> Result<()> {
        let registry = Arc::clone(&self.registry);
        let mapping = document_mapping(&registry, object)?;

        match self.derive_state(mapping, object)? {
            (ObjectState::New | ObjectState::Removed, _) => {
                tracing::trace!("Nothing to remove");
                Ok(())
            }
            (ObjectState::Managed, Some(key)) => {
                self.identity_map.remove(&key);
                self.dirty_checks.remove(&key);
                if self.scheduled_insertions.remove(&key).is_some() {
                    tracing::debug!(identity = %key.identity(), "Cancelled pending insert");
                    return Ok(());
                }
                self.scheduled_updates.remove(&key);
                tracing::debug!(identity = %key.identity(), "Scheduled delete");
                self.scheduled_deletions.insert(
                    key,
                    ScheduledDelete {
                        object: object.clone(),
                        mapping: mapping.id(),
                    },
                );
                Ok(())
            }
            (ObjectState::Detached, Some(key)) => Err(Error::DetachedObject {
                type_name: mapping.name().to_string(),
                identity: key.identity().clone(),
            }),
            (state, None) => Err(Error::InvalidState {
                type_name: mapping.name().to_string(),
                state,
                operation: "remove",
            }),
        }
    }

    // ========================================================================
    // Detach / Clear
    // ========================================================================

    /// Stop tracking an object. Its pending work is dropped.
    pub fn detach<M: Entity>(&mut self, object: &EntityRef<M>) -> Result<()> {
        self.detach_any(&AnyEntity::from_ref(object))
    }

    pub fn detach_any(&mut self, object: &AnyEntity) -> Result<()> {
        let registry = Arc::clone(&self.registry);
        let mapping = document_mapping(&registry, object)?;

        match self.derive_state(mapping, object)? {
            (ObjectState::Managed, Some(key)) => {
                self.identity_map.remove(&key);
                self.scheduled_insertions.remove(&key);
                self.scheduled_updates.remove(&key);
                self.dirty_checks.remove(&key);
                tracing::debug!(identity = %key.identity(), "Detached object");
                self.detached.insert(key);
            }
            (ObjectState::Removed, Some(key)) => {
                self.scheduled_deletions.remove(&key);
                tracing::debug!(identity = %key.identity(), "Detached removed object");
                self.detached.insert(key);
            }
            _ => {}
        }
        Ok(())
    }

    /// Detach every object and drop all scheduled work.
    pub fn clear(&mut self) {
        let mut keys = self.identity_map.drain_keys();
        keys.extend(std::mem::take(&mut self.scheduled_deletions).into_keys());
        tracing::debug!(count = keys.len(), "Cleared unit of work");
        self.detached.extend(keys);
        self.scheduled_insertions.clear();
        self.scheduled_updates.clear();
        self.dirty_checks.clear();
    }

    // ========================================================================
    // Load
    // ========================================================================

    /// Register a stored document as a managed object.
    ///
    /// The concrete type follows the document's discriminator. When the
    /// identity is already managed, the existing instance is returned and
    /// the document is ignored.
    #[tracing::instrument(level = "debug", skip(self, document))]
    pub fn load(&mut self, type_name: &str, document: Document) -> Result<AnyEntity> {
        let registry = Arc::clone(&self.registry);
        let declared = registry.resolve(type_name)?;
        let mapping = codec::concrete_mapping(&registry, declared, &document)?;
        if !mapping.is_document() {
            return Err(Error::UnmappedType(mapping.name().to_string()));
        }

        let identity = document
            .get(mapping.identifier_field())
            .and_then(Identity::from_json)
            .ok_or_else(|| Error::MissingIdentity {
                type_name: mapping.name().to_string(),
            })?;
        let key = ObjectKey::new(mapping.root(), identity.clone());

        if let Some(entry) = self.identity_map.get(&key) {
            tracing::trace!(identity = %identity, "Identity map hit");
            return Ok(entry.object.clone());
        }

        let hydrator = registry
            .hydrator(mapping.name())
            .ok_or_else(|| Error::UnmappedType(mapping.name().to_string()))?;
        let object = hydrator(codec::decode(&registry, mapping, &document)?)?;
        object.assign_identity(identity)?;
        let snapshot = load_snapshot(&registry, mapping, &object, &document)?;

        tracing::debug!(concrete = mapping.name(), identity = %key.identity(), "Loaded object");
        self.detached.remove(&key);
        self.identity_map.insert(
            key,
            ManagedEntry::new(object.clone(), mapping.id(), Some(snapshot)),
        );
        Ok(object)
    }

    /// [`load`](Self::load) as a concrete entity type.
    pub fn load_as<M: Entity>(&mut self, document: Document) -> Result<EntityRef<M>> {
        let object = self.load(M::TYPE_NAME, document)?;
        object.downcast::<M>().ok_or_else(|| Error::TypeMismatch {
            expected: M::TYPE_NAME,
            found: object.type_name().to_string(),
        })
    }

    // ========================================================================
    // Flush
    // ========================================================================

    /// Build the operations the next flush would write.
    ///
    /// Change sets for managed objects are recomputed here, replacing any
    /// updates left over from a failed flush.
    pub fn compute_flush_plan(&mut self) -> Result<FlushPlan> {
        let registry = Arc::clone(&self.registry);
        let mut plan = FlushPlan::new();

        for (key, mapping_id) in &self.scheduled_insertions {
            let Some(entry) = self.identity_map.get(key) else {
                continue;
            };
            let mapping = registry.get(*mapping_id);
            let mut document = codec::encode(&registry, mapping, &entry.object.fields()?)?;
            document.insert(mapping.identifier_field().to_string(), key.identity().to_json());
            if let Some(field) = mapping.version_field().filter(|_| mapping.is_versioned()) {
                document.insert(field.to_string(), Json::from(1));
            }
            plan.inserts.push(PendingOp::Insert {
                key: key.clone(),
                collection: collection_ref(mapping),
                document,
            });
        }

        self.scheduled_updates = self.compute_updates(&registry)?;
        plan.updates = self.scheduled_updates.values().cloned().collect();

        for (key, scheduled) in &self.scheduled_deletions {
            plan.deletes.push(PendingOp::Delete {
                key: key.clone(),
                collection: collection_ref(registry.get(scheduled.mapping)),
            });
        }

        Ok(plan)
    }

    fn compute_updates(
        &mut self,
        registry: &MappingRegistry,
    ) -> Result<BTreeMap<ObjectKey, PendingOp>> {
        let tracker = ChangeTracker::new(registry);
        let mut updates = BTreeMap::new();
        let mut clean = Vec::new();

        for (key, entry) in self.identity_map.iter() {
            if self.scheduled_insertions.contains_key(key)
                || self.scheduled_deletions.contains_key(key)
            {
                continue;
            }
            let mapping = registry.get(entry.mapping);
            let explicit = mapping.change_tracking() == ChangeTracking::DeferredExplicit;
            if mapping.is_immutable() || (explicit && !self.dirty_checks.contains(key)) {
                continue;
            }
            let Some(snapshot) = &entry.snapshot else {
                continue;
            };

            let current = codec::encode(registry, mapping, &entry.object.fields()?)?;
            let changes = tracker.changes(mapping, snapshot, &current);
            if changes.is_empty() {
                if explicit {
                    clean.push(key.clone());
                }
                continue;
            }

            let mut update = DocumentUpdate::new(key.identity().clone());
            update.set = changes.set;
            update.unset = changes.unset;
            if let Some(field) = mapping.version_field().filter(|_| mapping.is_versioned()) {
                let version = snapshot.get(field).and_then(Json::as_i64).unwrap_or(0);
                update.guard = Some(VersionGuard {
                    field: field.to_string(),
                    expected: version,
                });
                update.set.insert(field.to_string(), Json::from(version + 1));
            }

            let mut document = snapshot.clone();
            for (field, value) in &update.set {
                document.insert(field.clone(), value.clone());
            }
            for field in &update.unset {
                document.remove(field);
            }

            updates.insert(
                key.clone(),
                PendingOp::Update {
                    key: key.clone(),
                    collection: collection_ref(mapping),
                    update,
                    document,
                },
            );
        }

        for key in clean {
            self.dirty_checks.remove(&key);
        }
        Ok(updates)
    }

    /// Write all scheduled work through the driver.
    ///
    /// Batches run inserts first, then updates, then deletes. If a batch
    /// fails, earlier batches stay applied and the failed batch plus
    /// everything after it stays scheduled.
    #[tracing::instrument(level = "info", skip(self, cx))]
    pub async fn flush(&mut self, cx: &Cx) -> Outcome<FlushResult, Error> {
        let plan = match self.compute_flush_plan() {
            Ok(plan) => plan,
            Err(e) => return Outcome::Err(e),
        };
        let mut result = FlushResult::new();
        if plan.is_empty() {
            self.dirty_checks.clear();
            tracing::debug!("Nothing to flush");
            return Outcome::Ok(result);
        }

        let start = Instant::now();
        tracing::info!(
            inserts = plan.inserts.len(),
            updates = plan.updates.len(),
            deletes = plan.deletes.len(),
            "Flushing unit of work"
        );

        for batch in plan.into_batches() {
            if let Some(reason) = cx.cancel_reason() {
                tracing::warn!(
                    pending = self.pending_counts().total(),
                    "Flush cancelled; remaining work stays scheduled"
                );
                return Outcome::Cancelled(reason);
            }

            let count = match batch.execute(cx, &self.driver).await {
                Outcome::Ok(count) => count,
                Outcome::Err(e) => return Outcome::Err(Self::batch_failed(&batch, e)),
                Outcome::Cancelled(reason) => return Outcome::Cancelled(reason),
                Outcome::Panicked(payload) => return Outcome::Panicked(payload),
            };

            let sent = batch.len() as u64;
            if batch.guarded() > 0 && count < sent {
                let conflict = Error::VersionConflict {
                    collection: batch.collection.to_string(),
                    expected: sent,
                    matched: count,
                };
                return Outcome::Err(Self::batch_failed(&batch, conflict));
            }

            result.batches += 1;
            self.complete_batch(batch, count, &mut result);
        }

        self.dirty_checks.clear();
        tracing::info!(
            inserted = result.inserted,
            updated = result.updated,
            deleted = result.deleted,
            batches = result.batches,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Flush complete"
        );
        Outcome::Ok(result)
    }

    fn batch_failed(batch: &Batch, source: Error) -> Error {
        tracing::warn!(
            operation = batch.operation.as_str(),
            collection = %batch.collection,
            documents = batch.len(),
            error = %source,
            "Flush batch failed"
        );
        Error::Flush(FlushError {
            operation: batch.operation,
            collection: batch.collection.to_string(),
            documents: batch.len(),
            source: Box::new(source),
        })
    }

    fn complete_batch(&mut self, batch: Batch, count: u64, result: &mut FlushResult) {
        match batch.operation {
            FlushOperation::Insert => result.inserted += count,
            FlushOperation::Update => result.updated += count,
            FlushOperation::Delete => result.deleted += count,
        }

        for op in batch.ops {
            match op {
                PendingOp::Insert { key, document, .. } => {
                    self.scheduled_insertions.remove(&key);
                    if let Some(entry) = self.identity_map.get_mut(&key) {
                        entry.snapshot = Some(document);
                    }
                }
                PendingOp::Update { key, document, .. } => {
                    self.scheduled_updates.remove(&key);
                    self.dirty_checks.remove(&key);
                    if let Some(entry) = self.identity_map.get_mut(&key) {
                        entry.snapshot = Some(document);
                    }
                }
                PendingOp::Delete { key, .. } => {
                    self.scheduled_deletions.remove(&key);
                    self.identity_map.remove(&key);
                    self.detached.insert(key);
                }
            }
        }
    }
}

impl<D: Driver> std::fmt::Debug for UnitOfWork<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("managed", &self.identity_map.len())
            .field("pending", &self.pending_counts())
            .field("detached", &self.detached.len())
            .finish_non_exhaustive()
    }
}

/// Mapping of a runtime object, which must be a persistable document type.
fn document_mapping<'r>(
    registry: &'r MappingRegistry,
    object: &AnyEntity,
) -> Result<&'r TypeMapping> {
    let mapping = registry.resolve_object(object)?;
    if mapping.is_document() {
        Ok(mapping)
    } else {
        Err(Error::UnmappedType(mapping.name().to_string()))
    }
}

/// Snapshot of a freshly loaded object in the form a flush would write it.
///
/// Managed fields (identifier, discriminator, version, lock) keep their
/// stored values so version guards see what the database holds.
fn load_snapshot(
    registry: &MappingRegistry,
    mapping: &TypeMapping,
    object: &AnyEntity,
    stored: &Document,
) -> Result<Document> {
    let mut snapshot = codec::encode(registry, mapping, &object.fields()?)?;
    for (field, value) in stored {
        if mapping.is_managed_field(field) {
            snapshot.insert(field.clone(), value.clone());
        }
    }
    Ok(snapshot)
}

fn collection_ref(mapping: &TypeMapping) -> CollectionRef {
    CollectionRef::new(
        mapping.database().map(str::to_string),
        mapping.collection().unwrap_or(mapping.name()),
    )
}
