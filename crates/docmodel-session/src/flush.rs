//! Flush planning and batch execution.
//!
//! A flush writes scheduled work in a fixed order:
//! - INSERT first (later writes may refer to new identities)
//! - UPDATE next (including change sets computed at flush time)
//! - DELETE last
//!
//! Within each category operations are grouped into one batch per
//! collection. Each batch is a single driver call.

use crate::ObjectKey;
use asupersync::{Cx, Outcome};
use docmodel_core::{
    CollectionRef, Document, DocumentUpdate, Driver, Error, FlushOperation, Identity,
};

/// One scheduled write.
#[derive(Debug, Clone)]
pub enum PendingOp {
    /// Insert a new document.
    Insert {
        key: ObjectKey,
        collection: CollectionRef,
        document: Document,
    },
    /// Apply a change set to a stored document.
    Update {
        key: ObjectKey,
        collection: CollectionRef,
        update: DocumentUpdate,
        /// Full stored form after the update; becomes the new snapshot
        document: Document,
    },
    /// Delete a stored document.
    Delete {
        key: ObjectKey,
        collection: CollectionRef,
    },
}

impl PendingOp {
    pub fn key(&self) -> &ObjectKey {
        match self {
            PendingOp::Insert { key, .. }
            | PendingOp::Update { key, .. }
            | PendingOp::Delete { key, .. } => key,
        }
    }

    pub fn collection(&self) -> &CollectionRef {
        match self {
            PendingOp::Insert { collection, .. }
            | PendingOp::Update { collection, .. }
            | PendingOp::Delete { collection, .. } => collection,
        }
    }

    pub fn operation(&self) -> FlushOperation {
        match self {
            PendingOp::Insert { .. } => FlushOperation::Insert,
            PendingOp::Update { .. } => FlushOperation::Update,
            PendingOp::Delete { .. } => FlushOperation::Delete,
        }
    }

    pub fn is_insert(&self) -> bool {
        matches!(self, PendingOp::Insert { .. })
    }

    pub fn is_update(&self) -> bool {
        matches!(self, PendingOp::Update { .. })
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, PendingOp::Delete { .. })
    }
}

/// Operations to write in one flush, by category.
#[derive(Debug, Default)]
pub struct FlushPlan {
    pub inserts: Vec<PendingOp>,
    pub updates: Vec<PendingOp>,
    pub deletes: Vec<PendingOp>,
}

impl FlushPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
    }

    /// Total number of operations in the plan.
    pub fn len(&self) -> usize {
        self.inserts.len() + self.updates.len() + self.deletes.len()
    }

    /// Split into per-collection batches: inserts, then updates, then deletes.
    pub fn into_batches(self) -> Vec<Batch> {
        let mut batches = Vec::new();
        for (operation, ops) in [
            (FlushOperation::Insert, self.inserts),
            (FlushOperation::Update, self.updates),
            (FlushOperation::Delete, self.deletes),
        ] {
            batches.extend(Self::batch_by_collection(operation, ops));
        }
        batches
    }

    /// Group operations by collection, keeping first-seen collection order.
    fn batch_by_collection(operation: FlushOperation, ops: Vec<PendingOp>) -> Vec<Batch> {
        let mut batches: Vec<Batch> = Vec::new();
        for op in ops {
            match batches
                .iter_mut()
                .find(|b| &b.collection == op.collection())
            {
                Some(batch) => batch.ops.push(op),
                None => batches.push(Batch {
                    operation,
                    collection: op.collection().clone(),
                    ops: vec![op],
                }),
            }
        }
        batches
    }
}

/// Operations of one category against one collection.
#[derive(Debug, Clone)]
pub struct Batch {
    pub operation: FlushOperation,
    pub collection: CollectionRef,
    pub ops: Vec<PendingOp>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Number of updates carrying a version guard.
    pub fn guarded(&self) -> u64 {
        self.ops
            .iter()
            .filter(|op| matches!(op, PendingOp::Update { update, .. } if update.guard.is_some()))
            .count() as u64
    }

    /// Send the batch to the driver; returns the count the driver reports.
    #[tracing::instrument(
        level = "debug",
        skip(self, cx, driver),
        fields(
            operation = self.operation.as_str(),
            collection = %self.collection,
            count = self.ops.len()
        )
    )]
    pub async fn execute<D: Driver>(&self, cx: &Cx, driver: &D) -> Outcome<u64, Error> {
        if self.ops.is_empty() {
            return Outcome::Ok(0);
        }

        match self.operation {
            FlushOperation::Insert => {
                let documents = self
                    .ops
                    .iter()
                    .filter_map(|op| match op {
                        PendingOp::Insert { document, .. } => Some(document.clone()),
                        _ => None,
                    })
                    .collect();
                driver.insert_many(cx, &self.collection, documents).await
            }
            FlushOperation::Update => {
                let updates = self
                    .ops
                    .iter()
                    .filter_map(|op| match op {
                        PendingOp::Update { update, .. } => Some(update.clone()),
                        _ => None,
                    })
                    .collect();
                driver.update_many(cx, &self.collection, updates).await
            }
            FlushOperation::Delete => {
                let identities: Vec<Identity> =
                    self.ops.iter().map(|op| op.key().identity().clone()).collect();
                driver.delete_many(cx, &self.collection, identities).await
            }
        }
    }
}

/// Outcome counts of a completed flush.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FlushResult {
    /// Documents inserted.
    pub inserted: u64,
    /// Documents matched by updates.
    pub updated: u64,
    /// Documents deleted.
    pub deleted: u64,
    /// Driver calls made.
    pub batches: usize,
}

impl FlushResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of documents written.
    pub fn total(&self) -> u64 {
        self.inserted + self.updated + self.deleted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docmodel_core::{TypeDescriptor, VersionGuard};
    use docmodel_mapping::MappingRegistry;

    fn key(id: i64) -> ObjectKey {
        let registry = MappingRegistry::builder()
            .build_from(vec![TypeDescriptor::document("Note")])
            .unwrap();
        ObjectKey::new(registry.resolve("Note").unwrap().id(), Identity::Int(id))
    }

    fn insert(id: i64, collection: &str) -> PendingOp {
        PendingOp::Insert {
            key: key(id),
            collection: CollectionRef::new(None, collection),
            document: Document::new(),
        }
    }

    #[test]
    fn test_batches_follow_category_order() {
        let plan = FlushPlan {
            inserts: vec![insert(1, "a")],
            updates: vec![PendingOp::Update {
                key: key(2),
                collection: CollectionRef::new(None, "a"),
                update: DocumentUpdate::new(Identity::Int(2)),
                document: Document::new(),
            }],
            deletes: vec![PendingOp::Delete {
                key: key(3),
                collection: CollectionRef::new(None, "a"),
            }],
        };
        assert_eq!(plan.len(), 3);

        let ops: Vec<FlushOperation> = plan.into_batches().iter().map(|b| b.operation).collect();
        assert_eq!(
            ops,
            vec![
                FlushOperation::Insert,
                FlushOperation::Update,
                FlushOperation::Delete
            ]
        );
    }

    #[test]
    fn test_batches_grouped_by_collection() {
        let plan = FlushPlan {
            inserts: vec![insert(1, "a"), insert(2, "b"), insert(3, "a")],
            ..FlushPlan::default()
        };
        let batches = plan.into_batches();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].collection.collection, "a");
        assert_eq!(batches[0].len(), 2);
        assert_eq!(batches[1].collection.collection, "b");
    }

    #[test]
    fn test_guarded_count() {
        let mut guarded = DocumentUpdate::new(Identity::Int(1));
        guarded.guard = Some(VersionGuard {
            field: "__v".to_string(),
            expected: 1,
        });
        let batch = Batch {
            operation: FlushOperation::Update,
            collection: CollectionRef::new(None, "a"),
            ops: vec![
                PendingOp::Update {
                    key: key(1),
                    collection: CollectionRef::new(None, "a"),
                    update: guarded,
                    document: Document::new(),
                },
                PendingOp::Update {
                    key: key(2),
                    collection: CollectionRef::new(None, "a"),
                    update: DocumentUpdate::new(Identity::Int(2)),
                    document: Document::new(),
                },
            ],
        };
        assert_eq!(batch.guarded(), 1);
    }

    #[test]
    fn test_empty_plan() {
        let plan = FlushPlan::new();
        assert!(plan.is_empty());
        assert!(plan.into_batches().is_empty());
        assert_eq!(FlushResult::new().total(), 0);
    }
}
