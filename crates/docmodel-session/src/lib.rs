//! Unit of work and identity map for DocModel Rust.
//!
//! A [`UnitOfWork`] is one logical session over a shared, immutable
//! `MappingRegistry`. It tracks which objects are managed, schedules
//! inserts and deletes as objects are saved and removed, discovers updates
//! by diffing against snapshots, and writes everything through a `Driver`
//! on [`UnitOfWork::flush`].
//!
//! # Example
//!
//! ```ignore
//! let mut uow = UnitOfWork::new(registry, driver);
//!
//! let cat = Cat::new("Tom").into_ref();
//! uow.save(&cat)?;                      // New -> Managed, insert scheduled
//!
//! let dog = uow.load_as::<Dog>(stored)?; // Managed, snapshot kept
//! dog.write().unwrap().name = "Rex".into();
//!
//! uow.flush(&cx).await;                 // insert, then update
//! ```

pub mod change_tracker;
pub mod flush;
pub mod identity_map;
pub mod shared;
pub mod unit_of_work;

pub use change_tracker::{ChangeSet, ChangeTracker};
pub use flush::{Batch, FlushPlan, FlushResult, PendingOp};
pub use identity_map::{IdentityMap, ManagedEntry};
pub use shared::SharedUnitOfWork;
pub use unit_of_work::{PendingCounts, UnitOfWork};

use docmodel_core::Identity;
use docmodel_mapping::MappingId;

/// Key of a tracked object: its hierarchy root and persisted identity.
///
/// Types sharing a root share a collection, so the root (not the concrete
/// type) scopes the identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    root: MappingId,
    identity: Identity,
}

impl ObjectKey {
    pub fn new(root: MappingId, identity: Identity) -> Self {
        Self { root, identity }
    }

    pub fn root(&self) -> MappingId {
        self.root
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }
}
