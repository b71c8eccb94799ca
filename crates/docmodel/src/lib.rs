//! DocModel Rust - object-document mapping for document databases.
//!
//! DocModel maps plain Rust types to documents and tracks them through a
//! unit of work:
//!
//! - Mapping metadata built once from a provider and validated as a whole
//! - Inheritance hierarchies with discriminator-based polymorphic loading
//! - An identity map guaranteeing one instance per stored document
//! - Change detection by snapshot diff, with optimistic versioning
//! - Ordered, batched flushes that can be resumed after a partial failure
//!
//! # Quick Start
//!
//! ```ignore
//! use docmodel::prelude::*;
//!
//! #[derive(Debug, Serialize, Deserialize)]
//! struct Hero {
//!     id: Option<i64>,
//!     name: String,
//! }
//!
//! impl Entity for Hero {
//!     const TYPE_NAME: &'static str = "Hero";
//!     fn identity(&self) -> Option<Identity> { self.id.map(Identity::Int) }
//!     fn set_identity(&mut self, id: Identity) {
//!         if let Identity::Int(i) = id { self.id = Some(i); }
//!     }
//! }
//!
//! async fn example(cx: &Cx) -> Result<()> {
//!     let registry = MappingRegistry::builder()
//!         .entity::<Hero>()
//!         .build_from(vec![
//!             TypeDescriptor::document("Hero")
//!                 .property(PropertyMapping::identifier("id"))
//!                 .property(PropertyMapping::new("name")),
//!         ])?;
//!
//!     let mut uow = UnitOfWork::new(Arc::new(registry), MemoryDriver::new());
//!     let hero = Hero { id: None, name: "Spider-Man".into() }.into_ref();
//!     uow.save(&hero)?;
//!     uow.flush(cx).await;
//!     Ok(())
//! }
//! ```

pub mod memory;

pub use docmodel_core::{
    // asupersync re-exports
    Cx,
    Outcome,
    // Entities
    AnyEntity,
    Entity,
    EntityRef,
    ErasedEntity,
    Hydrator,
    hydrate,
    // Mapping metadata
    ChangeTracking,
    IndexMapping,
    IndexOrder,
    MappingConfig,
    MappingProvider,
    NestedKind,
    NestedMapping,
    PropertyFlags,
    PropertyMapping,
    StaticProvider,
    TypeDescriptor,
    // Converters
    Converter,
    ConverterRegistry,
    DateConverter,
    DecimalConverter,
    // Driver
    CollectionRef,
    DocumentUpdate,
    Driver,
    VersionGuard,
    // Values
    Document,
    Fields,
    Identity,
    ObjectState,
    // Errors
    DriverError,
    DriverErrorKind,
    Error,
    FlushError,
    FlushOperation,
    MappingError,
    MappingErrorKind,
    MappingIssue,
    Result,
};
pub use docmodel_mapping::{
    Hierarchy, MappingId, MappingRegistry, MappingRegistryBuilder, TypeFlags, TypeMapping, codec,
};
pub use docmodel_session::{
    ChangeSet, ChangeTracker, FlushPlan, FlushResult, ObjectKey, PendingCounts, PendingOp,
    SharedUnitOfWork, UnitOfWork,
};
pub use memory::MemoryDriver;

/// Commonly used items.
pub mod prelude {
    pub use crate::{
        AnyEntity,
        ChangeTracking,
        Cx,
        Document,
        Driver,
        Entity,
        EntityRef,
        Error,
        FlushResult,
        Identity,
        IndexMapping,
        IndexOrder,
        MappingConfig,
        MappingProvider,
        MappingRegistry,
        MemoryDriver,
        ObjectState,
        Outcome,
        PropertyMapping,
        Result,
        SharedUnitOfWork,
        StaticProvider,
        TypeDescriptor,
        UnitOfWork,
    };
    pub use serde::{Deserialize, Serialize};
    pub use std::sync::Arc;
}
