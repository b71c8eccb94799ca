//! Core types and traits for DocModel Rust.
//!
//! This crate provides the foundational abstractions shared by the mapping
//! layer and the unit of work:
//!
//! - `Entity` trait for domain objects and its type-erased form `AnyEntity`
//! - `PropertyMapping` for per-field mapping metadata
//! - `Converter` and `ConverterRegistry` for property value conversion
//! - `MappingConfig` for the defaults applied while building mappings
//! - `Driver` and `MappingProvider` collaborator traits
//! - `Outcome` re-export from asupersync for cancel-correct operations
//! - `Cx` context for structured concurrency

// Re-export asupersync primitives for structured concurrency
pub use asupersync::{Cx, Outcome};

pub mod config;
pub mod converter;
pub mod driver;
pub mod entity;
pub mod error;
pub mod property;
pub mod provider;
pub mod value;

pub use config::{ChangeTracking, MappingConfig};
pub use converter::{Converter, ConverterRegistry, DateConverter, DecimalConverter};
pub use driver::{CollectionRef, DocumentUpdate, Driver, VersionGuard};
pub use entity::{AnyEntity, Entity, EntityRef, ErasedEntity, Hydrator, hydrate};
pub use error::{
    DriverError, DriverErrorKind, Error, FlushError, FlushOperation, MappingError,
    MappingErrorKind, MappingIssue, Result,
};
pub use property::{NestedKind, NestedMapping, PropertyFlags, PropertyMapping};
pub use provider::{IndexMapping, IndexOrder, MappingProvider, StaticProvider, TypeDescriptor};
pub use value::{Document, Fields, Identity, ObjectState};
