//! Mapping metadata for DocModel Rust.
//!
//! This crate turns the plain descriptors returned by a mapping provider
//! into a validated, immutable [`MappingRegistry`]:
//!
//! - [`TypeMapping`] holds one type's properties, storage location,
//!   discriminator and tracking settings
//! - [`Hierarchy`] links types into inheritance trees and applies defaults
//!   from the root down
//! - [`codec`] converts between entity properties and stored documents

pub mod codec;
pub mod hierarchy;
pub mod registry;
pub mod type_mapping;

pub use hierarchy::Hierarchy;
pub use registry::{MappingRegistry, MappingRegistryBuilder};
pub use type_mapping::{MappingId, TypeFlags, TypeMapping};
