//! Mapping provider contract.
//!
//! A [`MappingProvider`] hands the registry a list of [`TypeDescriptor`]s:
//! plain data describing each mapped type. How the descriptors are obtained
//! (attributes, a schema file, hand-written tables) is up to the provider.

use crate::config::{ChangeTracking, MappingConfig};
use crate::error::Result;
use crate::property::PropertyMapping;

/// Sort order of one index key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexOrder {
    #[default]
    Ascending,
    Descending,
}

impl IndexOrder {
    /// Numeric direction as stored in index keys.
    #[must_use]
    pub const fn direction(&self) -> i32 {
        match self {
            IndexOrder::Ascending => 1,
            IndexOrder::Descending => -1,
        }
    }
}

/// An index declared on a mapped type.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IndexMapping {
    /// External field names with their order
    pub keys: Vec<(String, IndexOrder)>,
    pub unique: bool,
    pub name: Option<String>,
}

impl IndexMapping {
    /// Index on a single field.
    pub fn on(field: impl Into<String>, order: IndexOrder) -> Self {
        Self {
            keys: vec![(field.into(), order)],
            unique: false,
            name: None,
        }
    }

    /// Add another key (compound index).
    #[must_use]
    pub fn and(mut self, field: impl Into<String>, order: IndexOrder) -> Self {
        self.keys.push((field.into(), order));
        self
    }

    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Explicit name, or one derived from the keys (`name_1_age_-1`).
    pub fn resolved_name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        self.keys
            .iter()
            .map(|(field, order)| format!("{}_{}", field, order.direction()))
            .collect::<Vec<_>>()
            .join("_")
    }
}

/// Materialized description of one mapped type.
///
/// Unset optional fields are filled in by the registry when defaults are
/// applied; see `MappingConfig`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDescriptor {
    pub name: String,
    /// Declared parent type, if this type extends another
    pub parent: Option<String>,
    /// Stored in its own collection (possibly shared with its hierarchy)
    pub document: bool,
    /// Only ever stored inside another document
    pub embedded: bool,
    /// Never updated once inserted
    pub immutable: bool,
    pub properties: Vec<PropertyMapping>,
    pub indexes: Vec<IndexMapping>,
    pub collection: Option<String>,
    pub database: Option<String>,
    pub discriminator_field: Option<String>,
    pub discriminator_value: Option<String>,
    pub change_tracking: Option<ChangeTracking>,
    pub versioned: bool,
    pub version_field: Option<String>,
    pub locked: bool,
    pub lock_field: Option<String>,
}

impl TypeDescriptor {
    fn base(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            document: false,
            embedded: false,
            immutable: false,
            properties: Vec::new(),
            indexes: Vec::new(),
            collection: None,
            database: None,
            discriminator_field: None,
            discriminator_value: None,
            change_tracking: None,
            versioned: false,
            version_field: None,
            locked: false,
            lock_field: None,
        }
    }

    /// A document type.
    pub fn document(name: impl Into<String>) -> Self {
        let mut d = Self::base(name);
        d.document = true;
        d
    }

    /// An embedded type.
    pub fn embedded(name: impl Into<String>) -> Self {
        let mut d = Self::base(name);
        d.embedded = true;
        d
    }

    #[must_use]
    pub fn extends(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    #[must_use]
    pub fn property(mut self, property: PropertyMapping) -> Self {
        self.properties.push(property);
        self
    }

    #[must_use]
    pub fn index(mut self, index: IndexMapping) -> Self {
        self.indexes.push(index);
        self
    }

    #[must_use]
    pub fn collection(mut self, name: impl Into<String>) -> Self {
        self.collection = Some(name.into());
        self
    }

    #[must_use]
    pub fn database(mut self, name: impl Into<String>) -> Self {
        self.database = Some(name.into());
        self
    }

    #[must_use]
    pub fn discriminator_field(mut self, name: impl Into<String>) -> Self {
        self.discriminator_field = Some(name.into());
        self
    }

    #[must_use]
    pub fn discriminator_value(mut self, value: impl Into<String>) -> Self {
        self.discriminator_value = Some(value.into());
        self
    }

    #[must_use]
    pub fn change_tracking(mut self, mode: ChangeTracking) -> Self {
        self.change_tracking = Some(mode);
        self
    }

    #[must_use]
    pub fn immutable(mut self) -> Self {
        self.immutable = true;
        self
    }

    /// Enable optimistic versioning with the configured field.
    #[must_use]
    pub fn versioned(mut self) -> Self {
        self.versioned = true;
        self
    }

    /// Enable optimistic versioning with an explicit field.
    #[must_use]
    pub fn version_field(mut self, name: impl Into<String>) -> Self {
        self.versioned = true;
        self.version_field = Some(name.into());
        self
    }

    #[must_use]
    pub fn locked(mut self) -> Self {
        self.locked = true;
        self
    }

    #[must_use]
    pub fn lock_field(mut self, name: impl Into<String>) -> Self {
        self.locked = true;
        self.lock_field = Some(name.into());
        self
    }
}

/// Source of type descriptors for a registry build.
pub trait MappingProvider {
    fn get_mappings(&self, config: &MappingConfig) -> Result<Vec<TypeDescriptor>>;
}

/// Provider over a fixed descriptor list.
#[derive(Debug, Clone, Default)]
pub struct StaticProvider {
    descriptors: Vec<TypeDescriptor>,
}

impl StaticProvider {
    pub fn new(descriptors: Vec<TypeDescriptor>) -> Self {
        Self { descriptors }
    }

    #[must_use]
    pub fn with(mut self, descriptor: TypeDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }
}

impl MappingProvider for StaticProvider {
    fn get_mappings(&self, _config: &MappingConfig) -> Result<Vec<TypeDescriptor>> {
        Ok(self.descriptors.clone())
    }
}

impl<F> MappingProvider for F
where
    F: Fn(&MappingConfig) -> Result<Vec<TypeDescriptor>>,
{
    fn get_mappings(&self, config: &MappingConfig) -> Result<Vec<TypeDescriptor>> {
        self(config)
    }
}
