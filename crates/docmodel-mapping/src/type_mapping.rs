//! Per-type mapping metadata.

use docmodel_core::error::{MappingErrorKind, MappingIssue};
use docmodel_core::{ChangeTracking, IndexMapping, PropertyMapping};
use std::collections::HashMap;

/// Index of a type mapping inside its registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MappingId(pub(crate) usize);

impl MappingId {
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Kind flags of a mapped type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TypeFlags {
    pub document: bool,
    pub embedded: bool,
    /// Set once hierarchy linking has run
    pub root: bool,
    pub immutable: bool,
}

/// Mapping metadata for one declared type.
///
/// Property names and external field names are both unique within a type;
/// [`TypeMapping::add_property`] enforces this. Hierarchy-wide state (the
/// root pointer, indexes and the discriminator table) is managed by
/// [`crate::Hierarchy`].
#[derive(Debug, Clone)]
pub struct TypeMapping {
    pub(crate) id: MappingId,
    pub(crate) name: String,
    pub(crate) flags: TypeFlags,
    properties: Vec<PropertyMapping>,
    by_name: HashMap<String, usize>,
    by_field: HashMap<String, usize>,
    identifier: Option<usize>,
    pub(crate) indexes: Vec<IndexMapping>,
    pub(crate) collection: Option<String>,
    pub(crate) database: Option<String>,
    pub(crate) discriminator_field: Option<String>,
    pub(crate) discriminator_value: Option<String>,
    /// Declared parent name, resolved during linking
    pub(crate) parent_name: Option<String>,
    pub(crate) parent: Option<MappingId>,
    pub(crate) root: MappingId,
    pub(crate) change_tracking: Option<ChangeTracking>,
    pub(crate) versioned: bool,
    pub(crate) version_field: Option<String>,
    pub(crate) locked: bool,
    pub(crate) lock_field: Option<String>,
    /// Discriminator value -> type; only populated on roots
    pub(crate) discriminators: HashMap<String, MappingId>,
    pub(crate) defaults_applied: bool,
}

impl TypeMapping {
    pub(crate) fn new(id: MappingId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            flags: TypeFlags::default(),
            properties: Vec::new(),
            by_name: HashMap::new(),
            by_field: HashMap::new(),
            identifier: None,
            indexes: Vec::new(),
            collection: None,
            database: None,
            discriminator_field: None,
            discriminator_value: None,
            parent_name: None,
            parent: None,
            root: id,
            change_tracking: None,
            versioned: false,
            version_field: None,
            locked: false,
            lock_field: None,
            discriminators: HashMap::new(),
            defaults_applied: false,
        }
    }

    /// Append a property.
    ///
    /// Fails if the property's name or external field name is already used
    /// on this type; the mapping is left unchanged in that case.
    pub fn add_property(&mut self, property: PropertyMapping) -> Result<(), MappingIssue> {
        if self.by_name.contains_key(property.name()) {
            return Err(MappingIssue::new(
                &self.name,
                MappingErrorKind::DuplicateField,
                format!("property '{}' is declared more than once", property.name()),
            ));
        }
        if let Some(field) = property.field_name() {
            if let Some(&existing) = self.by_field.get(field) {
                return Err(MappingIssue::new(
                    &self.name,
                    MappingErrorKind::DuplicateField,
                    format!(
                        "properties '{}' and '{}' both map to field '{}'",
                        self.properties[existing].name(),
                        property.name(),
                        field
                    ),
                ));
            }
        }
        if property.is_identifier() && self.identifier.is_some() {
            return Err(MappingIssue::new(
                &self.name,
                MappingErrorKind::DuplicateField,
                format!("property '{}' is a second identifier", property.name()),
            ));
        }

        let idx = self.properties.len();
        self.by_name.insert(property.name().to_string(), idx);
        if let Some(field) = property.field_name() {
            self.by_field.insert(field.to_string(), idx);
        }
        if property.is_identifier() {
            self.identifier = Some(idx);
        }
        self.properties.push(property);
        Ok(())
    }

    pub fn id(&self) -> MappingId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn flags(&self) -> TypeFlags {
        self.flags
    }

    pub fn is_root(&self) -> bool {
        self.flags.root
    }

    pub fn is_document(&self) -> bool {
        self.flags.document
    }

    pub fn is_embedded(&self) -> bool {
        self.flags.embedded
    }

    pub fn is_immutable(&self) -> bool {
        self.flags.immutable
    }

    /// Properties in declaration order.
    pub fn properties(&self) -> &[PropertyMapping] {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&PropertyMapping> {
        self.by_name.get(name).map(|&i| &self.properties[i])
    }

    pub fn property_by_field(&self, field: &str) -> Option<&PropertyMapping> {
        self.by_field.get(field).map(|&i| &self.properties[i])
    }

    pub fn identifier(&self) -> Option<&PropertyMapping> {
        self.identifier.map(|i| &self.properties[i])
    }

    /// External field holding the identity.
    pub fn identifier_field(&self) -> &str {
        self.identifier()
            .and_then(PropertyMapping::field_name)
            .unwrap_or(docmodel_core::property::IDENTIFIER_FIELD)
    }

    /// Indexes stored on this type; empty for every non-root type.
    pub fn indexes(&self) -> &[IndexMapping] {
        &self.indexes
    }

    pub fn collection(&self) -> Option<&str> {
        self.collection.as_deref()
    }

    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    pub fn discriminator_field(&self) -> Option<&str> {
        self.discriminator_field.as_deref()
    }

    pub fn discriminator_value(&self) -> Option<&str> {
        self.discriminator_value.as_deref()
    }

    pub fn parent(&self) -> Option<MappingId> {
        self.parent
    }

    pub fn root(&self) -> MappingId {
        self.root
    }

    /// Effective change tracking mode.
    pub fn change_tracking(&self) -> ChangeTracking {
        self.change_tracking.unwrap_or_default()
    }

    pub fn is_versioned(&self) -> bool {
        self.versioned
    }

    pub fn version_field(&self) -> Option<&str> {
        self.version_field.as_deref()
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn lock_field(&self) -> Option<&str> {
        self.lock_field.as_deref()
    }

    /// Fields the mapping layer writes itself (never part of a change set).
    pub fn is_managed_field(&self, field: &str) -> bool {
        field == self.identifier_field()
            || self.discriminator_field() == Some(field)
            || (self.versioned && self.version_field() == Some(field))
            || (self.locked && self.lock_field() == Some(field))
    }
}
