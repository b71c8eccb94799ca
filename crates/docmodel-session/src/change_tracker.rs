//! Change-set computation for managed objects.
//!
//! Changes are found field by field: each persisted property's current
//! stored value is compared with the snapshot taken at load or last flush.
//! A missing field and an explicit `null` are treated as equal, and a
//! property with a converter is compared with [`Converter::equals`].
//!
//! [`Converter::equals`]: docmodel_core::Converter::equals

use docmodel_core::{Document, PropertyMapping};
use docmodel_mapping::{MappingRegistry, TypeMapping};
use serde_json::Value as Json;

/// Fields to overwrite and fields to remove for one document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    pub set: Document,
    pub unset: Vec<String>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.unset.is_empty()
    }

    /// Number of changed fields.
    pub fn len(&self) -> usize {
        self.set.len() + self.unset.len()
    }
}

/// Diffs current documents against their snapshots.
#[derive(Debug, Clone, Copy)]
pub struct ChangeTracker<'r> {
    registry: &'r MappingRegistry,
}

impl<'r> ChangeTracker<'r> {
    pub fn new(registry: &'r MappingRegistry) -> Self {
        Self { registry }
    }

    /// Compute the changes that turn `snapshot` into `current`.
    ///
    /// Changes to immutable properties are dropped with a warning.
    pub fn changes(
        &self,
        mapping: &TypeMapping,
        snapshot: &Document,
        current: &Document,
    ) -> ChangeSet {
        let mut changes = ChangeSet::default();

        for property in mapping.properties() {
            let Some(field) = property.field_name() else {
                continue;
            };
            if property.is_identifier() || mapping.is_managed_field(field) {
                continue;
            }

            let before = snapshot.get(field).filter(|v| !v.is_null());
            let after = current.get(field).filter(|v| !v.is_null());
            if self.equal(property, before, after) {
                continue;
            }

            if property.is_immutable() {
                tracing::warn!(
                    type_name = mapping.name(),
                    property = property.name(),
                    "ignoring change to immutable property"
                );
                continue;
            }

            match after {
                Some(value) => {
                    changes.set.insert(field.to_string(), value.clone());
                }
                None => changes.unset.push(field.to_string()),
            }
        }

        tracing::trace!(
            type_name = mapping.name(),
            changed = changes.len(),
            "computed change set"
        );
        changes
    }

    /// Whether any persisted property differs from the snapshot.
    pub fn is_dirty(
        &self,
        mapping: &TypeMapping,
        snapshot: &Document,
        current: &Document,
    ) -> bool {
        !self.changes(mapping, snapshot, current).is_empty()
    }

    fn equal(&self, property: &PropertyMapping, a: Option<&Json>, b: Option<&Json>) -> bool {
        match (a, b) {
            (None, None) => true,
            (Some(a), Some(b)) => match property
                .converter_name()
                .and_then(|name| self.registry.converter(name))
            {
                Some(converter) => converter.equals(a, b),
                None => a == b,
            },
            _ => false,
        }
    }
}
