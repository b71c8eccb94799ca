//! Mapping registry: build, validation and lookup.
//!
//! [`MappingRegistry::builder`] takes the descriptors from a
//! [`MappingProvider`], links the inheritance hierarchy, applies the
//! configured defaults top-down and validates the result. Validation is
//! exhaustive: every issue in the batch is collected and returned in one
//! [`Error::Mapping`]. A registry that builds successfully is immutable and
//! can be shared across sessions behind an `Arc`.

use crate::hierarchy::Hierarchy;
use crate::type_mapping::{MappingId, TypeMapping};
use docmodel_core::error::{MappingErrorKind, MappingIssue};
use docmodel_core::{
    AnyEntity, ChangeTracking, Converter, ConverterRegistry, Entity, Error, Hydrator,
    IndexMapping, MappingConfig, MappingError, MappingProvider, NestedKind, Result,
    TypeDescriptor, hydrate,
};
use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use std::time::Instant;

/// Storable external field names: non-empty, no leading `$`, no `.`.
static FIELD_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^$.\x00][^.\x00]*$").unwrap_or_else(|_| unreachable!()));

/// Builder for a [`MappingRegistry`].
#[derive(Debug, Default)]
pub struct MappingRegistryBuilder {
    config: MappingConfig,
    converters: Option<ConverterRegistry>,
    hydrators: HashMap<String, Hydrator>,
}

impl MappingRegistryBuilder {
    #[must_use]
    pub fn config(mut self, config: MappingConfig) -> Self {
        self.config = config;
        self
    }

    /// Converters available to properties. Defaults to the built-ins.
    #[must_use]
    pub fn converters(mut self, converters: ConverterRegistry) -> Self {
        self.converters = Some(converters);
        self
    }

    /// Register the Rust type used to hydrate documents of `M::TYPE_NAME`.
    #[must_use]
    pub fn entity<M: Entity>(mut self) -> Self {
        self.hydrators
            .insert(M::TYPE_NAME.to_string(), hydrate::<M> as Hydrator);
        self
    }

    /// Build from a provider.
    pub fn build<P>(self, provider: &P) -> Result<MappingRegistry>
    where
        P: MappingProvider + ?Sized,
    {
        let descriptors = provider.get_mappings(&self.config)?;
        self.build_from(descriptors)
    }

    /// Build from an already materialized descriptor list.
    #[tracing::instrument(level = "debug", skip_all, fields(types = descriptors.len()))]
    pub fn build_from(self, descriptors: Vec<TypeDescriptor>) -> Result<MappingRegistry> {
        let start = Instant::now();
        let converters = self
            .converters
            .unwrap_or_else(ConverterRegistry::with_builtins);
        let mut errors = MappingError::new();
        let mut hierarchy = Hierarchy::new();
        let mut declared = Vec::with_capacity(descriptors.len());

        for descriptor in &descriptors {
            match hierarchy.add_type(&descriptor.name) {
                Ok(id) => {
                    populate(&mut hierarchy, id, descriptor, &converters, &mut errors);
                    declared.push((id, descriptor));
                }
                Err(issue) => errors.push(issue),
            }
        }

        for issue in hierarchy.link() {
            errors.push(issue);
        }

        for (id, descriptor) in &declared {
            for index in &descriptor.indexes {
                hierarchy.add_index(*id, index.clone());
            }
            if let Some(value) = &descriptor.discriminator_value {
                if let Err(issue) = hierarchy.set_discriminator_value(*id, value.clone()) {
                    errors.push(issue);
                }
            }
        }

        for issue in hierarchy.apply_defaults(&self.config) {
            errors.push(issue);
        }

        validate(&hierarchy, &mut errors);

        for name in self.hydrators.keys() {
            if hierarchy.id_of(name).is_none() {
                tracing::warn!(type_name = %name, "entity registered without a type descriptor");
            }
        }

        if !errors.is_empty() {
            tracing::warn!(issues = errors.issues.len(), "mapping registry build failed");
            return Err(Error::Mapping(errors));
        }

        tracing::info!(
            types = hierarchy.len(),
            elapsed_us = start.elapsed().as_micros() as u64,
            "mapping registry built"
        );

        Ok(MappingRegistry {
            config: self.config,
            hierarchy,
            converters,
            hydrators: self.hydrators,
        })
    }
}

fn populate(
    hierarchy: &mut Hierarchy,
    id: MappingId,
    descriptor: &TypeDescriptor,
    converters: &ConverterRegistry,
    errors: &mut MappingError,
) {
    let node = hierarchy.get_mut(id);
    node.flags.document = descriptor.document;
    node.flags.embedded = descriptor.embedded;
    node.flags.immutable = descriptor.immutable;
    node.parent_name.clone_from(&descriptor.parent);
    node.collection.clone_from(&descriptor.collection);
    node.database.clone_from(&descriptor.database);
    node.discriminator_field.clone_from(&descriptor.discriminator_field);
    node.change_tracking = descriptor.change_tracking;
    node.versioned = descriptor.versioned;
    node.version_field.clone_from(&descriptor.version_field);
    node.locked = descriptor.locked;
    node.lock_field.clone_from(&descriptor.lock_field);

    if descriptor.document == descriptor.embedded {
        errors.push(MappingIssue::new(
            &descriptor.name,
            MappingErrorKind::IncompatibleFlags,
            "type must be exactly one of document or embedded",
        ));
    }

    for property in &descriptor.properties {
        let mut property = property.clone();
        if let Some(field) = property.field_name() {
            if !FIELD_NAME.is_match(field) {
                errors.push(MappingIssue::new(
                    &descriptor.name,
                    MappingErrorKind::InvalidFieldName,
                    format!(
                        "property '{}' maps to unstorable field '{}'",
                        property.name(),
                        field
                    ),
                ));
                continue;
            }
        }
        match converters.resolve_for(&descriptor.name, &property) {
            Ok(Some(name)) => property.set_resolved_converter(name),
            Ok(None) => {}
            Err(issue) => errors.push(issue),
        }
        if let Err(issue) = node.add_property(property) {
            errors.push(issue);
        }
    }
}

/// Checks that need the linked, defaulted hierarchy.
fn validate(hierarchy: &Hierarchy, errors: &mut MappingError) {
    let mut collections: HashMap<(Option<&str>, &str), &str> = HashMap::new();

    for mapping in hierarchy.iter() {
        let name = mapping.name();

        if mapping.is_document()
            && mapping.is_immutable()
            && mapping.change_tracking() == ChangeTracking::DeferredExplicit
        {
            errors.push(MappingIssue::new(
                name,
                MappingErrorKind::IncompatibleFlags,
                "immutable type cannot use explicit change tracking",
            ));
        }

        if mapping.is_versioned()
            && mapping.is_locked()
            && mapping.version_field().is_some()
            && mapping.version_field() == mapping.lock_field()
        {
            errors.push(MappingIssue::new(
                name,
                MappingErrorKind::IncompatibleFlags,
                format!(
                    "version and lock both use field '{}'",
                    mapping.version_field().unwrap_or_default()
                ),
            ));
        }

        for property in mapping.properties() {
            if let Some(field) = property.field_name() {
                if !property.is_identifier()
                    && mapping.is_managed_field(field)
                    && field != mapping.identifier_field()
                {
                    errors.push(MappingIssue::new(
                        name,
                        MappingErrorKind::DuplicateField,
                        format!(
                            "property '{}' uses reserved field '{}'",
                            property.name(),
                            field
                        ),
                    ));
                }
            }

            let Some(nested) = property.nested_mapping() else {
                continue;
            };
            if nested.kind == NestedKind::Enum {
                continue;
            }
            let Some(target) = hierarchy.by_name(&nested.target) else {
                errors.push(MappingIssue::new(
                    name,
                    MappingErrorKind::UnknownNestedType,
                    format!(
                        "property '{}' targets unmapped type '{}'",
                        property.name(),
                        nested.target
                    ),
                ));
                continue;
            };
            let fits = match nested.kind {
                NestedKind::EmbedOne | NestedKind::EmbedMany => target.is_embedded(),
                NestedKind::ReferenceOne => target.is_document(),
                NestedKind::Enum => true,
            };
            if !fits {
                errors.push(MappingIssue::new(
                    name,
                    MappingErrorKind::IncompatibleFlags,
                    format!(
                        "property '{}' cannot use {:?} with type '{}'",
                        property.name(),
                        nested.kind,
                        nested.target
                    ),
                ));
            }
        }

        if mapping.is_root() && mapping.is_document() {
            if let Some(collection) = mapping.collection() {
                let key = (mapping.database(), collection);
                if let Some(owner) = collections.get(&key) {
                    errors.push(MappingIssue::new(
                        name,
                        MappingErrorKind::DuplicateCollectionMapping,
                        format!(
                            "collection '{}' is already mapped by hierarchy {}",
                            collection, owner
                        ),
                    ));
                } else {
                    collections.insert(key, name);
                }
            }
        }
    }
}

/// Immutable, shareable set of type mappings.
#[derive(Debug)]
pub struct MappingRegistry {
    config: MappingConfig,
    hierarchy: Hierarchy,
    converters: ConverterRegistry,
    hydrators: HashMap<String, Hydrator>,
}

impl MappingRegistry {
    pub fn builder() -> MappingRegistryBuilder {
        MappingRegistryBuilder::default()
    }

    /// Build with the default configuration and built-in converters.
    pub fn from_provider<P>(provider: &P) -> Result<Arc<Self>>
    where
        P: MappingProvider + ?Sized,
    {
        Self::builder().build(provider).map(Arc::new)
    }

    pub fn config(&self) -> &MappingConfig {
        &self.config
    }

    pub fn converters(&self) -> &ConverterRegistry {
        &self.converters
    }

    pub fn converter(&self, name: &str) -> Option<&Arc<dyn Converter>> {
        self.converters.get(name)
    }

    pub fn len(&self) -> usize {
        self.hierarchy.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hierarchy.is_empty()
    }

    pub fn mappings(&self) -> impl Iterator<Item = &TypeMapping> {
        self.hierarchy.iter()
    }

    pub fn get(&self, id: MappingId) -> &TypeMapping {
        self.hierarchy.get(id)
    }

    pub fn root_of(&self, id: MappingId) -> &TypeMapping {
        self.hierarchy.root_of(id)
    }

    /// Mapping for a declared type name.
    pub fn resolve(&self, type_name: &str) -> Result<&TypeMapping> {
        self.hierarchy
            .by_name(type_name)
            .ok_or_else(|| Error::UnmappedType(type_name.to_string()))
    }

    /// Mapping for a Rust entity type.
    pub fn resolve_entity<M: Entity>(&self) -> Result<&TypeMapping> {
        self.resolve(M::TYPE_NAME)
    }

    /// Mapping for a runtime object.
    pub fn resolve_object(&self, object: &AnyEntity) -> Result<&TypeMapping> {
        self.resolve(object.type_name())
    }

    /// Concrete type registered for a discriminator value in `id`'s hierarchy.
    pub fn resolve_by_discriminator(&self, id: MappingId, value: &str) -> Option<&TypeMapping> {
        self.hierarchy
            .resolve_by_discriminator(id, value)
            .map(|found| self.hierarchy.get(found))
    }

    /// Whether documents in `id`'s hierarchy carry a discriminator.
    pub fn is_polymorphic(&self, id: MappingId) -> bool {
        self.hierarchy.is_polymorphic(id)
    }

    /// Indexes of the hierarchy `type_name` belongs to.
    pub fn indexes(&self, type_name: &str) -> Result<&[IndexMapping]> {
        let mapping = self.resolve(type_name)?;
        Ok(self.root_of(mapping.id()).indexes())
    }

    pub fn hydrator(&self, type_name: &str) -> Option<Hydrator> {
        self.hydrators.get(type_name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docmodel_core::{IndexOrder, PropertyMapping, StaticProvider};

    fn animal_descriptors() -> Vec<TypeDescriptor> {
        vec![
            TypeDescriptor::document("Animal")
                .property(PropertyMapping::identifier("id"))
                .property(PropertyMapping::new("name")),
            TypeDescriptor::document("Cat")
                .extends("Animal")
                .property(PropertyMapping::identifier("id"))
                .property(PropertyMapping::new("name"))
                .property(PropertyMapping::new("lives"))
                .index(IndexMapping::on("lives", IndexOrder::Descending)),
            TypeDescriptor::document("Dog")
                .extends("Animal")
                .property(PropertyMapping::identifier("id"))
                .property(PropertyMapping::new("name")),
        ]
    }

    fn issues(err: &Error) -> Vec<MappingErrorKind> {
        err.mapping_issues()
            .unwrap_or_default()
            .iter()
            .map(|i| i.kind)
            .collect()
    }

    #[test]
    fn test_build_resolves_hierarchy() {
        let registry = MappingRegistry::builder()
            .build_from(animal_descriptors())
            .unwrap();
        let cat = registry.resolve("Cat").unwrap();
        let animal = registry.root_of(cat.id());
        assert_eq!(animal.name(), "Animal");
        assert_eq!(animal.discriminator_field(), Some("__t"));
        assert_eq!(cat.discriminator_value(), Some("Cat"));
        assert_eq!(cat.collection(), Some("animal"));
        assert_eq!(registry.indexes("Dog").unwrap().len(), 1);
        assert!(registry.resolve("Cat").unwrap().indexes().is_empty());
        assert!(registry.is_polymorphic(cat.id()));
        assert_eq!(
            registry
                .resolve_by_discriminator(animal.id(), "Dog")
                .map(TypeMapping::name),
            Some("Dog")
        );
    }

    #[test]
    fn test_resolve_unmapped_type() {
        let registry = MappingRegistry::builder()
            .build_from(animal_descriptors())
            .unwrap();
        let err = registry.resolve("Fish").unwrap_err();
        assert!(matches!(err, Error::UnmappedType(ref n) if n == "Fish"));
    }

    #[test]
    fn test_build_through_provider() {
        let provider = StaticProvider::new(animal_descriptors());
        let registry = MappingRegistry::from_provider(&provider).unwrap();
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_duplicate_discriminator_names_both_types() {
        let mut descriptors = animal_descriptors();
        descriptors[1] = descriptors[1].clone().discriminator_value("pet");
        descriptors[2] = descriptors[2].clone().discriminator_value("pet");
        let err = MappingRegistry::builder()
            .build_from(descriptors)
            .unwrap_err();
        let found = err.mapping_issues().unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind, MappingErrorKind::DuplicateDiscriminator);
        assert!(found[0].message.contains("Cat"));
        assert!(found[0].message.contains("Dog"));
    }

    #[test]
    fn test_validation_is_exhaustive() {
        let descriptors = vec![
            TypeDescriptor::document("A")
                .property(PropertyMapping::new("x").field("f"))
                .property(PropertyMapping::new("y").field("f")),
            TypeDescriptor::document("B")
                .property(PropertyMapping::new("price").converter("money")),
            TypeDescriptor::document("C")
                .immutable()
                .change_tracking(ChangeTracking::DeferredExplicit),
        ];
        let err = MappingRegistry::builder().build_from(descriptors).unwrap_err();
        let kinds = issues(&err);
        assert!(kinds.contains(&MappingErrorKind::DuplicateField));
        assert!(kinds.contains(&MappingErrorKind::UnknownConverter));
        assert!(kinds.contains(&MappingErrorKind::IncompatibleFlags));
        assert_eq!(kinds.len(), 3);
    }

    #[test]
    fn test_duplicate_collection_mapping() {
        let descriptors = vec![
            TypeDescriptor::document("A").collection("shared"),
            TypeDescriptor::document("B").collection("shared"),
            TypeDescriptor::document("C")
                .collection("shared")
                .database("other"),
        ];
        let err = MappingRegistry::builder().build_from(descriptors).unwrap_err();
        assert_eq!(issues(&err), vec![MappingErrorKind::DuplicateCollectionMapping]);
    }

    #[test]
    fn test_field_name_validation() {
        let descriptors = vec![
            TypeDescriptor::document("A")
                .property(PropertyMapping::new("a").field("$bad"))
                .property(PropertyMapping::new("b").field("x.y"))
                .property(PropertyMapping::new("c").field("ok_name")),
        ];
        let err = MappingRegistry::builder().build_from(descriptors).unwrap_err();
        assert_eq!(
            issues(&err),
            vec![
                MappingErrorKind::InvalidFieldName,
                MappingErrorKind::InvalidFieldName
            ]
        );
    }

    #[test]
    fn test_reserved_field_collision() {
        let descriptors = vec![
            TypeDescriptor::document("A")
                .versioned()
                .property(PropertyMapping::new("rev").field("__v")),
        ];
        let err = MappingRegistry::builder().build_from(descriptors).unwrap_err();
        assert_eq!(issues(&err), vec![MappingErrorKind::DuplicateField]);
    }

    #[test]
    fn test_nested_targets_checked() {
        let descriptors = vec![
            TypeDescriptor::document("Person")
                .property(PropertyMapping::new("home").embed_one("Address"))
                .property(PropertyMapping::new("pet").embed_one("Animal"))
                .property(PropertyMapping::new("boss").reference_one("Person"))
                .property(PropertyMapping::new("mood").enumeration("Mood")),
            TypeDescriptor::document("Animal"),
        ];
        let err = MappingRegistry::builder().build_from(descriptors).unwrap_err();
        assert_eq!(
            issues(&err),
            vec![
                MappingErrorKind::UnknownNestedType,
                MappingErrorKind::IncompatibleFlags
            ]
        );
    }

    #[test]
    fn test_declared_type_converter_association() {
        let mut converters = ConverterRegistry::with_builtins();
        converters.associate("Timestamp", "date");
        let registry = MappingRegistry::builder()
            .converters(converters)
            .build_from(vec![
                TypeDescriptor::document("Event")
                    .property(PropertyMapping::new("at").declared_type("Timestamp")),
            ])
            .unwrap();
        let event = registry.resolve("Event").unwrap();
        assert_eq!(event.property("at").unwrap().converter_name(), Some("date"));
        assert!(registry.converter("date").is_some());
    }
}
