//! Conversion between entity properties and stored documents.
//!
//! [`encode`] turns property values (keyed by property name) into a
//! document keyed by external field name, applying converters and recursing
//! into embedded types. [`decode`] does the reverse. Ignored properties are
//! skipped both ways.

use crate::registry::MappingRegistry;
use crate::type_mapping::TypeMapping;
use docmodel_core::{Document, Error, Fields, NestedKind, PropertyMapping, Result};
use serde_json::Value as Json;

/// Encode property values as a stored document.
///
/// Writes the discriminator when the mapping's hierarchy is polymorphic.
pub fn encode(
    registry: &MappingRegistry,
    mapping: &TypeMapping,
    fields: &Fields,
) -> Result<Document> {
    let mut doc = Document::new();
    for property in mapping.properties() {
        let Some(field) = property.field_name() else {
            continue;
        };
        let Some(value) = fields.get(property.name()) else {
            continue;
        };
        doc.insert(field.to_string(), encode_value(registry, property, value)?);
    }

    if let (Some(field), Some(value)) =
        (mapping.discriminator_field(), mapping.discriminator_value())
    {
        if registry.is_polymorphic(mapping.id()) {
            doc.insert(field.to_string(), Json::String(value.to_string()));
        }
    }
    Ok(doc)
}

/// Decode a stored document into property values.
///
/// Fields with no matching property are ignored; missing fields are left
/// out of the result.
pub fn decode(
    registry: &MappingRegistry,
    mapping: &TypeMapping,
    doc: &Document,
) -> Result<Fields> {
    let mut fields = Fields::new();
    for property in mapping.properties() {
        let Some(field) = property.field_name() else {
            continue;
        };
        let Some(value) = doc.get(field) else {
            continue;
        };
        fields.insert(
            property.name().to_string(),
            decode_value(registry, property, value)?,
        );
    }
    Ok(fields)
}

/// Concrete mapping for a document, following its discriminator.
pub fn concrete_mapping<'r>(
    registry: &'r MappingRegistry,
    mapping: &'r TypeMapping,
    doc: &Document,
) -> Result<&'r TypeMapping> {
    let Some(field) = mapping.discriminator_field() else {
        return Ok(mapping);
    };
    match doc.get(field) {
        Some(Json::String(value)) => registry
            .resolve_by_discriminator(mapping.id(), value)
            .ok_or_else(|| Error::UnknownDiscriminator {
                root: registry.root_of(mapping.id()).name().to_string(),
                value: value.clone(),
            }),
        _ => Ok(mapping),
    }
}

fn embedded_target<'r>(
    registry: &'r MappingRegistry,
    property: &PropertyMapping,
) -> Result<Option<(NestedKind, &'r TypeMapping)>> {
    match property.nested_mapping() {
        Some(nested) if matches!(nested.kind, NestedKind::EmbedOne | NestedKind::EmbedMany) => {
            Ok(Some((nested.kind, registry.resolve(&nested.target)?)))
        }
        _ => Ok(None),
    }
}

fn shape_error(property: &PropertyMapping, expected: &str, found: &Json) -> Error {
    Error::Serde(format!(
        "property '{}' expected {}, found {}",
        property.name(),
        expected,
        found
    ))
}

fn encode_value(
    registry: &MappingRegistry,
    property: &PropertyMapping,
    value: &Json,
) -> Result<Json> {
    if let Some((kind, target)) = embedded_target(registry, property)? {
        return match (kind, value) {
            (_, Json::Null) => Ok(Json::Null),
            (NestedKind::EmbedOne, Json::Object(inner)) => {
                Ok(Json::Object(encode(registry, target, inner)?))
            }
            (NestedKind::EmbedMany, Json::Array(items)) => items
                .iter()
                .map(|item| match item {
                    Json::Object(inner) => Ok(Json::Object(encode(registry, target, inner)?)),
                    other => Err(shape_error(property, "an embedded object", other)),
                })
                .collect::<Result<Vec<_>>>()
                .map(Json::Array),
            (NestedKind::EmbedOne, other) => {
                Err(shape_error(property, "an embedded object", other))
            }
            (_, other) => Err(shape_error(property, "an array of embedded objects", other)),
        };
    }

    match property.converter_name() {
        Some(name) => converter(registry, name)?.to_field(value),
        None => Ok(value.clone()),
    }
}

fn decode_value(
    registry: &MappingRegistry,
    property: &PropertyMapping,
    value: &Json,
) -> Result<Json> {
    if let Some((kind, target)) = embedded_target(registry, property)? {
        return match (kind, value) {
            (_, Json::Null) => Ok(Json::Null),
            (NestedKind::EmbedOne, Json::Object(inner)) => {
                let concrete = concrete_mapping(registry, target, inner)?;
                Ok(Json::Object(decode(registry, concrete, inner)?))
            }
            (NestedKind::EmbedMany, Json::Array(items)) => items
                .iter()
                .map(|item| match item {
                    Json::Object(inner) => {
                        let concrete = concrete_mapping(registry, target, inner)?;
                        Ok(Json::Object(decode(registry, concrete, inner)?))
                    }
                    other => Err(shape_error(property, "an embedded document", other)),
                })
                .collect::<Result<Vec<_>>>()
                .map(Json::Array),
            (NestedKind::EmbedOne, other) => {
                Err(shape_error(property, "an embedded document", other))
            }
            (_, other) => Err(shape_error(property, "an array of embedded documents", other)),
        };
    }

    match property.converter_name() {
        Some(name) => converter(registry, name)?.to_property(value),
        None => Ok(value.clone()),
    }
}

fn converter<'r>(
    registry: &'r MappingRegistry,
    name: &str,
) -> Result<&'r std::sync::Arc<dyn docmodel_core::Converter>> {
    registry.converter(name).ok_or_else(|| Error::Conversion {
        converter: name.to_string(),
        message: "converter is not registered".to_string(),
    })
}
