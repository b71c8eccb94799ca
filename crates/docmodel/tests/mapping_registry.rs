mod support;

use docmodel::prelude::*;
use docmodel::{MappingErrorKind, codec};
use serde_json::json;
use support::{doc, registry};

fn kinds(err: &Error) -> Vec<MappingErrorKind> {
    err.mapping_issues()
        .unwrap_or_default()
        .iter()
        .map(|issue| issue.kind)
        .collect()
}

#[test]
fn hierarchy_defaults_follow_root() {
    let registry = registry();
    let animal = registry.resolve("Animal").unwrap();
    let cat = registry.resolve("Cat").unwrap();

    assert_eq!(animal.discriminator_field(), Some("__t"));
    assert_eq!(animal.lock_field(), Some("__l"));
    assert_eq!(animal.version_field(), Some("__v"));
    assert_eq!(animal.change_tracking(), ChangeTracking::DeferredImplicit);
    assert_eq!(cat.discriminator_field(), Some("__t"));
    assert_eq!(cat.discriminator_value(), Some("Cat"));
    assert_eq!(cat.collection(), Some("animal"));
    assert_eq!(cat.root(), animal.id());
}

#[test]
fn indexes_live_on_the_root() {
    let registry = registry();
    let names: Vec<String> = registry
        .indexes("Dog")
        .unwrap()
        .iter()
        .map(IndexMapping::resolved_name)
        .collect();
    assert_eq!(names.len(), 1);
    assert!(registry.resolve("Dog").unwrap().indexes().is_empty());
}

#[test]
fn collection_prefix_applies_to_derived_names() {
    let registry = MappingRegistry::builder()
        .config(MappingConfig::default().collection_prefix("ns."))
        .build_from(vec![
            TypeDescriptor::document("A").property(PropertyMapping::identifier("id")),
        ])
        .unwrap();
    assert_eq!(registry.resolve("A").unwrap().collection(), Some("ns.a"));
}

#[test]
fn provider_closure_builds_registry() {
    let provider = |config: &MappingConfig| -> Result<Vec<TypeDescriptor>> {
        Ok(vec![
            TypeDescriptor::document("Event")
                .change_tracking(config.change_tracking)
                .property(PropertyMapping::identifier("id")),
        ])
    };
    let registry = MappingRegistry::builder()
        .config(MappingConfig::default().change_tracking(ChangeTracking::DeferredExplicit))
        .build(&provider)
        .unwrap();
    assert_eq!(
        registry.resolve("Event").unwrap().change_tracking(),
        ChangeTracking::DeferredExplicit
    );
}

#[test]
fn duplicate_field_names_fail() {
    let err = MappingRegistry::builder()
        .build_from(vec![
            TypeDescriptor::document("User")
                .property(PropertyMapping::identifier("id"))
                .property(PropertyMapping::new("name").field("n"))
                .property(PropertyMapping::new("nick").field("n")),
        ])
        .unwrap_err();
    assert_eq!(kinds(&err), vec![MappingErrorKind::DuplicateField]);
}

#[test]
fn duplicate_discriminator_names_both_types() {
    let mut descriptors = support::descriptors();
    for descriptor in &mut descriptors {
        if descriptor.name == "Cat" || descriptor.name == "Dog" {
            descriptor.discriminator_value = Some("pet".to_string());
        }
    }
    let err = MappingRegistry::builder().build_from(descriptors).unwrap_err();
    let issues = err.mapping_issues().unwrap();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].kind, MappingErrorKind::DuplicateDiscriminator);
    assert!(issues[0].message.contains("Cat"));
    assert!(issues[0].message.contains("Dog"));
}

#[test]
fn immutable_with_explicit_tracking_is_incompatible() {
    let err = MappingRegistry::builder()
        .build_from(vec![
            TypeDescriptor::document("Ledger")
                .immutable()
                .change_tracking(ChangeTracking::DeferredExplicit)
                .property(PropertyMapping::identifier("id")),
        ])
        .unwrap_err();
    assert_eq!(kinds(&err), vec![MappingErrorKind::IncompatibleFlags]);
}

#[test]
fn validation_reports_every_fault() {
    let err = MappingRegistry::builder()
        .build_from(vec![
            TypeDescriptor::document("First")
                .collection("shared")
                .property(PropertyMapping::identifier("id"))
                .property(PropertyMapping::new("price").converter("money")),
            TypeDescriptor::document("Second")
                .collection("shared")
                .property(PropertyMapping::identifier("id")),
        ])
        .unwrap_err();
    let found = kinds(&err);
    assert!(found.contains(&MappingErrorKind::UnknownConverter));
    assert!(found.contains(&MappingErrorKind::DuplicateCollectionMapping));
}

#[test]
fn missing_collection_name_when_derivation_disabled() {
    let err = MappingRegistry::builder()
        .config(MappingConfig::default().default_collection_names(false))
        .build_from(vec![
            TypeDescriptor::document("Thing").property(PropertyMapping::identifier("id")),
        ])
        .unwrap_err();
    assert_eq!(kinds(&err), vec![MappingErrorKind::MissingCollectionName]);
}

#[test]
fn codec_round_trips_embedded_and_converted_fields() {
    let registry = registry();
    let order = registry.resolve("Order").unwrap();
    let fields = doc(json!({
        "id": 9,
        "customer": "ada",
        "lines": [{"sku": "A-1", "qty": 2}],
        "total": 12.5,
        "placed_at": 1_700_000_000_000_i64,
    }));

    let stored = codec::encode(&registry, order, &fields).unwrap();
    assert_eq!(stored.get("_id"), Some(&json!(9)));
    assert_eq!(stored.get("lines"), Some(&json!([{"sku": "A-1", "q": 2}])));
    assert_eq!(stored.get("total"), Some(&json!({"$numberDecimal": "12.5"})));
    assert_eq!(stored.get("placed_at"), Some(&json!({"$date": 1_700_000_000_000_i64})));
    assert!(!stored.contains_key("__t"));

    assert_eq!(codec::decode(&registry, order, &stored).unwrap(), fields);
}
