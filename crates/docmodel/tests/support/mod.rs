//! Entities, descriptors and helpers shared by the integration tests.
#![allow(dead_code)]

use docmodel::prelude::*;
use docmodel::{CollectionRef, IndexMapping, IndexOrder};
use serde_json::Value as Json;

macro_rules! int_entity {
    ($ty:ident, $name:literal) => {
        impl Entity for $ty {
            const TYPE_NAME: &'static str = $name;

            fn identity(&self) -> Option<Identity> {
                self.id.map(Identity::Int)
            }

            fn set_identity(&mut self, identity: Identity) {
                if let Identity::Int(i) = identity {
                    self.id = Some(i);
                }
            }
        }
    };
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Animal {
    pub id: Option<i64>,
    pub name: String,
}
int_entity!(Animal, "Animal");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cat {
    pub id: Option<i64>,
    pub name: String,
    pub lives: u8,
}
int_entity!(Cat, "Cat");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dog {
    pub id: Option<i64>,
    pub name: String,
    #[serde(default)]
    pub nickname: Option<String>,
}
int_entity!(Dog, "Dog");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Line {
    pub sku: String,
    pub qty: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: Option<i64>,
    pub customer: String,
    #[serde(default)]
    pub lines: Vec<Line>,
    pub total: f64,
    pub placed_at: i64,
}
int_entity!(Order, "Order");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: Option<i64>,
    pub owner: String,
    pub balance: i64,
}
int_entity!(Account, "Account");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: Option<i64>,
    pub text: String,
}
int_entity!(Note, "Note");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Option<i64>,
    pub message: String,
}
int_entity!(AuditEntry, "AuditEntry");

pub fn descriptors() -> Vec<TypeDescriptor> {
    vec![
        TypeDescriptor::document("Animal")
            .property(PropertyMapping::identifier("id"))
            .property(PropertyMapping::new("name"))
            .index(IndexMapping::on("name", IndexOrder::Ascending)),
        TypeDescriptor::document("Cat")
            .extends("Animal")
            .property(PropertyMapping::identifier("id"))
            .property(PropertyMapping::new("name"))
            .property(PropertyMapping::new("lives")),
        TypeDescriptor::document("Dog")
            .extends("Animal")
            .property(PropertyMapping::identifier("id"))
            .property(PropertyMapping::new("name"))
            .property(PropertyMapping::new("nickname").field("nick")),
        TypeDescriptor::embedded("Line")
            .property(PropertyMapping::new("sku"))
            .property(PropertyMapping::new("qty").field("q")),
        TypeDescriptor::document("Order")
            .collection("orders")
            .property(PropertyMapping::identifier("id"))
            .property(PropertyMapping::new("customer"))
            .property(PropertyMapping::new("lines").embed_many("Line"))
            .property(PropertyMapping::new("total").converter("decimal"))
            .property(PropertyMapping::new("placed_at").converter("date")),
        TypeDescriptor::document("Account")
            .versioned()
            .property(PropertyMapping::identifier("id"))
            .property(PropertyMapping::new("owner").immutable())
            .property(PropertyMapping::new("balance")),
        TypeDescriptor::document("Note")
            .change_tracking(ChangeTracking::DeferredExplicit)
            .property(PropertyMapping::identifier("id"))
            .property(PropertyMapping::new("text")),
        TypeDescriptor::document("AuditEntry")
            .immutable()
            .property(PropertyMapping::identifier("id"))
            .property(PropertyMapping::new("message")),
    ]
}

pub fn registry() -> Arc<MappingRegistry> {
    let registry = MappingRegistry::builder()
        .entity::<Animal>()
        .entity::<Cat>()
        .entity::<Dog>()
        .entity::<Order>()
        .entity::<Account>()
        .entity::<Note>()
        .entity::<AuditEntry>()
        .build_from(descriptors())
        .expect("build mapping registry");
    Arc::new(registry)
}

pub fn session() -> (UnitOfWork<MemoryDriver>, MemoryDriver) {
    let driver = MemoryDriver::new();
    (UnitOfWork::new(registry(), driver.clone()), driver)
}

pub fn collection(name: &str) -> CollectionRef {
    CollectionRef::new(None, name)
}

pub fn doc(value: Json) -> Document {
    match value {
        Json::Object(map) => map,
        other => panic!("not a document: {other}"),
    }
}

pub fn unwrap_outcome<T>(outcome: Outcome<T, Error>) -> T {
    match outcome {
        Outcome::Ok(v) => v,
        Outcome::Err(e) => panic!("unexpected error: {e}"),
        Outcome::Cancelled(r) => panic!("cancelled: {r:?}"),
        Outcome::Panicked(p) => panic!("panicked: {p:?}"),
    }
}

pub fn expect_err<T>(outcome: Outcome<T, Error>) -> Error {
    match outcome {
        Outcome::Err(e) => e,
        Outcome::Ok(_) => panic!("expected an error, flush succeeded"),
        Outcome::Cancelled(r) => panic!("cancelled: {r:?}"),
        Outcome::Panicked(p) => panic!("panicked: {p:?}"),
    }
}
