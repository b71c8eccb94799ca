//! Persistable entities and their type-erased handles.
//!
//! User types implement [`Entity`] and are shared as [`EntityRef`]s. The
//! unit of work only ever sees them through [`AnyEntity`], which keeps the
//! object's allocation identity so that "the same instance" can be checked
//! with [`AnyEntity::ptr_eq`].

use crate::error::{Error, Result};
use crate::value::{Fields, Identity};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::any::Any;
use std::fmt;
use std::sync::{Arc, RwLock};

/// A type that can be mapped to documents.
///
/// Properties are read and written through serde: the serialized form of
/// the value must be a JSON object keyed by declared property name.
pub trait Entity: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Declared type name, as used in the mapping registry.
    const TYPE_NAME: &'static str;

    /// The object's identity, if it has one.
    fn identity(&self) -> Option<Identity>;

    /// Assign the object's identity.
    fn set_identity(&mut self, identity: Identity);

    /// Wrap into a shared handle.
    fn into_ref(self) -> EntityRef<Self>
    where
        Self: Sized,
    {
        Arc::new(RwLock::new(self))
    }
}

/// Shared, mutable handle to a managed object.
pub type EntityRef<M> = Arc<RwLock<M>>;

/// Object-safe view of an entity behind a lock.
pub trait ErasedEntity: Send + Sync {
    fn type_name(&self) -> &'static str;

    fn identity(&self) -> Result<Option<Identity>>;

    fn assign_identity(&self, identity: Identity) -> Result<()>;

    /// Current property values keyed by property name.
    fn fields(&self) -> Result<Fields>;

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<M: Entity> ErasedEntity for RwLock<M> {
    fn type_name(&self) -> &'static str {
        M::TYPE_NAME
    }

    fn identity(&self) -> Result<Option<Identity>> {
        let guard = self.read().map_err(|_| Error::LockPoisoned("entity read"))?;
        Ok(guard.identity())
    }

    fn assign_identity(&self, identity: Identity) -> Result<()> {
        let mut guard = self
            .write()
            .map_err(|_| Error::LockPoisoned("entity write"))?;
        guard.set_identity(identity);
        Ok(())
    }

    fn fields(&self) -> Result<Fields> {
        let guard = self.read().map_err(|_| Error::LockPoisoned("entity read"))?;
        match serde_json::to_value(&*guard)? {
            serde_json::Value::Object(map) => Ok(map),
            other => Err(Error::Serde(format!(
                "{} serialized to {}, expected an object",
                M::TYPE_NAME,
                json_kind(&other)
            ))),
        }
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

/// Type-erased shared handle to a managed object.
#[derive(Clone)]
pub struct AnyEntity(Arc<dyn ErasedEntity>);

impl AnyEntity {
    /// Wrap a fresh value.
    pub fn new<M: Entity>(entity: M) -> Self {
        Self(Arc::new(RwLock::new(entity)))
    }

    /// Share an existing handle; the result is the same instance.
    pub fn from_ref<M: Entity>(entity: &EntityRef<M>) -> Self {
        let erased: Arc<dyn ErasedEntity> = entity.clone();
        Self(erased)
    }

    /// Recover the typed handle, if the object is an `M`.
    pub fn downcast<M: Entity>(&self) -> Option<EntityRef<M>> {
        Arc::clone(&self.0).as_any().downcast::<RwLock<M>>().ok()
    }

    /// Whether both handles point at the same object.
    pub fn ptr_eq(&self, other: &AnyEntity) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.0), Arc::as_ptr(&other.0))
    }

    pub fn type_name(&self) -> &'static str {
        self.0.type_name()
    }

    pub fn identity(&self) -> Result<Option<Identity>> {
        self.0.identity()
    }

    pub fn assign_identity(&self, identity: Identity) -> Result<()> {
        self.0.assign_identity(identity)
    }

    pub fn fields(&self) -> Result<Fields> {
        self.0.fields()
    }
}

impl fmt::Debug for AnyEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AnyEntity").field(&self.type_name()).finish()
    }
}

impl<M: Entity> From<&EntityRef<M>> for AnyEntity {
    fn from(entity: &EntityRef<M>) -> Self {
        Self::from_ref(entity)
    }
}

/// Builds a fresh object from decoded property values.
pub type Hydrator = fn(Fields) -> Result<AnyEntity>;

/// Hydrator for `M`, deserializing the properties with serde.
pub fn hydrate<M: Entity>(fields: Fields) -> Result<AnyEntity> {
    let entity: M = serde_json::from_value(serde_json::Value::Object(fields))?;
    Ok(AnyEntity::new(entity))
}
