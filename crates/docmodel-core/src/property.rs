//! Property (field) mapping definitions.

/// Field name used for identifier properties unless one is given explicitly.
pub const IDENTIFIER_FIELD: &str = "_id";

/// Boolean flags on a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PropertyFlags {
    /// Transient: never stored, never diffed
    pub ignored: bool,
    /// May not change once the object is persisted
    pub immutable: bool,
    /// Raw binary payload
    pub buffer: bool,
    /// Holds the object's identity
    pub identifier: bool,
}

/// How a property's value relates to another mapped type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NestedKind {
    /// A single embedded document
    EmbedOne,
    /// An array of embedded documents
    EmbedMany,
    /// The identity of another document
    ReferenceOne,
    /// An enumeration stored by value
    Enum,
}

/// A property's link to another mapped type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NestedMapping {
    pub kind: NestedKind,
    /// Declared name of the target type
    pub target: String,
}

/// Metadata about one mapped property.
///
/// Invariant: an ignored property has no external field name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyMapping {
    name: String,
    field_name: Option<String>,
    declared_type: Option<String>,
    flags: PropertyFlags,
    converter: Option<String>,
    nested: Option<NestedMapping>,
}

impl PropertyMapping {
    /// Create a property stored under its own name.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            field_name: Some(name.clone()),
            name,
            declared_type: None,
            flags: PropertyFlags::default(),
            converter: None,
            nested: None,
        }
    }

    /// Create the identifier property, stored as `_id`.
    pub fn identifier(name: impl Into<String>) -> Self {
        let mut p = Self::new(name);
        p.flags.identifier = true;
        p.field_name = Some(IDENTIFIER_FIELD.to_string());
        p
    }

    /// Set the external field name. Has no effect on ignored properties.
    pub fn field(mut self, name: impl Into<String>) -> Self {
        if !self.flags.ignored {
            self.field_name = Some(name.into());
        }
        self
    }

    /// Mark as transient; drops the external field name.
    pub fn ignored(mut self) -> Self {
        self.flags.ignored = true;
        self.field_name = None;
        self
    }

    /// Mark as immutable once persisted.
    pub fn immutable(mut self) -> Self {
        self.flags.immutable = true;
        self
    }

    /// Mark as a binary buffer.
    pub fn buffer(mut self) -> Self {
        self.flags.buffer = true;
        self
    }

    /// Set the declared value type (used for converter association).
    pub fn declared_type(mut self, type_name: impl Into<String>) -> Self {
        self.declared_type = Some(type_name.into());
        self
    }

    /// Convert values with the named converter.
    pub fn converter(mut self, name: impl Into<String>) -> Self {
        self.converter = Some(name.into());
        self
    }

    /// Embed a single document of the target type.
    pub fn embed_one(self, target: impl Into<String>) -> Self {
        self.nested(NestedKind::EmbedOne, target)
    }

    /// Embed an array of documents of the target type.
    pub fn embed_many(self, target: impl Into<String>) -> Self {
        self.nested(NestedKind::EmbedMany, target)
    }

    /// Store the identity of a document of the target type.
    pub fn reference_one(self, target: impl Into<String>) -> Self {
        self.nested(NestedKind::ReferenceOne, target)
    }

    /// Store an enumeration value of the target type.
    pub fn enumeration(self, target: impl Into<String>) -> Self {
        self.nested(NestedKind::Enum, target)
    }

    fn nested(mut self, kind: NestedKind, target: impl Into<String>) -> Self {
        self.nested = Some(NestedMapping {
            kind,
            target: target.into(),
        });
        self
    }

    /// Declared property name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// External field name; `None` only for ignored properties.
    pub fn field_name(&self) -> Option<&str> {
        self.field_name.as_deref()
    }

    pub fn declared_type_name(&self) -> Option<&str> {
        self.declared_type.as_deref()
    }

    pub fn flags(&self) -> PropertyFlags {
        self.flags
    }

    pub fn converter_name(&self) -> Option<&str> {
        self.converter.as_deref()
    }

    pub fn nested_mapping(&self) -> Option<&NestedMapping> {
        self.nested.as_ref()
    }

    /// Whether this property takes part in persistence and dirty checking.
    pub fn is_persisted(&self) -> bool {
        !self.flags.ignored && self.field_name.is_some()
    }

    pub fn is_identifier(&self) -> bool {
        self.flags.identifier
    }

    pub fn is_immutable(&self) -> bool {
        self.flags.immutable
    }

    /// Record the converter resolved for this property at build time.
    pub fn set_resolved_converter(&mut self, name: impl Into<String>) {
        self.converter = Some(name.into());
    }
}
