//! Mapping configuration and the defaults it supplies.

/// Default discriminator field name.
pub const DEFAULT_DISCRIMINATOR_FIELD: &str = "__t";
/// Default pessimistic-lock field name.
pub const DEFAULT_LOCK_FIELD: &str = "__l";
/// Default version field name.
pub const DEFAULT_VERSION_FIELD: &str = "__v";

/// How a type's changes are discovered at flush time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChangeTracking {
    /// Every managed object is diffed against its snapshot on flush.
    #[default]
    DeferredImplicit,
    /// Only objects passed to `save` since the last flush are diffed.
    DeferredExplicit,
}

/// Configuration consumed while building a mapping registry.
#[derive(Debug, Clone)]
pub struct MappingConfig {
    /// Discriminator field given to inheritance roots that declare none.
    pub discriminator_field: String,
    /// Lock field given to inheritance roots that declare none.
    pub lock_field: String,
    /// Version field given to inheritance roots that declare none.
    pub version_field: String,
    /// Change tracking given to inheritance roots that declare none.
    pub change_tracking: ChangeTracking,
    /// Prefix prepended to every resolved collection name.
    pub collection_prefix: Option<String>,
    /// Database given to inheritance roots that declare none.
    pub default_database: Option<String>,
    /// Whether a root document without a collection name gets one derived
    /// from its type name. When false, that is a build error.
    pub default_collection_names: bool,
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            discriminator_field: DEFAULT_DISCRIMINATOR_FIELD.to_string(),
            lock_field: DEFAULT_LOCK_FIELD.to_string(),
            version_field: DEFAULT_VERSION_FIELD.to_string(),
            change_tracking: ChangeTracking::DeferredImplicit,
            collection_prefix: None,
            default_database: None,
            default_collection_names: true,
        }
    }
}

impl MappingConfig {
    /// Create new default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default discriminator field (builder pattern).
    #[must_use]
    pub fn discriminator_field(mut self, name: impl Into<String>) -> Self {
        self.discriminator_field = name.into();
        self
    }

    /// Set the default lock field (builder pattern).
    #[must_use]
    pub fn lock_field(mut self, name: impl Into<String>) -> Self {
        self.lock_field = name.into();
        self
    }

    /// Set the default version field (builder pattern).
    #[must_use]
    pub fn version_field(mut self, name: impl Into<String>) -> Self {
        self.version_field = name.into();
        self
    }

    /// Set the default change tracking mode (builder pattern).
    #[must_use]
    pub fn change_tracking(mut self, mode: ChangeTracking) -> Self {
        self.change_tracking = mode;
        self
    }

    /// Set the collection name prefix (builder pattern).
    #[must_use]
    pub fn collection_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.collection_prefix = Some(prefix.into());
        self
    }

    /// Set the default database (builder pattern).
    #[must_use]
    pub fn default_database(mut self, name: impl Into<String>) -> Self {
        self.default_database = Some(name.into());
        self
    }

    /// Enable/disable derived collection names (builder pattern).
    #[must_use]
    pub fn default_collection_names(mut self, enabled: bool) -> Self {
        self.default_collection_names = enabled;
        self
    }

    /// Collection name derived from a declared type name.
    pub fn derived_collection_name(&self, type_name: &str) -> String {
        type_name.to_lowercase()
    }

    /// Apply the configured prefix to a collection name.
    pub fn prefixed(&self, collection: &str) -> String {
        match &self.collection_prefix {
            Some(prefix) => format!("{prefix}{collection}"),
            None => collection.to_string(),
        }
    }
}
