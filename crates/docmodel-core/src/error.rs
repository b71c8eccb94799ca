//! Error types for DocModel operations.

use crate::value::{Identity, ObjectState};
use std::fmt;

/// The primary error type for all DocModel operations.
#[derive(Debug)]
pub enum Error {
    /// Mapping construction failed (every issue found in the batch)
    Mapping(MappingError),
    /// The object's type has no mapping (or is not a persistable document)
    UnmappedType(String),
    /// Operation attempted on a detached object
    DetachedObject {
        /// Declared type name of the object
        type_name: String,
        /// Identity of the object
        identity: Identity,
    },
    /// The requested transition is not allowed from the object's current state
    InvalidState {
        /// Declared type name of the object
        type_name: String,
        /// State the object was in
        state: ObjectState,
        /// The operation that was attempted
        operation: &'static str,
    },
    /// A loaded document carries no primary key
    MissingIdentity {
        /// Type the document was loaded as
        type_name: String,
    },
    /// A document names a discriminator value the hierarchy does not know
    UnknownDiscriminator {
        /// Inheritance root the value was looked up under
        root: String,
        /// The unknown value
        value: String,
    },
    /// A loaded object is not of the requested concrete type
    TypeMismatch {
        /// Requested type
        expected: &'static str,
        /// Type the document resolved to
        found: String,
    },
    /// Driver-level errors (connection, write, timeout)
    Driver(DriverError),
    /// A write batch failed during flush
    Flush(FlushError),
    /// A versioned update matched fewer documents than expected
    VersionConflict {
        /// Collection the conflicting batch targeted
        collection: String,
        /// Number of guarded updates sent
        expected: u64,
        /// Number of documents the driver matched
        matched: u64,
    },
    /// Property value conversion failed
    Conversion {
        /// Converter name
        converter: String,
        /// What went wrong
        message: String,
    },
    /// A lock guarding a managed object was poisoned
    LockPoisoned(&'static str),
    /// Operation was cancelled via asupersync
    Cancelled,
    /// Serialization/deserialization errors
    Serde(String),
    /// Custom error with message
    Custom(String),
}

/// Category of a single mapping construction fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingErrorKind {
    /// Two properties share a name or an external field name
    DuplicateField,
    /// Two types in one hierarchy claim the same discriminator value
    DuplicateDiscriminator,
    /// A property names a converter that is not registered
    UnknownConverter,
    /// A document root has no collection name and defaults are disabled
    MissingCollectionName,
    /// Two hierarchies resolve to the same database/collection pair
    DuplicateCollectionMapping,
    /// Flags that cannot be combined (e.g. immutable + explicit tracking)
    IncompatibleFlags,
    /// Two descriptors declare the same type name
    DuplicateType,
    /// A type names a parent that was not provided
    UnknownParent,
    /// Parent links form a cycle
    InheritanceCycle,
    /// A nested mapping targets a type that was not provided
    UnknownNestedType,
    /// An external field name is not storable
    InvalidFieldName,
}

impl MappingErrorKind {
    /// Stable name used in messages.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            MappingErrorKind::DuplicateField => "DuplicateFieldError",
            MappingErrorKind::DuplicateDiscriminator => "DuplicateDiscriminatorError",
            MappingErrorKind::UnknownConverter => "UnknownConverterError",
            MappingErrorKind::MissingCollectionName => "MissingCollectionNameError",
            MappingErrorKind::DuplicateCollectionMapping => "DuplicateCollectionMappingError",
            MappingErrorKind::IncompatibleFlags => "IncompatibleFlagsError",
            MappingErrorKind::DuplicateType => "DuplicateTypeError",
            MappingErrorKind::UnknownParent => "UnknownParentError",
            MappingErrorKind::InheritanceCycle => "InheritanceCycleError",
            MappingErrorKind::UnknownNestedType => "UnknownNestedTypeError",
            MappingErrorKind::InvalidFieldName => "InvalidFieldNameError",
        }
    }
}

/// A single mapping construction fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingIssue {
    /// Type the fault was found on
    pub type_name: String,
    /// The kind of fault
    pub kind: MappingErrorKind,
    /// Human-readable error message
    pub message: String,
}

impl MappingIssue {
    /// Create a new issue.
    pub fn new(
        type_name: impl Into<String>,
        kind: MappingErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            type_name: type_name.into(),
            kind,
            message: message.into(),
        }
    }
}

/// Every fault found while building a mapping registry.
#[derive(Debug, Clone, Default)]
pub struct MappingError {
    /// The issues, in discovery order
    pub issues: Vec<MappingIssue>,
}

impl MappingError {
    /// Create a new empty issue container.
    pub fn new() -> Self {
        Self { issues: Vec::new() }
    }

    /// Check if there are any issues.
    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    /// Record an issue.
    pub fn push(&mut self, issue: MappingIssue) {
        self.issues.push(issue);
    }

    /// Check whether an issue of the given kind was recorded.
    pub fn has(&self, kind: MappingErrorKind) -> bool {
        self.issues.iter().any(|i| i.kind == kind)
    }

    /// Issues of the given kind.
    pub fn of_kind(&self, kind: MappingErrorKind) -> impl Iterator<Item = &MappingIssue> {
        self.issues.iter().filter(move |i| i.kind == kind)
    }

    /// Convert to Result, returning Ok(()) if no issues, Err(self) otherwise.
    pub fn into_result(self) -> std::result::Result<(), Self> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

#[derive(Debug)]
pub struct DriverError {
    pub kind: DriverErrorKind,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverErrorKind {
    /// Connection lost or refused
    Connection,
    /// The store rejected a write
    Write,
    /// A duplicate primary key was written
    DuplicateKey,
    /// The driver gave up waiting
    Timeout,
    /// Other driver failure
    Other,
}

impl DriverError {
    /// Create a driver error without a source.
    pub fn new(kind: DriverErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }
}

/// Which scheduled operation a failed batch belonged to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOperation {
    Insert,
    Update,
    Delete,
}

impl FlushOperation {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            FlushOperation::Insert => "insert",
            FlushOperation::Update => "update",
            FlushOperation::Delete => "delete",
        }
    }
}

#[derive(Debug)]
pub struct FlushError {
    pub operation: FlushOperation,
    pub collection: String,
    /// Documents in the failed batch
    pub documents: usize,
    pub source: Box<Error>,
}

impl Error {
    /// Is this a retryable error (driver timeouts, version conflicts)?
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Driver(d) => matches!(
                d.kind,
                DriverErrorKind::Timeout | DriverErrorKind::Connection
            ),
            Error::Flush(f) => f.source.is_retryable(),
            Error::VersionConflict { .. } => true,
            _ => false,
        }
    }

    /// Is this a mapping construction error?
    pub fn is_mapping_error(&self) -> bool {
        matches!(self, Error::Mapping(_))
    }

    /// Get the mapping issues, if this is a mapping construction error.
    pub fn mapping_issues(&self) -> Option<&[MappingIssue]> {
        match self {
            Error::Mapping(m) => Some(&m.issues),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Mapping(e) => write!(f, "Mapping error: {}", e),
            Error::UnmappedType(name) => write!(f, "UnmappedTypeError: no mapping for '{}'", name),
            Error::DetachedObject {
                type_name,
                identity,
            } => write!(
                f,
                "DetachedObjectError: {} {} is detached from this unit of work",
                type_name, identity
            ),
            Error::InvalidState {
                type_name,
                state,
                operation,
            } => write!(
                f,
                "InvalidStateError: cannot {} a {} object of type {}",
                operation,
                state.as_str(),
                type_name
            ),
            Error::MissingIdentity { type_name } => write!(
                f,
                "MissingIdentityError: document for {} has no primary key",
                type_name
            ),
            Error::UnknownDiscriminator { root, value } => write!(
                f,
                "Unknown discriminator value '{}' in hierarchy {}",
                value, root
            ),
            Error::TypeMismatch { expected, found } => {
                write!(f, "Type mismatch: expected {}, found {}", expected, found)
            }
            Error::Driver(e) => write!(f, "Driver error: {}", e.message),
            Error::Flush(e) => write!(f, "Flush error: {}", e),
            Error::VersionConflict {
                collection,
                expected,
                matched,
            } => write!(
                f,
                "Version conflict in '{}': {} of {} guarded updates matched",
                collection, matched, expected
            ),
            Error::Conversion { converter, message } => {
                write!(f, "Conversion error ({}): {}", converter, message)
            }
            Error::LockPoisoned(what) => write!(f, "Lock poisoned: {}", what),
            Error::Cancelled => write!(f, "Operation cancelled"),
            Error::Serde(msg) => write!(f, "Serialization error: {}", msg),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Driver(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Flush(e) => Some(e.source.as_ref()),
            Error::Mapping(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for MappingIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on {}: {}", self.kind.as_str(), self.type_name, self.message)
    }
}

impl fmt::Display for MappingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.issues.is_empty() {
            write!(f, "mapping is valid")
        } else if self.issues.len() == 1 {
            write!(f, "{}", self.issues[0])
        } else {
            writeln!(f, "{} mapping issues:", self.issues.len())?;
            for issue in &self.issues {
                writeln!(f, "  - {}", issue)?;
            }
            Ok(())
        }
    }
}

impl std::error::Error for MappingError {}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for FlushError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} batch of {} document(s) on '{}' failed: {}",
            self.operation.as_str(),
            self.documents,
            self.collection,
            self.source
        )
    }
}

impl From<MappingError> for Error {
    fn from(err: MappingError) -> Self {
        Error::Mapping(err)
    }
}

impl From<MappingIssue> for Error {
    fn from(issue: MappingIssue) -> Self {
        Error::Mapping(MappingError {
            issues: vec![issue],
        })
    }
}

impl From<DriverError> for Error {
    fn from(err: DriverError) -> Self {
        Error::Driver(err)
    }
}

impl From<FlushError> for Error {
    fn from(err: FlushError) -> Self {
        Error::Flush(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serde(err.to_string())
    }
}

/// Result type alias for DocModel operations.
pub type Result<T> = std::result::Result<T, Error>;
