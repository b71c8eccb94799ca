//! Identity and document values.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A stored document: external field name to JSON value.
pub type Document = serde_json::Map<String, serde_json::Value>;

/// An entity's serialized properties: declared property name to JSON value.
pub type Fields = serde_json::Map<String, serde_json::Value>;

/// The persisted identity (primary key) of a document.
///
/// Drivers generate identities with `Driver::create_identity`; callers may
/// also assign one before the first `save`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Identity {
    /// Integer key
    Int(i64),
    /// String key (including hex object ids)
    Text(String),
}

impl Identity {
    /// Read an identity out of a stored field value.
    ///
    /// Accepts integers, strings and the extended-JSON `{"$oid": "..."}` form.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Number(n) => n.as_i64().map(Identity::Int),
            serde_json::Value::String(s) if !s.is_empty() => Some(Identity::Text(s.clone())),
            serde_json::Value::Object(map) => map
                .get("$oid")
                .and_then(serde_json::Value::as_str)
                .map(|s| Identity::Text(s.to_string())),
            _ => None,
        }
    }

    /// The stored field value for this identity.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Identity::Int(i) => serde_json::Value::from(*i),
            Identity::Text(s) => serde_json::Value::String(s.clone()),
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::Int(i) => write!(f, "#{}", i),
            Identity::Text(s) => write!(f, "#{}", s),
        }
    }
}

impl From<i64> for Identity {
    fn from(value: i64) -> Self {
        Identity::Int(value)
    }
}

impl From<&str> for Identity {
    fn from(value: &str) -> Self {
        Identity::Text(value.to_string())
    }
}

impl From<String> for Identity {
    fn from(value: String) -> Self {
        Identity::Text(value)
    }
}

/// Lifecycle state of an object relative to one unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectState {
    /// Not yet known to the unit of work.
    New,
    /// Tracked in the identity map.
    Managed,
    /// Has an identity but is no longer (or not) the tracked instance.
    Detached,
    /// Scheduled for deletion.
    Removed,
}

impl ObjectState {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ObjectState::New => "new",
            ObjectState::Managed => "managed",
            ObjectState::Detached => "detached",
            ObjectState::Removed => "removed",
        }
    }
}
