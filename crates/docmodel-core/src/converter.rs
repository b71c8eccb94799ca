//! Property value converters.
//!
//! A converter translates between a property's in-memory value and the
//! value stored in the document. Dirty checking uses [`Converter::equals`]
//! on stored values whenever a property has a converter, because converted
//! representations are not always structurally comparable.

use crate::error::{Error, MappingErrorKind, MappingIssue, Result};
use crate::property::PropertyMapping;
use regex::Regex;
use serde_json::Value as Json;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock};

/// Converts one property between its in-memory and stored forms.
pub trait Converter: Send + Sync {
    /// Registered name, used in error messages.
    fn name(&self) -> &str;

    /// In-memory value to stored value.
    fn to_field(&self, value: &Json) -> Result<Json>;

    /// Stored value to in-memory value.
    fn to_property(&self, field: &Json) -> Result<Json>;

    /// Whether two stored values represent the same property value.
    fn equals(&self, a: &Json, b: &Json) -> bool {
        a == b
    }
}

impl fmt::Debug for dyn Converter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Converter({})", self.name())
    }
}

/// Name-to-converter table plus declared-type associations.
#[derive(Clone, Default)]
pub struct ConverterRegistry {
    by_name: HashMap<String, Arc<dyn Converter>>,
    by_type: HashMap<String, String>,
}

impl fmt::Debug for ConverterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.by_name.keys().collect();
        names.sort();
        f.debug_struct("ConverterRegistry")
            .field("converters", &names)
            .field("associations", &self.by_type.len())
            .finish()
    }
}

impl ConverterRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the built-in `date` and `decimal` converters.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(DateConverter);
        registry.register(DecimalConverter);
        registry
    }

    /// Register a converter under its own name, replacing any previous one.
    pub fn register(&mut self, converter: impl Converter + 'static) {
        let name = converter.name().to_string();
        tracing::trace!(converter = %name, "registered converter");
        self.by_name.insert(name, Arc::new(converter));
    }

    /// Use the named converter for every property declared with `type_name`.
    pub fn associate(&mut self, type_name: impl Into<String>, converter: impl Into<String>) {
        self.by_type.insert(type_name.into(), converter.into());
    }

    /// Look up a converter by name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Converter>> {
        self.by_name.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Resolve the converter a property should use.
    ///
    /// An explicit converter name wins over a declared-type association.
    /// Returns `Ok(None)` when the property needs no conversion.
    pub fn resolve_for(
        &self,
        owner: &str,
        property: &PropertyMapping,
    ) -> std::result::Result<Option<String>, MappingIssue> {
        let wanted = property.converter_name().map(str::to_string).or_else(|| {
            property
                .declared_type_name()
                .and_then(|t| self.by_type.get(t).cloned())
        });

        match wanted {
            None => Ok(None),
            Some(name) if self.contains(&name) => Ok(Some(name)),
            Some(name) => Err(MappingIssue::new(
                owner,
                MappingErrorKind::UnknownConverter,
                format!(
                    "property '{}' uses converter '{}' which is not registered",
                    property.name(),
                    name
                ),
            )),
        }
    }
}

fn conversion_error(converter: &str, message: impl Into<String>) -> Error {
    Error::Conversion {
        converter: converter.to_string(),
        message: message.into(),
    }
}

/// Epoch milliseconds stored as `{"$date": millis}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DateConverter;

impl Converter for DateConverter {
    fn name(&self) -> &str {
        "date"
    }

    fn to_field(&self, value: &Json) -> Result<Json> {
        match value {
            Json::Null => Ok(Json::Null),
            Json::Number(n) if n.is_i64() => Ok(serde_json::json!({ "$date": n })),
            other => Err(conversion_error(
                "date",
                format!("expected epoch milliseconds, found {other}"),
            )),
        }
    }

    fn to_property(&self, field: &Json) -> Result<Json> {
        match field {
            Json::Null => Ok(Json::Null),
            Json::Object(map) => match map.get("$date") {
                Some(Json::Number(n)) if n.is_i64() => Ok(Json::Number(n.clone())),
                _ => Err(conversion_error("date", "object without integer $date")),
            },
            // Plain integers are accepted as already-converted values
            Json::Number(n) if n.is_i64() => Ok(Json::Number(n.clone())),
            other => Err(conversion_error("date", format!("unexpected value {other}"))),
        }
    }
}

static DECIMAL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^-?\d+(\.\d+)?([eE][+-]?\d+)?$").unwrap_or_else(|_| unreachable!())
});

/// Numbers stored as `{"$numberDecimal": "<digits>"}`.
///
/// Equality is numeric, so `"1.50"` and `"1.5"` compare equal.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecimalConverter;

impl DecimalConverter {
    fn parse(field: &Json) -> Option<f64> {
        match field {
            Json::Object(map) => map
                .get("$numberDecimal")
                .and_then(Json::as_str)
                .filter(|s| DECIMAL_PATTERN.is_match(s))
                .and_then(|s| s.parse::<f64>().ok()),
            Json::Number(n) => n.as_f64(),
            _ => None,
        }
    }
}

impl Converter for DecimalConverter {
    fn name(&self) -> &str {
        "decimal"
    }

    fn to_field(&self, value: &Json) -> Result<Json> {
        match value {
            Json::Null => Ok(Json::Null),
            Json::Number(n) => Ok(serde_json::json!({ "$numberDecimal": n.to_string() })),
            Json::String(s) if DECIMAL_PATTERN.is_match(s) => {
                Ok(serde_json::json!({ "$numberDecimal": s }))
            }
            other => Err(conversion_error(
                "decimal",
                format!("expected a number, found {other}"),
            )),
        }
    }

    fn to_property(&self, field: &Json) -> Result<Json> {
        if field.is_null() {
            return Ok(Json::Null);
        }
        Self::parse(field)
            .and_then(serde_json::Number::from_f64)
            .map(Json::Number)
            .ok_or_else(|| conversion_error("decimal", format!("not a decimal: {field}")))
    }

    fn equals(&self, a: &Json, b: &Json) -> bool {
        match (Self::parse(a), Self::parse(b)) {
            (Some(x), Some(y)) => (x - y).abs() <= f64::EPSILON * x.abs().max(y.abs()).max(1.0),
            _ => a == b,
        }
    }
}
