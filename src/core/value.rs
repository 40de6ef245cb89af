//! core::value
//!
//! The structured value type stored in resource attributes and carried in
//! operation requests and responses.
//!
//! # Types
//!
//! - [`Value`] - A typed attribute value (undefined, boolean, number,
//!   string, list, object, or deferred expression)
//!
//! # JSON Mapping
//!
//! Values serialize through `serde_json`:
//!
//! - `Undefined` maps to JSON `null`
//! - `Expression` maps to a single-key object `{"EXPRESSION_VALUE": "..."}`
//!   so that deferred expressions survive a serialize/deserialize round trip
//! - All other variants map to their natural JSON counterparts
//!
//! # Examples
//!
//! ```
//! use stagecraft::core::value::Value;
//!
//! let v = Value::object([("enabled", Value::Boolean(true))]);
//! assert_eq!(v.get("enabled").and_then(Value::as_bool), Some(true));
//!
//! let expr = Value::Expression("${bind.port:8080}".into());
//! let json = serde_json::to_string(&expr).unwrap();
//! let back: Value = serde_json::from_str(&json).unwrap();
//! assert_eq!(expr, back);
//! ```

use std::collections::BTreeMap;

use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

/// Marker key used to round-trip [`Value::Expression`] through JSON.
const EXPRESSION_KEY: &str = "EXPRESSION_VALUE";

/// A structured, typed value.
///
/// This is the unit of data the engine moves around: attribute values in
/// the resource tree, operation request parameters, and response payloads.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// No value. Reading an attribute that was never written yields this.
    #[default]
    Undefined,
    /// A boolean.
    Boolean(bool),
    /// A number. Stored as `f64`; integral values round-trip exactly up to
    /// 2^53, larger integers are representable but lose precision.
    Number(f64),
    /// A string.
    String(String),
    /// An ordered list of values.
    List(Vec<Value>),
    /// A string-keyed mapping of values, ordered by key.
    Object(BTreeMap<String, Value>),
    /// A deferred expression such as `${name}` or `${name:default}`,
    /// resolved later by an expression resolver.
    Expression(String),
}

impl Value {
    /// Build an object value from an iterator of key/value pairs.
    pub fn object<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Object(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v))
                .collect(),
        )
    }

    /// Whether this value is anything other than `Undefined`.
    pub fn is_defined(&self) -> bool {
        !matches!(self, Value::Undefined)
    }

    /// The boolean payload, if this is a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// The numeric payload, if this is a number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The string payload, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// The list payload, if this is a list.
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// The object payload, if this is an object.
    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    /// The expression payload, if this is a deferred expression.
    pub fn as_expression(&self) -> Option<&str> {
        match self {
            Value::Expression(e) => Some(e),
            _ => None,
        }
    }

    /// Look up a key, if this is an object. Returns `None` otherwise.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_object().and_then(|map| map.get(key))
    }

    /// Insert a key into this value, coercing `Undefined` into an empty
    /// object first. Returns the previous value for the key, if any.
    ///
    /// This is the write path for response payloads: handlers build up
    /// their result object incrementally.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        if matches!(self, Value::Undefined) {
            *self = Value::Object(BTreeMap::new());
        }
        match self {
            Value::Object(map) => map.insert(key.into(), value),
            // Inserting into a non-object replaces it wholesale.
            other => {
                let mut map = BTreeMap::new();
                map.insert(key.into(), value);
                let old = std::mem::replace(other, Value::Object(map));
                Some(old)
            }
        }
    }

    /// A short name for the variant, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Boolean(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Object(_) => "object",
            Value::Expression(_) => "expression",
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&Value> for serde_json::Value {
    fn from(value: &Value) -> serde_json::Value {
        match value {
            Value::Undefined => serde_json::Value::Null,
            Value::Boolean(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(serde_json::Value::from).collect())
            }
            Value::Object(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), serde_json::Value::from(v)))
                    .collect(),
            ),
            Value::Expression(e) => {
                let mut map = serde_json::Map::new();
                map.insert(
                    EXPRESSION_KEY.to_string(),
                    serde_json::Value::String(e.clone()),
                );
                serde_json::Value::Object(map)
            }
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Value {
        match value {
            serde_json::Value::Null => Value::Undefined,
            serde_json::Value::Bool(b) => Value::Boolean(b),
            serde_json::Value::Number(n) => match n.as_f64() {
                Some(f) => Value::Number(f),
                // Only arbitrary-precision numbers have no f64 form; map
                // them to Undefined rather than a never-equal NaN.
                None => Value::Undefined,
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                // A single-key {"EXPRESSION_VALUE": "..."} object is the
                // wire form of a deferred expression.
                if map.len() == 1 {
                    if let Some(serde_json::Value::String(e)) = map.get(EXPRESSION_KEY) {
                        return Value::Expression(e.clone());
                    }
                }
                Value::Object(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serde_json::Value::from(self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let json = serde_json::Value::deserialize(deserializer)?;
        Ok(Value::from(json))
    }
}
