//! engine::resolver
//!
//! Expression resolution for deferred `${...}` values.
//!
//! # Architecture
//!
//! Attribute values may carry [`Value::Expression`] placeholders that are
//! resolved only when an operation needs the concrete value, typically
//! right before a `Runtime` step configures a live service. The resolver
//! is an external collaborator behind the [`ExpressionResolver`] trait;
//! the engine only passes values through it and surfaces failures as
//! modeled operation failures.
//!
//! # Expression Forms
//!
//! - `${name}` - resolves to the property `name`, failing if unset
//! - `${name:default}` - resolves to the property `name`, or `default`
//!
//! # Example
//!
//! ```
//! use stagecraft::core::value::Value;
//! use stagecraft::engine::resolver::{EnvResolver, ExpressionResolver};
//!
//! let resolver = EnvResolver::new().with_property("port", "8080");
//! let resolved = resolver
//!     .resolve(&Value::Expression("${port}".into()))
//!     .unwrap();
//! assert_eq!(resolved, Value::String("8080".into()));
//!
//! let defaulted = resolver
//!     .resolve(&Value::Expression("${host:localhost}".into()))
//!     .unwrap();
//! assert_eq!(defaulted, Value::String("localhost".into()));
//! ```

use std::collections::BTreeMap;

use thiserror::Error;

use crate::core::value::Value;

/// Errors from expression resolution.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    /// The expression text is not of the `${name}` / `${name:default}` form.
    #[error("malformed expression '{0}'")]
    Malformed(String),

    /// No property matched the expression and no default was given.
    #[error("unresolvable expression '{0}'")]
    Unresolvable(String),
}

/// Resolves deferred expressions inside structured values.
pub trait ExpressionResolver: Send + Sync {
    /// Look up one property by name.
    fn lookup(&self, name: &str) -> Option<String>;

    /// Return a copy of `value` with every [`Value::Expression`] replaced
    /// by its resolved string, recursing through lists and objects.
    ///
    /// # Errors
    ///
    /// Fails on the first malformed or unresolvable expression found.
    fn resolve(&self, value: &Value) -> Result<Value, ResolveError> {
        match value {
            Value::Expression(text) => {
                let (name, default) = parse_expression(text)?;
                match self.lookup(name).or_else(|| default.map(str::to_string)) {
                    Some(resolved) => Ok(Value::String(resolved)),
                    None => Err(ResolveError::Unresolvable(text.clone())),
                }
            }
            Value::List(items) => items
                .iter()
                .map(|item| self.resolve(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            Value::Object(map) => map
                .iter()
                .map(|(k, v)| self.resolve(v).map(|r| (k.clone(), r)))
                .collect::<Result<BTreeMap<_, _>, _>>()
                .map(Value::Object),
            other => Ok(other.clone()),
        }
    }
}

/// Split `${name}` / `${name:default}` into its parts.
fn parse_expression(text: &str) -> Result<(&str, Option<&str>), ResolveError> {
    let body = text
        .strip_prefix("${")
        .and_then(|rest| rest.strip_suffix('}'))
        .ok_or_else(|| ResolveError::Malformed(text.to_string()))?;
    if body.is_empty() {
        return Err(ResolveError::Malformed(text.to_string()));
    }
    match body.split_once(':') {
        Some((name, default)) if !name.is_empty() => Ok((name, Some(default))),
        Some(_) => Err(ResolveError::Malformed(text.to_string())),
        None => Ok((body, None)),
    }
}

/// Resolver backed by an explicit property map, optionally falling back
/// to process environment variables.
#[derive(Debug, Default)]
pub struct EnvResolver {
    properties: BTreeMap<String, String>,
    use_process_env: bool,
}

impl EnvResolver {
    /// Create a resolver with no properties and no environment fallback.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a property.
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Fall back to process environment variables for unknown names.
    pub fn with_process_env(mut self) -> Self {
        self.use_process_env = true;
        self
    }
}

impl ExpressionResolver for EnvResolver {
    fn lookup(&self, name: &str) -> Option<String> {
        self.properties.get(name).cloned().or_else(|| {
            if self.use_process_env {
                std::env::var(name).ok()
            } else {
                None
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> EnvResolver {
        EnvResolver::new().with_property("port", "8080")
    }

    mod parsing {
        use super::*;

        #[test]
        fn bare_name() {
            assert_eq!(parse_expression("${port}").unwrap(), ("port", None));
        }

        #[test]
        fn name_with_default() {
            assert_eq!(
                parse_expression("${host:localhost}").unwrap(),
                ("host", Some("localhost"))
            );
        }

        #[test]
        fn empty_default_is_allowed() {
            assert_eq!(parse_expression("${host:}").unwrap(), ("host", Some("")));
        }

        #[test]
        fn malformed_forms_rejected() {
            assert!(parse_expression("port").is_err());
            assert!(parse_expression("${}").is_err());
            assert!(parse_expression("${:default}").is_err());
            assert!(parse_expression("${port").is_err());
        }
    }

    mod resolution {
        use super::*;

        #[test]
        fn resolves_known_property() {
            let v = resolver()
                .resolve(&Value::Expression("${port}".into()))
                .unwrap();
            assert_eq!(v, Value::String("8080".into()));
        }

        #[test]
        fn falls_back_to_default() {
            let v = resolver()
                .resolve(&Value::Expression("${host:localhost}".into()))
                .unwrap();
            assert_eq!(v, Value::String("localhost".into()));
        }

        #[test]
        fn property_wins_over_default() {
            let v = resolver()
                .resolve(&Value::Expression("${port:9090}".into()))
                .unwrap();
            assert_eq!(v, Value::String("8080".into()));
        }

        #[test]
        fn unknown_property_without_default_fails() {
            let err = resolver()
                .resolve(&Value::Expression("${missing}".into()))
                .unwrap_err();
            assert_eq!(err, ResolveError::Unresolvable("${missing}".into()));
        }

        #[test]
        fn recurses_through_structures() {
            let v = Value::object([
                ("port", Value::Expression("${port}".into())),
                (
                    "hosts",
                    Value::List(vec![Value::Expression("${host:a}".into())]),
                ),
                ("plain", Value::Boolean(true)),
            ]);
            let resolved = resolver().resolve(&v).unwrap();
            assert_eq!(
                resolved.get("port"),
                Some(&Value::String("8080".into()))
            );
            assert_eq!(
                resolved.get("hosts").and_then(Value::as_list),
                Some(&[Value::String("a".into())][..])
            );
            assert_eq!(resolved.get("plain"), Some(&Value::Boolean(true)));
        }

        #[test]
        fn failure_deep_in_structure_propagates() {
            let v = Value::List(vec![Value::Expression("${missing}".into())]);
            assert!(resolver().resolve(&v).is_err());
        }

        #[test]
        fn non_expression_values_pass_through() {
            let v = Value::Number(1.5);
            assert_eq!(resolver().resolve(&v).unwrap(), v);
        }
    }
}
