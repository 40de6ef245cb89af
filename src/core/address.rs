//! core::address
//!
//! Strong types for addressing nodes in the resource tree.
//!
//! # Types
//!
//! - [`PathElement`] - One `key=value` segment of an address
//! - [`PathAddress`] - An ordered sequence of segments; the empty sequence
//!   addresses the base node itself
//!
//! # Validation
//!
//! Segments are validated at construction time. Keys and values cannot be
//! empty, cannot contain the `/` or `=` separators, and `*` is reserved
//! for wildcard use by query layers outside this crate.
//!
//! # Resolution
//!
//! Addresses handed to engine APIs are resolved relative to the address of
//! the step that is currently executing. The `*_from_root` context APIs
//! take addresses relative to the global root instead.
//!
//! # Examples
//!
//! ```
//! use stagecraft::core::address::{PathAddress, PathElement};
//!
//! let addr = PathAddress::root()
//!     .append(PathElement::new("subsystem", "messaging").unwrap())
//!     .append(PathElement::new("queue", "orders").unwrap());
//! assert_eq!(addr.to_string(), "/subsystem=messaging/queue=orders");
//! assert_eq!(addr.len(), 2);
//!
//! let parsed: PathAddress = "/subsystem=messaging/queue=orders".parse().unwrap();
//! assert_eq!(parsed, addr);
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from address validation and parsing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    /// A segment key failed validation.
    #[error("invalid address key: {0}")]
    InvalidKey(String),

    /// A segment value failed validation.
    #[error("invalid address value: {0}")]
    InvalidValue(String),

    /// A textual address could not be parsed.
    #[error("malformed address '{0}': expected /key=value/key=value")]
    Malformed(String),
}

/// One `key=value` segment of a path address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PathElement {
    key: String,
    value: String,
}

impl PathElement {
    /// Create a validated segment.
    ///
    /// # Errors
    ///
    /// Returns `AddressError` if the key or value is empty, contains a
    /// separator character, or is the reserved `*` wildcard.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Result<Self, AddressError> {
        let key = key.into();
        let value = value.into();
        Self::validate_part(&key).map_err(AddressError::InvalidKey)?;
        Self::validate_part(&value).map_err(AddressError::InvalidValue)?;
        Ok(Self { key, value })
    }

    fn validate_part(part: &str) -> Result<(), String> {
        if part.is_empty() {
            return Err("cannot be empty".to_string());
        }
        if part == "*" {
            return Err("'*' is reserved".to_string());
        }
        if part.contains('/') || part.contains('=') {
            return Err(format!("'{}' contains a separator character", part));
        }
        Ok(())
    }

    /// The segment key (the child type).
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The segment value (the child name).
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for PathElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

/// An ordered sequence of [`PathElement`] segments locating a resource.
///
/// The empty address denotes the base the address is resolved against
/// (the step's own resource, or the model root for `*_from_root` APIs).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PathAddress(Vec<PathElement>);

impl PathAddress {
    /// The empty address.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Build an address from segments.
    pub fn new(elements: Vec<PathElement>) -> Self {
        Self(elements)
    }

    /// Whether this is the empty address.
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of segments.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the address has no segments.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Append a segment, returning the extended address.
    pub fn append(&self, element: PathElement) -> Self {
        let mut elements = self.0.clone();
        elements.push(element);
        Self(elements)
    }

    /// Concatenate another address onto this one.
    pub fn join(&self, relative: &PathAddress) -> Self {
        let mut elements = self.0.clone();
        elements.extend(relative.0.iter().cloned());
        Self(elements)
    }

    /// The address of the parent, or `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        if self.0.is_empty() {
            None
        } else {
            Some(Self(self.0[..self.0.len() - 1].to_vec()))
        }
    }

    /// The final segment, or `None` for the root.
    pub fn last(&self) -> Option<&PathElement> {
        self.0.last()
    }

    /// Iterate the segments in order.
    pub fn iter(&self) -> impl Iterator<Item = &PathElement> {
        self.0.iter()
    }
}

impl fmt::Display for PathAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "/");
        }
        for element in &self.0 {
            write!(f, "/{}", element)?;
        }
        Ok(())
    }
}

impl FromStr for PathAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed == "/" {
            return Ok(Self::root());
        }
        let body = trimmed
            .strip_prefix('/')
            .ok_or_else(|| AddressError::Malformed(s.to_string()))?;
        let mut elements = Vec::new();
        for segment in body.split('/') {
            let (key, value) = segment
                .split_once('=')
                .ok_or_else(|| AddressError::Malformed(s.to_string()))?;
            elements.push(PathElement::new(key, value)?);
        }
        Ok(Self(elements))
    }
}

impl TryFrom<String> for PathAddress {
    type Error = AddressError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<PathAddress> for String {
    fn from(addr: PathAddress) -> String {
        addr.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn elem(key: &str, value: &str) -> PathElement {
        PathElement::new(key, value).expect("valid element")
    }

    mod path_element {
        use super::*;

        #[test]
        fn valid_element() {
            let e = elem("subsystem", "messaging");
            assert_eq!(e.key(), "subsystem");
            assert_eq!(e.value(), "messaging");
            assert_eq!(e.to_string(), "subsystem=messaging");
        }

        #[test]
        fn empty_key_rejected() {
            assert!(matches!(
                PathElement::new("", "x"),
                Err(AddressError::InvalidKey(_))
            ));
        }

        #[test]
        fn empty_value_rejected() {
            assert!(matches!(
                PathElement::new("x", ""),
                Err(AddressError::InvalidValue(_))
            ));
        }

        #[test]
        fn wildcard_rejected() {
            assert!(PathElement::new("*", "x").is_err());
            assert!(PathElement::new("x", "*").is_err());
        }

        #[test]
        fn separators_rejected() {
            assert!(PathElement::new("a/b", "x").is_err());
            assert!(PathElement::new("a", "x=y").is_err());
        }
    }

    mod path_address {
        use super::*;

        #[test]
        fn root_is_empty() {
            let root = PathAddress::root();
            assert!(root.is_root());
            assert_eq!(root.len(), 0);
            assert_eq!(root.to_string(), "/");
            assert!(root.parent().is_none());
            assert!(root.last().is_none());
        }

        #[test]
        fn append_and_parent() {
            let addr = PathAddress::root()
                .append(elem("subsystem", "messaging"))
                .append(elem("queue", "orders"));
            assert_eq!(addr.len(), 2);
            assert_eq!(addr.last().unwrap().value(), "orders");

            let parent = addr.parent().unwrap();
            assert_eq!(parent.to_string(), "/subsystem=messaging");
        }

        #[test]
        fn join_concatenates() {
            let base = PathAddress::root().append(elem("subsystem", "messaging"));
            let rel = PathAddress::root().append(elem("queue", "orders"));
            let joined = base.join(&rel);
            assert_eq!(joined.to_string(), "/subsystem=messaging/queue=orders");
        }

        #[test]
        fn join_with_root_is_identity() {
            let base = PathAddress::root().append(elem("a", "b"));
            assert_eq!(base.join(&PathAddress::root()), base);
        }
    }

    mod parsing {
        use super::*;

        #[test]
        fn parse_root_forms() {
            assert_eq!("/".parse::<PathAddress>().unwrap(), PathAddress::root());
            assert_eq!("".parse::<PathAddress>().unwrap(), PathAddress::root());
        }

        #[test]
        fn parse_round_trip() {
            let addr: PathAddress = "/subsystem=messaging/queue=orders".parse().unwrap();
            assert_eq!(addr.len(), 2);
            assert_eq!(addr.to_string(), "/subsystem=messaging/queue=orders");
        }

        #[test]
        fn parse_missing_leading_slash_fails() {
            assert!(matches!(
                "subsystem=messaging".parse::<PathAddress>(),
                Err(AddressError::Malformed(_))
            ));
        }

        #[test]
        fn parse_missing_equals_fails() {
            assert!("/subsystem".parse::<PathAddress>().is_err());
        }

        #[test]
        fn serde_as_string() {
            let addr: PathAddress = "/a=b".parse().unwrap();
            let json = serde_json::to_string(&addr).unwrap();
            assert_eq!(json, "\"/a=b\"");
            let back: PathAddress = serde_json::from_str(&json).unwrap();
            assert_eq!(back, addr);
        }
    }
}
