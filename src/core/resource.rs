//! core::resource
//!
//! The hierarchical, copy-on-write resource tree.
//!
//! # Architecture
//!
//! A [`Resource`] is one node of the configuration/runtime model: a map of
//! attribute names to [`Value`]s plus an ordered list of named children.
//! Children are held behind `Arc`, which is what makes the tree cheap to
//! snapshot and cheap to edit:
//!
//! - A reader clones the root `Arc` and owns an immutable snapshot.
//! - A writer descends from its own root with [`Resource::navigate_mut`],
//!   which calls `Arc::make_mut` at each hop. Nodes still shared with an
//!   older snapshot are cloned at that moment; nodes already exclusive to
//!   the writer are mutated in place.
//!
//! The copy is therefore lazy and limited to the path actually written,
//! never the whole tree.
//!
//! # Invariants
//!
//! - A child's `key=value` element is unique among its siblings
//! - Shared nodes are never mutated in place; every mutation goes through
//!   `Arc::make_mut` on the writer's own root chain
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use stagecraft::core::resource::Resource;
//! use stagecraft::core::address::{PathAddress, PathElement};
//! use stagecraft::core::value::Value;
//!
//! let mut root = Arc::new(Resource::new());
//! let snapshot = Arc::clone(&root);
//!
//! let addr = PathAddress::root().append(PathElement::new("queue", "orders").unwrap());
//! let node = Resource::create(&mut root, &addr).unwrap();
//! node.set_attribute("enabled", Value::Boolean(true));
//!
//! // The earlier snapshot is unaffected.
//! assert!(snapshot.navigate(&addr).is_none());
//! assert!(root.navigate(&addr).is_some());
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;

use super::address::{PathAddress, PathElement};
use super::value::Value;

/// Errors from resource tree operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResourceError {
    /// A resource already exists at the target address.
    #[error("duplicate resource at {0}")]
    Duplicate(PathAddress),

    /// No resource exists at the target address.
    #[error("no resource at {0}")]
    NotFound(PathAddress),
}

/// A node in the resource tree.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Resource {
    attributes: BTreeMap<String, Value>,
    children: Vec<(PathElement, Arc<Resource>)>,
}

impl Resource {
    /// Create an empty resource.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a resource with the given attributes.
    pub fn with_attributes<K, I>(attributes: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Self {
            attributes: attributes
                .into_iter()
                .map(|(k, v)| (k.into(), v))
                .collect(),
            children: Vec::new(),
        }
    }

    /// Read an attribute. Missing attributes read as [`Value::Undefined`].
    pub fn attribute(&self, name: &str) -> &Value {
        static UNDEFINED: Value = Value::Undefined;
        self.attributes.get(name).unwrap_or(&UNDEFINED)
    }

    /// All attributes, ordered by name.
    pub fn attributes(&self) -> &BTreeMap<String, Value> {
        &self.attributes
    }

    /// Write an attribute, returning the previous value if one was set.
    pub fn set_attribute(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.attributes.insert(name.into(), value)
    }

    /// Remove an attribute.
    pub fn remove_attribute(&mut self, name: &str) -> Option<Value> {
        self.attributes.remove(name)
    }

    /// The ordered children of this node.
    pub fn children(&self) -> impl Iterator<Item = (&PathElement, &Arc<Resource>)> {
        self.children.iter().map(|(e, r)| (e, r))
    }

    /// Whether this node has a child with the given element.
    pub fn has_child(&self, element: &PathElement) -> bool {
        self.children.iter().any(|(e, _)| e == element)
    }

    /// Look up a direct child.
    pub fn child(&self, element: &PathElement) -> Option<&Arc<Resource>> {
        self.children
            .iter()
            .find(|(e, _)| e == element)
            .map(|(_, r)| r)
    }

    /// Walk an address from this node, read-only.
    pub fn navigate(&self, address: &PathAddress) -> Option<&Resource> {
        let mut current = self;
        for element in address.iter() {
            current = current.child(element)?;
        }
        Some(current)
    }

    /// Produce a read-only copy of this node.
    ///
    /// With `recursive` the whole subtree is returned (cheap: children are
    /// shared `Arc`s). Without it, the child list is preserved by name but
    /// each child is an empty placeholder, which keeps large-tree reads
    /// from dragging in content the caller does not want.
    pub fn read(&self, recursive: bool) -> Resource {
        if recursive {
            self.clone()
        } else {
            Resource {
                attributes: self.attributes.clone(),
                children: self
                    .children
                    .iter()
                    .map(|(e, _)| (e.clone(), Arc::new(Resource::new())))
                    .collect(),
            }
        }
    }

    /// Descend from `root` to the addressed node for mutation, cloning
    /// shared nodes along the path (and only along the path).
    pub fn navigate_mut<'a>(
        root: &'a mut Arc<Resource>,
        address: &PathAddress,
    ) -> Result<&'a mut Resource, ResourceError> {
        let mut current: &mut Resource = Arc::make_mut(root);
        let mut walked = PathAddress::root();
        for element in address.iter() {
            walked = walked.append(element.clone());
            let child = current
                .children
                .iter_mut()
                .find(|(e, _)| e == element)
                .map(|(_, r)| r)
                .ok_or_else(|| ResourceError::NotFound(walked.clone()))?;
            current = Arc::make_mut(child);
        }
        Ok(current)
    }

    /// Create an empty resource at `address`, relative to `root`.
    ///
    /// # Errors
    ///
    /// - [`ResourceError::Duplicate`] if a resource already exists there
    /// - [`ResourceError::NotFound`] if the parent does not exist
    pub fn create<'a>(
        root: &'a mut Arc<Resource>,
        address: &PathAddress,
    ) -> Result<&'a mut Resource, ResourceError> {
        Self::add(root, address, Resource::new())?;
        Self::navigate_mut(root, address)
    }

    /// Add an existing resource at `address`, relative to `root`.
    pub fn add(
        root: &mut Arc<Resource>,
        address: &PathAddress,
        resource: Resource,
    ) -> Result<(), ResourceError> {
        let element = address
            .last()
            .ok_or_else(|| ResourceError::Duplicate(PathAddress::root()))?
            .clone();
        let parent_addr = address.parent().unwrap_or_else(PathAddress::root);
        let parent = Self::navigate_mut(root, &parent_addr)?;
        if parent.has_child(&element) {
            return Err(ResourceError::Duplicate(address.clone()));
        }
        parent.children.push((element, Arc::new(resource)));
        Ok(())
    }

    /// Remove the resource at `address`, returning the removed subtree.
    pub fn remove(
        root: &mut Arc<Resource>,
        address: &PathAddress,
    ) -> Result<Arc<Resource>, ResourceError> {
        let element = address
            .last()
            .ok_or_else(|| ResourceError::NotFound(PathAddress::root()))?
            .clone();
        let parent_addr = address.parent().unwrap_or_else(PathAddress::root);
        let parent = Self::navigate_mut(root, &parent_addr)?;
        let index = parent
            .children
            .iter()
            .position(|(e, _)| *e == element)
            .ok_or_else(|| ResourceError::NotFound(address.clone()))?;
        Ok(parent.children.remove(index).1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn elem(key: &str, value: &str) -> PathElement {
        PathElement::new(key, value).expect("valid element")
    }

    fn addr(parts: &[(&str, &str)]) -> PathAddress {
        PathAddress::new(parts.iter().map(|(k, v)| elem(k, v)).collect())
    }

    mod attributes {
        use super::*;

        #[test]
        fn missing_attribute_reads_undefined() {
            let r = Resource::new();
            assert_eq!(*r.attribute("missing"), Value::Undefined);
        }

        #[test]
        fn set_and_read_attribute() {
            let mut r = Resource::new();
            assert!(r.set_attribute("enabled", Value::Boolean(true)).is_none());
            assert_eq!(r.attribute("enabled").as_bool(), Some(true));

            let old = r.set_attribute("enabled", Value::Boolean(false));
            assert_eq!(old, Some(Value::Boolean(true)));
        }

        #[test]
        fn remove_attribute() {
            let mut r = Resource::with_attributes([("n", Value::from(1i64))]);
            assert_eq!(r.remove_attribute("n"), Some(Value::Number(1.0)));
            assert_eq!(*r.attribute("n"), Value::Undefined);
        }
    }

    mod tree_shape {
        use super::*;

        #[test]
        fn create_and_navigate() {
            let mut root = Arc::new(Resource::new());
            let a = addr(&[("subsystem", "messaging")]);
            Resource::create(&mut root, &a).unwrap();

            assert!(root.navigate(&a).is_some());
            assert!(root.navigate(&PathAddress::root()).is_some());
            assert!(root
                .navigate(&addr(&[("subsystem", "web")]))
                .is_none());
        }

        #[test]
        fn create_nested() {
            let mut root = Arc::new(Resource::new());
            Resource::create(&mut root, &addr(&[("subsystem", "messaging")])).unwrap();
            let deep = addr(&[("subsystem", "messaging"), ("queue", "orders")]);
            Resource::create(&mut root, &deep).unwrap();
            assert!(root.navigate(&deep).is_some());
        }

        #[test]
        fn duplicate_create_fails() {
            let mut root = Arc::new(Resource::new());
            let a = addr(&[("queue", "orders")]);
            Resource::create(&mut root, &a).unwrap();
            let err = Resource::create(&mut root, &a).unwrap_err();
            assert_eq!(err, ResourceError::Duplicate(a));
        }

        #[test]
        fn create_under_missing_parent_fails() {
            let mut root = Arc::new(Resource::new());
            let deep = addr(&[("subsystem", "messaging"), ("queue", "orders")]);
            assert!(matches!(
                Resource::create(&mut root, &deep),
                Err(ResourceError::NotFound(_))
            ));
        }

        #[test]
        fn remove_returns_subtree() {
            let mut root = Arc::new(Resource::new());
            let a = addr(&[("queue", "orders")]);
            Resource::create(&mut root, &a)
                .unwrap()
                .set_attribute("enabled", Value::Boolean(true));

            let removed = Resource::remove(&mut root, &a).unwrap();
            assert_eq!(removed.attribute("enabled").as_bool(), Some(true));
            assert!(root.navigate(&a).is_none());
        }

        #[test]
        fn remove_missing_fails() {
            let mut root = Arc::new(Resource::new());
            assert!(matches!(
                Resource::remove(&mut root, &addr(&[("queue", "orders")])),
                Err(ResourceError::NotFound(_))
            ));
        }

        #[test]
        fn remove_root_fails() {
            let mut root = Arc::new(Resource::new());
            assert!(Resource::remove(&mut root, &PathAddress::root()).is_err());
        }

        #[test]
        fn children_preserve_insertion_order() {
            let mut root = Arc::new(Resource::new());
            Resource::create(&mut root, &addr(&[("queue", "b")])).unwrap();
            Resource::create(&mut root, &addr(&[("queue", "a")])).unwrap();
            let names: Vec<&str> = root.children().map(|(e, _)| e.value()).collect();
            assert_eq!(names, vec!["b", "a"]);
        }
    }

    mod copy_on_write {
        use super::*;

        #[test]
        fn snapshot_unaffected_by_later_writes() {
            let mut root = Arc::new(Resource::new());
            let a = addr(&[("queue", "orders")]);
            Resource::create(&mut root, &a).unwrap();

            let snapshot = Arc::clone(&root);

            Resource::navigate_mut(&mut root, &a)
                .unwrap()
                .set_attribute("enabled", Value::Boolean(true));

            assert_eq!(
                *snapshot.navigate(&a).unwrap().attribute("enabled"),
                Value::Undefined
            );
            assert_eq!(
                root.navigate(&a).unwrap().attribute("enabled").as_bool(),
                Some(true)
            );
        }

        #[test]
        fn untouched_siblings_stay_shared() {
            let mut root = Arc::new(Resource::new());
            let touched = addr(&[("queue", "orders")]);
            let untouched = addr(&[("queue", "invoices")]);
            Resource::create(&mut root, &touched).unwrap();
            Resource::create(&mut root, &untouched).unwrap();

            let snapshot = Arc::clone(&root);
            Resource::navigate_mut(&mut root, &touched)
                .unwrap()
                .set_attribute("enabled", Value::Boolean(true));

            // The write copied the path to `touched`; the sibling subtree is
            // still the same allocation in both trees.
            let in_old = snapshot.child(untouched.last().unwrap()).unwrap();
            let in_new = root.child(untouched.last().unwrap()).unwrap();
            assert!(Arc::ptr_eq(in_old, in_new));

            let old_touched = snapshot.child(touched.last().unwrap()).unwrap();
            let new_touched = root.child(touched.last().unwrap()).unwrap();
            assert!(!Arc::ptr_eq(old_touched, new_touched));
        }

        #[test]
        fn read_non_recursive_elides_child_content() {
            let mut root = Arc::new(Resource::new());
            let a = addr(&[("queue", "orders")]);
            Resource::create(&mut root, &a)
                .unwrap()
                .set_attribute("enabled", Value::Boolean(true));

            let shallow = root.read(false);
            assert!(shallow.has_child(a.last().unwrap()));
            let placeholder = shallow.child(a.last().unwrap()).unwrap();
            assert_eq!(*placeholder.attribute("enabled"), Value::Undefined);

            let deep = root.read(true);
            assert_eq!(
                deep.navigate(&a).unwrap().attribute("enabled").as_bool(),
                Some(true)
            );
        }
    }
}
