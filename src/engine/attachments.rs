//! engine::attachments
//!
//! Typed, keyed scratch space scoped to one operation.
//!
//! # Architecture
//!
//! Steps frequently need to hand data to later steps of the same
//! operation: a `Model` step computes something a `Runtime` step consumes,
//! a `Runtime` step stashes what its rollback handler needs. Attachments
//! are that channel. The store lives exactly as long as the operation and
//! is owned by it alone; it is never shared between operations.
//!
//! # Type Safety
//!
//! An [`AttachmentKey<T>`] carries its value type, so retrieval needs no
//! downcasting at call sites. Each key is a distinct identity: two keys
//! created for the same `T` address different slots.
//!
//! # Example
//!
//! ```
//! use stagecraft::engine::attachments::{AttachmentKey, Attachments};
//!
//! let key: AttachmentKey<Vec<String>> = AttachmentKey::new();
//! let mut attachments = Attachments::new();
//!
//! attachments.attach(key, vec!["orders".to_string()]);
//! assert_eq!(attachments.get(key).map(Vec::len), Some(1));
//!
//! let detached = attachments.detach(key);
//! assert!(detached.is_some());
//! assert!(attachments.get(key).is_none());
//! ```

use std::any::Any;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_KEY_ID: AtomicU64 = AtomicU64::new(1);

/// A typed key identifying one attachment slot.
///
/// Keys are cheap to copy and are usually created once and shared between
/// the steps that cooperate through the slot.
#[derive(Debug)]
pub struct AttachmentKey<T> {
    id: u64,
    _marker: PhantomData<fn() -> T>,
}

// Manual impls: the key is Copy regardless of whether T is.
impl<T> Clone for AttachmentKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for AttachmentKey<T> {}

impl<T> AttachmentKey<T> {
    /// Create a fresh key with a unique identity.
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            id: NEXT_KEY_ID.fetch_add(1, Ordering::Relaxed),
            _marker: PhantomData,
        }
    }
}

/// The per-operation attachment store.
#[derive(Debug, Default)]
pub struct Attachments {
    slots: HashMap<u64, Box<dyn Any + Send>>,
}

impl Attachments {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value, returning the previous value for the key, if any.
    pub fn attach<T: Send + 'static>(&mut self, key: AttachmentKey<T>, value: T) -> Option<T> {
        self.slots
            .insert(key.id, Box::new(value))
            .and_then(|old| old.downcast::<T>().ok())
            .map(|boxed| *boxed)
    }

    /// Store a value only if the slot is empty; returns the slot contents
    /// either way.
    pub fn attach_if_absent<T: Send + 'static>(
        &mut self,
        key: AttachmentKey<T>,
        value: T,
    ) -> &mut T {
        self.slots
            .entry(key.id)
            .or_insert_with(|| Box::new(value))
            .downcast_mut::<T>()
            .expect("attachment slot holds the key's value type")
    }

    /// Read a stored value.
    pub fn get<T: Send + 'static>(&self, key: AttachmentKey<T>) -> Option<&T> {
        self.slots.get(&key.id).and_then(|v| v.downcast_ref::<T>())
    }

    /// Read a stored value mutably.
    pub fn get_mut<T: Send + 'static>(&mut self, key: AttachmentKey<T>) -> Option<&mut T> {
        self.slots
            .get_mut(&key.id)
            .and_then(|v| v.downcast_mut::<T>())
    }

    /// Remove and return a stored value.
    pub fn detach<T: Send + 'static>(&mut self, key: AttachmentKey<T>) -> Option<T> {
        self.slots
            .remove(&key.id)
            .and_then(|old| old.downcast::<T>().ok())
            .map(|boxed| *boxed)
    }
}
