//! Per-invocation key/value bag
//!
//! Lets middleware and the command hand values to each other without a
//! shared type. Each invocation gets its own bag; it is dropped with the
//! execution context.

use crate::error::CommandError;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;

/// Heterogeneous string-keyed storage scoped to one invocation
#[derive(Default)]
pub struct SharedDataBag {
    entries: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl SharedDataBag {
    /// Create empty bag
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `key`, replacing any previous value
    pub fn set<V: Any + Send + Sync>(&mut self, key: impl Into<String>, value: V) {
        self.entries.insert(key.into(), Box::new(value));
    }

    /// Read the value stored under `key`
    ///
    /// # Errors
    /// - `CommandError::NotFound` if the key is absent
    /// - `CommandError::TypeMismatch` if the value is not a `V`
    pub fn get<V: Any + Send + Sync>(&self, key: &str) -> Result<&V, CommandError> {
        let entry = self.entries.get(key).ok_or_else(|| CommandError::NotFound {
            key: key.to_owned(),
        })?;
        entry
            .downcast_ref::<V>()
            .ok_or_else(|| CommandError::TypeMismatch {
                key: key.to_owned(),
                expected: std::any::type_name::<V>(),
            })
    }

    /// Read the value stored under `key`, if it exists and is a `V`
    #[inline]
    #[must_use]
    pub fn try_get<V: Any + Send + Sync>(&self, key: &str) -> Option<&V> {
        self.entries.get(key).and_then(|v| v.downcast_ref::<V>())
    }

    /// Read a copy of the value under `key`, or `V::default()` when it is
    /// absent or of another type
    #[must_use]
    pub fn get_or_default<V: Any + Send + Sync + Clone + Default>(&self, key: &str) -> V {
        self.try_get::<V>(key).cloned().unwrap_or_default()
    }

    /// Mutable access to the value under `key`
    ///
    /// # Errors
    /// Same as [`get`](Self::get).
    pub fn get_mut<V: Any + Send + Sync>(&mut self, key: &str) -> Result<&mut V, CommandError> {
        let entry = self
            .entries
            .get_mut(key)
            .ok_or_else(|| CommandError::NotFound {
                key: key.to_owned(),
            })?;
        entry
            .downcast_mut::<V>()
            .ok_or_else(|| CommandError::TypeMismatch {
                key: key.to_owned(),
                expected: std::any::type_name::<V>(),
            })
    }

    /// Remove and return the value under `key`
    ///
    /// A value of another type is left in place.
    pub fn remove<V: Any + Send + Sync>(&mut self, key: &str) -> Option<V> {
        if !self.entries.get(key)?.is::<V>() {
            return None;
        }
        self.entries
            .remove(key)
            .and_then(|boxed| boxed.downcast::<V>().ok())
            .map(|boxed| *boxed)
    }

    /// Check if `key` holds any value
    #[inline]
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of stored entries
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the bag is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stored keys, in no particular order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl fmt::Debug for SharedDataBag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.keys().collect();
        keys.sort_unstable();
        f.debug_struct("SharedDataBag").field("keys", &keys).finish()
    }
}
