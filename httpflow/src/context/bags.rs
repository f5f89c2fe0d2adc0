//! Per-call key/value data bag.

use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;

/// Sidecar data shared by every policy and the transport of one call.
///
/// Keys are caller-defined. Writes are last-write-wins; the bag never
/// rejects a key. Interior mutability lets code holding only a shared
/// reference to the context record into it.
#[derive(Debug, Default)]
pub struct ContextBag {
    data: RwLock<HashMap<String, Value>>,
}

impl ContextBag {
    /// Creates an empty bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a bag from existing data.
    #[must_use]
    pub fn from_data(data: HashMap<String, Value>) -> Self {
        Self {
            data: RwLock::new(data),
        }
    }

    /// Gets a copy of a value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.data.read().get(key).cloned()
    }

    /// Checks if a key exists.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.data.read().contains_key(key)
    }

    /// Sets a value and returns the one it replaced.
    pub fn set(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.data.write().insert(key.into(), value)
    }

    /// Removes a value.
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.data.write().remove(key)
    }

    /// Edits a value in place under one write lock. A missing key starts as
    /// `Value::Null`.
    pub fn update<F>(&self, key: impl Into<String>, f: F)
    where
        F: FnOnce(&mut Value),
    {
        let mut data = self.data.write();
        f(data.entry(key.into()).or_insert(Value::Null));
    }

    /// Pushes onto an array value, creating it if absent.
    ///
    /// A non-array value is wrapped into an array first.
    pub fn append(&self, key: impl Into<String>, value: Value) {
        self.update(key, |slot| match slot {
            Value::Array(items) => items.push(value),
            Value::Null => *slot = Value::Array(vec![value]),
            other => {
                let previous = other.take();
                *other = Value::Array(vec![previous, value]);
            }
        });
    }

    /// Returns a copy of all data.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, Value> {
        self.data.read().clone()
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Returns true if the bag is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Returns all keys.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.data.read().keys().cloned().collect()
    }
}

impl Clone for ContextBag {
    fn clone(&self) -> Self {
        Self::from_data(self.to_dict())
    }
}
