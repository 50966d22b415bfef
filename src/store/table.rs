//! Store implementation
//!
//! HashMap-based store with RwLock for concurrency.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::error::{KvError, Result};
use crate::wal::{Event, EventType};

/// In-memory key-value map
#[derive(Default)]
pub struct Store {
    data: RwLock<HashMap<String, String>>,
}

impl Store {
    /// Create a new empty Store
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a value by key (read lock)
    pub fn get(&self, key: &str) -> Result<String> {
        self.data
            .read()
            .get(key)
            .cloned()
            .ok_or(KvError::KeyNotFound)
    }

    /// Put a key-value pair (write lock)
    pub fn put(&self, key: impl Into<String>, value: impl Into<String>) {
        self.data.write().insert(key.into(), value.into());
    }

    /// Delete a key. Deleting an absent key is not an error.
    pub fn delete(&self, key: &str) {
        self.data.write().remove(key);
    }

    /// Apply a replayed log event
    pub fn apply(&self, event: &Event) {
        match event.event_type {
            EventType::Put => self.put(event.key.as_str(), event.value.as_str()),
            EventType::Delete => self.delete(&event.key),
        }
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Copy of the current contents
    pub fn snapshot(&self) -> HashMap<String, String> {
        self.data.read().clone()
    }
}
