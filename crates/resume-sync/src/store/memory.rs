use super::{KeyValueStore, StoreError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// In-memory key-value store. Counts writes per key so tests can assert how many
/// persisted writes an operation caused.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    values: HashMap<String, String>,
    writes: HashMap<String, usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of `set` calls for `key` so far.
    pub fn write_count(&self, key: &str) -> usize {
        self.inner().writes.get(key).copied().unwrap_or(0)
    }

    /// Raw value under `key`, bypassing the async interface.
    pub fn raw(&self, key: &str) -> Option<String> {
        self.inner().values.get(key).cloned()
    }

    /// Writes without counting, for arranging test fixtures.
    pub fn put_raw(&self, key: &str, value: impl Into<String>) {
        self.inner().values.insert(key.to_string(), value.into());
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.inner().values.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        let mut inner = self.inner();
        inner.values.insert(key.to_string(), value);
        *inner.writes.entry(key.to_string()).or_insert(0) += 1;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.inner().values.remove(key);
        Ok(())
    }
}
