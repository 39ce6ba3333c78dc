//! Key-value storage seam
//!
//! The host wraps its storage area (sync storage in the extension) behind
//! [`KeyValueStore`]. [`MemoryStore`] is the in-process implementation used
//! by the CLI and tests; it can enforce a per-item quota, inject failures
//! and yield between operations to surface interleavings.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::error::StorageError;

/// Asynchronous key-value storage holding JSON values.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Fetch the keys that exist. Missing keys are absent from the result.
    async fn get(&self, keys: &[String]) -> Result<HashMap<String, Value>, StorageError>;

    /// Write every item in one call.
    async fn set(&self, items: HashMap<String, Value>) -> Result<(), StorageError>;

    /// Delete keys. Missing keys are ignored.
    async fn remove(&self, keys: &[String]) -> Result<(), StorageError>;
}

/// Stored size of one item: key plus serialized value.
pub fn item_bytes(key: &str, value: &Value) -> usize {
    key.len() + value.to_string().len()
}

// =============================================================================
// MemoryStore
// =============================================================================

#[derive(Debug, Default)]
pub struct MemoryStore {
    items: Mutex<HashMap<String, Value>>,
    item_limit: Option<usize>,
    yield_between: bool,
    failing_writes: AtomicUsize,
    failing_removes: AtomicUsize,
    failing_reads: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject any item whose stored size exceeds `bytes`.
    pub fn with_item_limit(mut self, bytes: usize) -> Self {
        self.item_limit = Some(bytes);
        self
    }

    /// Yield to the scheduler before every operation completes.
    pub fn yielding(mut self) -> Self {
        self.yield_between = true;
        self
    }

    /// Make the next `n` `set` calls fail.
    pub fn fail_next_writes(&self, n: usize) {
        self.failing_writes.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` `remove` calls fail.
    pub fn fail_next_removes(&self, n: usize) {
        self.failing_removes.store(n, Ordering::SeqCst);
    }

    /// Make every `get` fail until switched off.
    pub fn fail_reads(&self, failing: bool) {
        self.failing_reads.store(failing, Ordering::SeqCst);
    }

    /// Number of successful `set` calls so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Copy of everything stored.
    pub fn snapshot(&self) -> HashMap<String, Value> {
        self.items.lock().clone()
    }

    /// Store a value directly, bypassing quota and failure injection.
    pub fn insert(&self, key: impl Into<String>, value: Value) {
        self.items.lock().insert(key.into(), value);
    }

    async fn pause(&self) {
        if self.yield_between {
            tokio::task::yield_now().await;
        }
    }

    fn take_write_failure(&self) -> bool {
        take_one(&self.failing_writes)
    }

    fn take_remove_failure(&self) -> bool {
        take_one(&self.failing_removes)
    }
}

fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, keys: &[String]) -> Result<HashMap<String, Value>, StorageError> {
        self.pause().await;
        if self.failing_reads.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("read failed".to_string()));
        }

        let items = self.items.lock();
        Ok(keys
            .iter()
            .filter_map(|key| items.get(key).map(|value| (key.clone(), value.clone())))
            .collect())
    }

    async fn set(&self, items: HashMap<String, Value>) -> Result<(), StorageError> {
        self.pause().await;
        if self.take_write_failure() {
            return Err(StorageError::Backend("write failed".to_string()));
        }

        if let Some(limit) = self.item_limit {
            for (key, value) in &items {
                let bytes = item_bytes(key, value);
                if bytes > limit {
                    return Err(StorageError::QuotaExceeded {
                        key: key.clone(),
                        bytes,
                        limit,
                    });
                }
            }
        }

        self.items.lock().extend(items);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn remove(&self, keys: &[String]) -> Result<(), StorageError> {
        self.pause().await;
        if self.take_remove_failure() {
            return Err(StorageError::Backend("remove failed".to_string()));
        }

        let mut items = self.items.lock();
        for key in keys {
            items.remove(key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn keys(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[tokio::test]
    async fn test_get_set_remove() {
        let store = MemoryStore::new();
        store
            .set(HashMap::from([("a".to_string(), json!(1)), ("b".to_string(), json!("x"))]))
            .await
            .expect("set");

        let got = store.get(&keys(&["a", "b", "c"])).await.expect("get");
        assert_eq!(got.len(), 2);
        assert_eq!(got["a"], json!(1));

        store.remove(&keys(&["a", "missing"])).await.expect("remove");
        assert!(store.get(&keys(&["a"])).await.expect("get").is_empty());
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_item_limit() {
        let store = MemoryStore::new().with_item_limit(10);
        let err = store
            .set(HashMap::from([("key".to_string(), json!("a long value"))]))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::QuotaExceeded { limit: 10, .. }));
        assert!(store.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let store = MemoryStore::new().yielding();
        store.fail_next_writes(1);
        assert!(store.set(HashMap::from([("a".to_string(), json!(1))])).await.is_err());
        assert!(store.set(HashMap::from([("a".to_string(), json!(1))])).await.is_ok());

        store.fail_next_removes(1);
        assert!(store.remove(&keys(&["a"])).await.is_err());
        assert_eq!(store.get(&keys(&["a"])).await.expect("get").len(), 1);

        store.fail_reads(true);
        assert!(store.get(&keys(&["a"])).await.is_err());
        store.fail_reads(false);
        assert_eq!(store.get(&keys(&["a"])).await.expect("get").len(), 1);
    }
}
