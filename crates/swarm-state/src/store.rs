//! The persistence contract C6 consumes (§6 "Persistence contract"): an
//! ordered key-value surface with prefix scans. The teacher's stack carries
//! no external KV client, so the in-process implementation here is the one
//! concrete backend; `swarmctl` wires it in, and a real deployment would
//! swap in a backend that speaks the same trait against durable storage.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use swarm_core::{SwarmError, SwarmResult};

#[async_trait]
pub trait PersistenceStore: Send + Sync {
    async fn put(&self, key: String, value: Vec<u8>) -> SwarmResult<()>;
    async fn get(&self, key: &str) -> SwarmResult<Option<Vec<u8>>>;
    /// Ordered scan of all keys starting with `prefix`, oldest-first by key
    /// sort order (callers encode a monotonic sequence into the key so this
    /// doubles as a chronological scan per execution id), capped at `limit`.
    async fn list_prefix(&self, prefix: &str, limit: usize) -> SwarmResult<Vec<(String, Vec<u8>)>>;
    async fn delete(&self, key: &str) -> SwarmResult<()>;
}

/// `BTreeMap` keeps keys in sorted order for free, which is exactly the
/// ordered-scan-by-execution-id-then-sequence the contract calls for.
#[derive(Default)]
pub struct InMemoryStore {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

const MAX_BLOB_BYTES: usize = 16 * 1024 * 1024;

#[async_trait]
impl PersistenceStore for InMemoryStore {
    async fn put(&self, key: String, value: Vec<u8>) -> SwarmResult<()> {
        if value.len() > MAX_BLOB_BYTES {
            return Err(SwarmError::validation(format!(
                "blob for key {key} is {} bytes, exceeds the 16 MiB persistence contract limit",
                value.len()
            )));
        }
        self.entries.write().insert(key, value);
        Ok(())
    }

    async fn get(&self, key: &str) -> SwarmResult<Option<Vec<u8>>> {
        Ok(self.entries.read().get(key).cloned())
    }

    async fn list_prefix(&self, prefix: &str, limit: usize) -> SwarmResult<Vec<(String, Vec<u8>)>> {
        Ok(self
            .entries
            .read()
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .take(limit)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    async fn delete(&self, key: &str) -> SwarmResult<()> {
        self.entries.write().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn list_prefix_returns_keys_in_sorted_order() {
        let store = InMemoryStore::new();
        store.put("exec-1/00000000000000000002".into(), b"b".to_vec()).await.unwrap();
        store.put("exec-1/00000000000000000001".into(), b"a".to_vec()).await.unwrap();
        store.put("exec-2/00000000000000000001".into(), b"x".to_vec()).await.unwrap();

        let scanned = store.list_prefix("exec-1/", 10).await.unwrap();
        assert_eq!(scanned.len(), 2);
        assert_eq!(scanned[0].1, b"a".to_vec());
        assert_eq!(scanned[1].1, b"b".to_vec());
    }

    #[tokio::test]
    async fn oversized_blob_is_rejected() {
        let store = InMemoryStore::new();
        let huge = vec![0u8; 17 * 1024 * 1024];
        assert!(store.put("k".into(), huge).await.is_err());
    }

    #[tokio::test]
    async fn delete_removes_the_key() {
        let store = InMemoryStore::new();
        store.put("k".into(), b"v".to_vec()).await.unwrap();
        store.delete("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }
}
