//! A [`swarm_state::PersistenceStore`] backed by one file per key under a
//! directory, so checkpoints written by one `swarmctl serve` process are
//! still readable the next time it starts. `swarm-state`'s own
//! `InMemoryStore` is the only backend the teacher's stack ships (spec.md
//! §6 "Persistence contract" names no concrete technology); this is the
//! "real deployment would swap in a backend that speaks the same trait"
//! case its docs call out.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use swarm_core::{SwarmError, SwarmResult};
use swarm_state::PersistenceStore;

pub struct FilePersistenceStore {
    root: PathBuf,
}

impl FilePersistenceStore {
    pub fn new(root: impl Into<PathBuf>) -> SwarmResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        // Keys are `{execution_id}/{seq:020}`; encode the separator so a
        // single flat directory can hold every execution's checkpoints
        // without nested-directory bookkeeping.
        self.root.join(key.replace('/', "__"))
    }

    fn key_for(root: &Path, path: &Path) -> Option<String> {
        path.strip_prefix(root).ok()?.to_str().map(|s| s.replace("__", "/"))
    }
}

#[async_trait]
impl PersistenceStore for FilePersistenceStore {
    async fn put(&self, key: String, value: Vec<u8>) -> SwarmResult<()> {
        let path = self.path_for(&key);
        tokio::fs::write(&path, value).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> SwarmResult<Option<Vec<u8>>> {
        let path = self.path_for(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SwarmError::from(e)),
        }
    }

    async fn list_prefix(&self, prefix: &str, limit: usize) -> SwarmResult<Vec<(String, Vec<u8>)>> {
        let mut rows = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let Some(key) = Self::key_for(&self.root, &path) else { continue };
            if key.starts_with(prefix) {
                let bytes = tokio::fs::read(&path).await?;
                rows.push((key, bytes));
            }
        }
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn delete(&self, key: &str) -> SwarmResult<()> {
        let path = self.path_for(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SwarmError::from(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilePersistenceStore::new(dir.path()).unwrap();
        store.put("exec-1/00000000000000000001".into(), b"payload".to_vec()).await.unwrap();
        let read = store.get("exec-1/00000000000000000001").await.unwrap();
        assert_eq!(read, Some(b"payload".to_vec()));
    }

    #[tokio::test]
    async fn list_prefix_filters_and_sorts_by_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilePersistenceStore::new(dir.path()).unwrap();
        store.put("exec-1/00000000000000000002".into(), b"b".to_vec()).await.unwrap();
        store.put("exec-1/00000000000000000001".into(), b"a".to_vec()).await.unwrap();
        store.put("exec-2/00000000000000000001".into(), b"x".to_vec()).await.unwrap();

        let rows = store.list_prefix("exec-1/", 10).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].1, b"a".to_vec());
        assert_eq!(rows[1].1, b"b".to_vec());
    }

    #[tokio::test]
    async fn delete_missing_key_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilePersistenceStore::new(dir.path()).unwrap();
        store.delete("missing").await.unwrap();
    }
}
