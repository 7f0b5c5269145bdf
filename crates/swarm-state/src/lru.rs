//! Checkpoint cache: an LRU over decoded [`Checkpoint`]s, `cache_size`
//! entries, eviction on size only (§4.6 "Cache"). Reads are lock-free
//! against it only in the sense that they never touch the backing store;
//! the cache itself is a single narrow-scope mutex, matching the teacher's
//! preference for `parking_lot` over a lock-free structure where a plain
//! mutex is simple and sufficiently fast.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;
use swarm_core::Checkpoint;

struct Inner {
    entries: HashMap<String, Checkpoint>,
    order: VecDeque<String>,
    capacity: usize,
}

pub struct CheckpointCache {
    inner: Mutex<Inner>,
}

impl CheckpointCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                order: VecDeque::new(),
                capacity: capacity.max(1),
            }),
        }
    }

    pub fn get(&self, checkpoint_id: &str) -> Option<Checkpoint> {
        let mut inner = self.inner.lock();
        let found = inner.entries.get(checkpoint_id).cloned();
        if found.is_some() {
            inner.order.retain(|id| id != checkpoint_id);
            inner.order.push_back(checkpoint_id.to_string());
        }
        found
    }

    pub fn put(&self, checkpoint: Checkpoint) {
        let mut inner = self.inner.lock();
        let id = checkpoint.id.clone();
        if inner.entries.contains_key(&id) {
            inner.order.retain(|existing| existing != &id);
        }
        inner.entries.insert(id.clone(), checkpoint);
        inner.order.push_back(id);

        while inner.entries.len() > inner.capacity {
            if let Some(evict) = inner.order.pop_front() {
                inner.entries.remove(&evict);
            } else {
                break;
            }
        }
    }

    pub fn remove(&self, checkpoint_id: &str) {
        let mut inner = self.inner.lock();
        inner.entries.remove(checkpoint_id);
        inner.order.retain(|id| id != checkpoint_id);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swarm_core::{CheckpointLevel, CheckpointState};

    fn checkpoint(id_seed: &str) -> Checkpoint {
        let mut cp = Checkpoint::new(
            "exec-1",
            CheckpointLevel::Minimal,
            CheckpointState {
                status: "Running".into(),
                ..Default::default()
            },
        )
        .unwrap();
        cp.id = id_seed.to_string();
        cp
    }

    #[test]
    fn evicts_oldest_once_over_capacity() {
        let cache = CheckpointCache::new(2);
        cache.put(checkpoint("a"));
        cache.put(checkpoint("b"));
        cache.put(checkpoint("c"));
        assert_eq!(cache.len(), 2);
        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn get_refreshes_recency() {
        let cache = CheckpointCache::new(2);
        cache.put(checkpoint("a"));
        cache.put(checkpoint("b"));
        cache.get("a");
        cache.put(checkpoint("c"));
        assert!(cache.get("a").is_some());
        assert!(cache.get("b").is_none());
    }
}
