//! State Manager (C6, §4.6): durable checkpointing and recovery for
//! workflow executions, sitting behind [`swarm_runtime::StateBackend`] so
//! the engine never depends on this crate directly.

pub mod lru;
pub mod manager;
pub mod store;

pub use lru::CheckpointCache;
pub use manager::{StateManager, StateManagerConfig};
pub use store::{InMemoryStore, PersistenceStore};
