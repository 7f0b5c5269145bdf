//! The live map from agent id to its callable [`swarm_core::Agent`]
//! implementation.
//!
//! The capability registry (C1, `swarm-core`) owns metadata snapshots used
//! for matching; it never holds an executable handle. Dispatch needs both —
//! the snapshot to validate tools/capacity, the handle to actually invoke
//! `execute_task`. This directory is that second half, owned by the runtime
//! that hosts or proxies the agents (§3 "Ownership" only names the Registry
//! and Execution Context as exclusively owned; an agent directory is the
//! runtime's own bookkeeping, not a spec type).

use std::sync::Arc;

use dashmap::DashMap;
use swarm_core::{Agent, SwarmError, SwarmResult};

#[derive(Default)]
pub struct AgentDirectory {
    agents: DashMap<String, Arc<dyn Agent>>,
}

impl AgentDirectory {
    pub fn new() -> Self {
        Self { agents: DashMap::new() }
    }

    pub fn register(&self, agent: Arc<dyn Agent>) {
        self.agents.insert(agent.id().to_string(), agent);
    }

    pub fn deregister(&self, agent_id: &str) {
        self.agents.remove(agent_id);
    }

    pub fn get(&self, agent_id: &str) -> SwarmResult<Arc<dyn Agent>> {
        self.agents
            .get(agent_id)
            .map(|e| e.clone())
            .ok_or_else(|| SwarmError::not_found(format!("agent {agent_id}")))
    }

    pub fn contains(&self, agent_id: &str) -> bool {
        self.agents.contains_key(agent_id)
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}
