//! The agent contract and the live pool entry the registry tracks for each
//! agent that implements it.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::capability::Capability;
use crate::SwarmResult;

/// Health as reported externally or derived from load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum Health {
    Healthy,
    Warning,
    Critical,
    Offline,
    Unknown,
}

impl Health {
    /// Weight used by `availability_score` (§4.2).
    pub fn weight(self) -> f64 {
        match self {
            Health::Healthy => 1.0,
            Health::Warning => 0.7,
            Health::Critical => 0.3,
            Health::Offline => 0.0,
            Health::Unknown => 0.5,
        }
    }
}

/// Resource limits declared by an agent at registration time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceLimits {
    pub max_concurrent: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_memory_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_cpu_millis: Option<u64>,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_concurrent: 1,
            max_memory_bytes: None,
            max_cpu_millis: None,
        }
    }
}

/// Scheduling metadata used by the matcher and coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulingMetadata {
    #[serde(default = "default_priority")]
    pub priority: u8,
    #[serde(default)]
    pub environment: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub cost_per_execution: f64,
}

fn default_priority() -> u8 {
    5
}

impl Default for SchedulingMetadata {
    fn default() -> Self {
        Self {
            priority: default_priority(),
            environment: None,
            region: None,
            cost_per_execution: 0.1,
        }
    }
}

/// Per-capability historical performance, used by `performance_score` and
/// `estimated_execution_time`/`estimated_cost`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CapabilityMetrics {
    pub success_rate: f64,
    pub avg_exec_time_secs: f64,
    pub executions: u64,
}

/// The live registry record for one agent: identity, declared capability and
/// tool surface, current load/health, and scheduling metadata (§3 "Agent Pool
/// Entry").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentPoolEntry {
    pub id: String,
    pub agent_type: String,
    pub name: String,

    #[serde(default)]
    pub capabilities: Vec<Capability>,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub supported_strategies: Vec<String>,

    #[serde(default)]
    pub limits: ResourceLimits,

    pub current_load: u32,
    pub health: Health,
    pub last_heartbeat: DateTime<Utc>,
    pub uptime_start: DateTime<Utc>,

    /// Tracks whether `health` was last set by an external signal (vs.
    /// derived from load) since the last `set_load` call — resolves the
    /// load-derived-health-override open question (health is only
    /// re-derived from load when no external signal intervened since).
    #[serde(default)]
    pub external_health_since_load: bool,

    #[serde(default)]
    pub scheduling: SchedulingMetadata,

    #[serde(default)]
    pub per_capability_metrics: HashMap<String, CapabilityMetrics>,
}

impl AgentPoolEntry {
    pub fn new(id: impl Into<String>, agent_type: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            agent_type: agent_type.into(),
            name: name.into(),
            capabilities: Vec::new(),
            tools: Vec::new(),
            supported_strategies: Vec::new(),
            limits: ResourceLimits::default(),
            current_load: 0,
            health: Health::Healthy,
            last_heartbeat: now,
            uptime_start: now,
            external_health_since_load: false,
            scheduling: SchedulingMetadata::default(),
            per_capability_metrics: HashMap::new(),
        }
    }

    pub fn validate(&self) -> SwarmResult<()> {
        if self.id.trim().is_empty() {
            return Err(crate::SwarmError::validation("agent id must not be empty"));
        }
        if self.current_load > self.limits.max_concurrent {
            return Err(crate::SwarmError::validation(format!(
                "agent {} current_load {} exceeds max_concurrent {}",
                self.id, self.current_load, self.limits.max_concurrent
            )));
        }
        Ok(())
    }

    pub fn load_fraction(&self) -> f64 {
        if self.limits.max_concurrent == 0 {
            return 1.0;
        }
        self.current_load as f64 / self.limits.max_concurrent as f64
    }

    pub fn available_capacity(&self) -> u32 {
        self.limits.max_concurrent.saturating_sub(self.current_load)
    }

    /// Available iff health is Healthy/Warning, has spare capacity, and the
    /// heartbeat is within `heartbeat_ttl` of `now`.
    pub fn is_available(&self, now: DateTime<Utc>, heartbeat_ttl: chrono::Duration) -> bool {
        matches!(self.health, Health::Healthy | Health::Warning)
            && self.current_load < self.limits.max_concurrent
            && (now - self.last_heartbeat) <= heartbeat_ttl
    }

    pub fn has_tool(&self, tool: &str) -> bool {
        self.tools.iter().any(|t| t == tool)
    }

    pub fn has_capability(&self, name: &str) -> bool {
        self.capabilities.iter().any(|c| c.name == name)
    }
}

/// The contract every worker agent implements; consumed by the step executor
/// (C3) and the multi-agent coordinator (C4). External/out-of-process agents
/// are adapted to this trait by their own integration layer.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Execute one step's task. `input` is the current context's variable
    /// bag projected per the step's input schema; `config` carries
    /// step-specific configuration (coordination hints, limits).
    async fn execute_task(
        &self,
        step_type: &str,
        input: Value,
        config: Value,
        timeout_s: u64,
    ) -> SwarmResult<Value>;

    /// Liveness probe independent of heartbeat bookkeeping.
    async fn health_check(&self) -> bool;

    fn id(&self) -> &str;
    fn agent_type(&self) -> &str;
    fn name(&self) -> &str;
    fn description(&self) -> &str {
        ""
    }
    fn capabilities(&self) -> &[Capability];
    fn tools(&self) -> &[String];
    fn version(&self) -> &str {
        "0.1.0"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn entry_available_within_ttl_and_capacity() {
        let mut entry = AgentPoolEntry::new("a1", "code", "Agent One");
        entry.limits.max_concurrent = 2;
        entry.current_load = 1;
        assert!(entry.is_available(Utc::now(), Duration::minutes(5)));
    }

    #[test]
    fn entry_unavailable_when_stale() {
        let mut entry = AgentPoolEntry::new("a1", "code", "Agent One");
        entry.last_heartbeat = Utc::now() - Duration::minutes(10);
        assert!(!entry.is_available(Utc::now(), Duration::minutes(5)));
    }

    #[test]
    fn entry_unavailable_when_saturated() {
        let mut entry = AgentPoolEntry::new("a1", "code", "Agent One");
        entry.limits.max_concurrent = 1;
        entry.current_load = 1;
        assert!(!entry.is_available(Utc::now(), Duration::minutes(5)));
    }

    #[test]
    fn validate_rejects_overloaded_entry() {
        let mut entry = AgentPoolEntry::new("a1", "code", "Agent One");
        entry.limits.max_concurrent = 1;
        entry.current_load = 3;
        assert!(entry.validate().is_err());
    }
}
