//! Capability Registry (C1): the live map from agent id to [`AgentPoolEntry`].
//!
//! Mutations are serialised per agent id (`DashMap` shards the lock); list
//! and get reads hand back owned snapshots so callers never block a writer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use dashmap::DashMap;
use tracing::{debug, warn};

use crate::agent::{AgentPoolEntry, Health};
use crate::capability::Capability;
use crate::{SwarmError, SwarmResult};

/// Coarse filter for `list()` — finer-grained filtering is the matcher's job.
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub health: Option<Health>,
    pub agent_type: Option<String>,
    pub region: Option<String>,
}

/// Running counters exposed for observability (adopted from the upstream
/// discovery service's metrics dict).
#[derive(Debug, Default)]
pub struct RegistryStats {
    pub registered_total: AtomicU64,
    pub heartbeats_total: AtomicU64,
    pub stale_evictions_total: AtomicU64,
}

impl RegistryStats {
    fn snapshot(&self) -> RegistryStatsSnapshot {
        RegistryStatsSnapshot {
            registered_total: self.registered_total.load(Ordering::Relaxed),
            heartbeats_total: self.heartbeats_total.load(Ordering::Relaxed),
            stale_evictions_total: self.stale_evictions_total.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RegistryStatsSnapshot {
    pub registered_total: u64,
    pub heartbeats_total: u64,
    pub stale_evictions_total: u64,
}

/// Holds the agent pool and enforces the registry's invariants (§4.1).
pub struct CapabilityRegistry {
    entries: DashMap<String, AgentPoolEntry>,
    heartbeat_ttl: Duration,
    stats: RegistryStats,
}

impl CapabilityRegistry {
    pub fn new(heartbeat_ttl: StdDuration) -> Self {
        Self {
            entries: DashMap::new(),
            heartbeat_ttl: Duration::from_std(heartbeat_ttl).unwrap_or_else(|_| Duration::minutes(5)),
            stats: RegistryStats::default(),
        }
    }

    /// Insert or replace an entry, validating invariants. `last_heartbeat`
    /// is whatever the caller supplied (defaults to now via
    /// `AgentPoolEntry::new`); upsert never stamps over it.
    pub fn upsert(&self, entry: AgentPoolEntry) -> SwarmResult<()> {
        entry.validate()?;
        let is_new = !self.entries.contains_key(&entry.id);
        if is_new {
            self.stats.registered_total.fetch_add(1, Ordering::Relaxed);
            debug!(agent_id = %entry.id, "agent registered");
        }
        self.entries.insert(entry.id.clone(), entry);
        Ok(())
    }

    pub fn get(&self, agent_id: &str) -> Option<AgentPoolEntry> {
        self.entries.get(agent_id).map(|e| e.clone())
    }

    pub fn list(&self, filter: Option<&ListFilter>) -> Vec<AgentPoolEntry> {
        self.entries
            .iter()
            .map(|e| e.value().clone())
            .filter(|e| match filter {
                None => true,
                Some(f) => {
                    f.health.map(|h| h == e.health).unwrap_or(true)
                        && f.agent_type.as_deref().map(|t| t == e.agent_type).unwrap_or(true)
                        && f.region
                            .as_deref()
                            .map(|r| e.scheduling.region.as_deref() == Some(r))
                            .unwrap_or(true)
                }
            })
            .collect()
    }

    pub fn heartbeat(&self, agent_id: &str) -> SwarmResult<()> {
        let mut entry = self
            .entries
            .get_mut(agent_id)
            .ok_or_else(|| SwarmError::not_found(format!("agent {agent_id}")))?;
        entry.last_heartbeat = Utc::now();
        self.stats.heartbeats_total.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Updates current_load and derives health from load% unless an
    /// external signal has been set since the last load update (resolved
    /// open question, see SPEC_FULL.md §D.2).
    pub fn set_load(&self, agent_id: &str, n: i64) -> SwarmResult<()> {
        let mut entry = self
            .entries
            .get_mut(agent_id)
            .ok_or_else(|| SwarmError::not_found(format!("agent {agent_id}")))?;
        if n < 0 || n as u64 > entry.limits.max_concurrent as u64 {
            return Err(SwarmError::validation(format!(
                "invalid load {n} for agent {agent_id} (max_concurrent={})",
                entry.limits.max_concurrent
            )));
        }
        entry.current_load = n as u32;
        if entry.external_health_since_load {
            // An external signal arrived since the last load update: this
            // update does not override it, but it does become the new
            // reference point — the next load update derives normally
            // unless another external signal intervenes first.
            entry.external_health_since_load = false;
        } else {
            let load_pct = entry.load_fraction();
            entry.health = if load_pct >= 0.95 {
                Health::Critical
            } else if load_pct >= 0.80 {
                Health::Warning
            } else {
                Health::Healthy
            };
        }
        Ok(())
    }

    /// Sets health from an external signal, marking it authoritative until
    /// the next `set_load` call.
    pub fn set_external_health(&self, agent_id: &str, health: Health) -> SwarmResult<()> {
        let mut entry = self
            .entries
            .get_mut(agent_id)
            .ok_or_else(|| SwarmError::not_found(format!("agent {agent_id}")))?;
        entry.health = health;
        entry.external_health_since_load = true;
        Ok(())
    }

    pub fn add_capability(&self, agent_id: &str, capability: Capability) -> SwarmResult<()> {
        capability.validate()?;
        let mut entry = self
            .entries
            .get_mut(agent_id)
            .ok_or_else(|| SwarmError::not_found(format!("agent {agent_id}")))?;
        if let Some(existing) = entry.capabilities.iter_mut().find(|c| c.name == capability.name) {
            *existing = capability;
        } else {
            entry.capabilities.push(capability);
        }
        Ok(())
    }

    /// Removes entries whose heartbeat has aged past the TTL. Returns the
    /// evicted agent ids.
    pub fn sweep(&self) -> Vec<String> {
        let now = Utc::now();
        let stale: Vec<String> = self
            .entries
            .iter()
            .filter(|e| now - e.last_heartbeat > self.heartbeat_ttl)
            .map(|e| e.key().clone())
            .collect();
        for id in &stale {
            self.entries.remove(id);
            warn!(agent_id = %id, "evicted stale agent");
        }
        self.stats
            .stale_evictions_total
            .fetch_add(stale.len() as u64, Ordering::Relaxed);
        stale
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn stats(&self) -> RegistryStatsSnapshot {
        self.stats.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> CapabilityRegistry {
        CapabilityRegistry::new(StdDuration::from_secs(300))
    }

    #[test]
    fn upsert_then_get_roundtrips() {
        let reg = registry();
        let entry = AgentPoolEntry::new("a1", "code", "Agent One");
        reg.upsert(entry).unwrap();
        assert!(reg.get("a1").is_some());
        assert_eq!(reg.count(), 1);
    }

    #[test]
    fn heartbeat_unknown_agent_fails_not_found() {
        let reg = registry();
        assert!(matches!(reg.heartbeat("missing"), Err(SwarmError::NotFound(_))));
    }

    #[test]
    fn set_load_derives_health_from_load_pct() {
        let reg = registry();
        let mut entry = AgentPoolEntry::new("a1", "code", "Agent One");
        entry.limits.max_concurrent = 10;
        reg.upsert(entry).unwrap();

        reg.set_load("a1", 9).unwrap();
        assert_eq!(reg.get("a1").unwrap().health, Health::Critical);

        reg.set_load("a1", 8).unwrap();
        assert_eq!(reg.get("a1").unwrap().health, Health::Warning);

        reg.set_load("a1", 1).unwrap();
        assert_eq!(reg.get("a1").unwrap().health, Health::Healthy);
    }

    #[test]
    fn set_load_rejects_out_of_range() {
        let reg = registry();
        let mut entry = AgentPoolEntry::new("a1", "code", "Agent One");
        entry.limits.max_concurrent = 2;
        reg.upsert(entry).unwrap();
        assert!(reg.set_load("a1", -1).is_err());
        assert!(reg.set_load("a1", 3).is_err());
    }

    #[test]
    fn external_health_overrides_load_derivation_until_next_set_load() {
        let reg = registry();
        let mut entry = AgentPoolEntry::new("a1", "code", "Agent One");
        entry.limits.max_concurrent = 10;
        reg.upsert(entry).unwrap();

        reg.set_load("a1", 9).unwrap();
        assert_eq!(reg.get("a1").unwrap().health, Health::Critical);

        reg.set_external_health("a1", Health::Healthy).unwrap();
        assert_eq!(reg.get("a1").unwrap().health, Health::Healthy);

        // The load update immediately following an external signal does not
        // override it, but clears the flag so it becomes the new reference
        // point for subsequent derivations.
        reg.set_load("a1", 9).unwrap();
        assert_eq!(reg.get("a1").unwrap().health, Health::Healthy);

        // With no further external signal, the next load update re-derives.
        reg.set_load("a1", 9).unwrap();
        assert_eq!(reg.get("a1").unwrap().health, Health::Critical);
    }

    #[test]
    fn sweep_evicts_past_ttl_only() {
        let reg = CapabilityRegistry::new(StdDuration::from_secs(1));
        let mut stale = AgentPoolEntry::new("stale", "code", "Stale");
        stale.last_heartbeat = Utc::now() - Duration::seconds(10);
        reg.upsert(stale).unwrap();
        reg.upsert(AgentPoolEntry::new("fresh", "code", "Fresh")).unwrap();

        let evicted = reg.sweep();
        assert_eq!(evicted, vec!["stale".to_string()]);
        assert!(reg.get("stale").is_none());
        assert!(reg.get("fresh").is_some());
    }
}
