//! Engine-wide tunables (§6 "Configuration"), loadable from YAML with
//! defaults matching the external contract.

use serde::{Deserialize, Serialize};

use crate::SwarmResult;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SwarmConfig {
    pub max_concurrent_workflows: u32,
    pub default_timeout_s: u64,
    pub checkpoint_interval_s: u64,
    pub heartbeat_ttl_s: u64,
    pub sweep_interval_s: u64,
    pub cache_size: usize,
    pub monitoring_interval_s: u64,
    pub metric_retention_h: u64,
    pub enable_load_balancing: bool,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            max_concurrent_workflows: 10,
            default_timeout_s: 3600,
            checkpoint_interval_s: 60,
            heartbeat_ttl_s: 300,
            sweep_interval_s: 60,
            cache_size: 1000,
            monitoring_interval_s: 30,
            metric_retention_h: 24,
            enable_load_balancing: true,
        }
    }
}

impl SwarmConfig {
    pub fn from_yaml(raw: &str) -> SwarmResult<Self> {
        Ok(serde_yaml::from_str(raw)?)
    }

    pub fn to_yaml(&self) -> SwarmResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_external_contract() {
        let cfg = SwarmConfig::default();
        assert_eq!(cfg.max_concurrent_workflows, 10);
        assert_eq!(cfg.default_timeout_s, 3600);
        assert_eq!(cfg.checkpoint_interval_s, 60);
        assert_eq!(cfg.heartbeat_ttl_s, 300);
        assert_eq!(cfg.sweep_interval_s, 60);
        assert_eq!(cfg.cache_size, 1000);
        assert_eq!(cfg.monitoring_interval_s, 30);
        assert_eq!(cfg.metric_retention_h, 24);
        assert!(cfg.enable_load_balancing);
    }

    #[test]
    fn partial_yaml_falls_back_to_defaults() {
        let cfg = SwarmConfig::from_yaml("max_concurrent_workflows: 25\n").unwrap();
        assert_eq!(cfg.max_concurrent_workflows, 25);
        assert_eq!(cfg.default_timeout_s, 3600);
    }

    #[test]
    fn roundtrips_through_yaml() {
        let cfg = SwarmConfig::default();
        let yaml = cfg.to_yaml().unwrap();
        let back = SwarmConfig::from_yaml(&yaml).unwrap();
        assert_eq!(back.cache_size, cfg.cache_size);
    }
}
