//! A reference [`swarm_core::Agent`] implementation used by `swarmctl` when
//! a pool entry in an applied YAML file has no external binding.
//!
//! Concrete agent implementations (code, devops, github, cloud agents) are
//! explicitly out of scope for the core (spec.md §1); this is the minimal
//! stand-in needed to exercise `execute`/`serve` end to end, in the spirit
//! of `swarm-runtime::agents`'s own `EchoAgent` test fixture.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use swarm_core::{Capability, SwarmResult};

/// Echoes its input back, merged with a small marker object, after an
/// optional simulated delay so `--wait` output has something to show.
pub struct DemoAgent {
    id: String,
    agent_type: String,
    name: String,
    capabilities: Vec<Capability>,
    tools: Vec<String>,
    simulated_latency: Duration,
}

impl DemoAgent {
    pub fn new(id: impl Into<String>, agent_type: impl Into<String>, name: impl Into<String>, capabilities: Vec<Capability>, tools: Vec<String>) -> Self {
        Self {
            id: id.into(),
            agent_type: agent_type.into(),
            name: name.into(),
            capabilities,
            tools,
            simulated_latency: Duration::from_millis(10),
        }
    }
}

#[async_trait]
impl swarm_core::Agent for DemoAgent {
    async fn execute_task(&self, step_type: &str, input: Value, _config: Value, timeout_s: u64) -> SwarmResult<Value> {
        if timeout_s == 0 {
            return Err(swarm_core::SwarmError::timed_out(format!("{} had a zero-second timeout", self.id)));
        }
        tokio::time::sleep(self.simulated_latency).await;
        let mut output = match input {
            Value::Object(map) => map,
            other => {
                let mut map = serde_json::Map::new();
                map.insert("input".to_string(), other);
                map
            }
        };
        output.insert("handled_by".to_string(), Value::String(self.id.clone()));
        output.insert("step_type".to_string(), Value::String(step_type.to_string()));
        Ok(Value::Object(output))
    }

    async fn health_check(&self) -> bool {
        true
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn agent_type(&self) -> &str {
        &self.agent_type
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    fn tools(&self) -> &[String] {
        &self.tools
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swarm_core::Agent as AgentTrait;

    #[tokio::test]
    async fn echoes_input_with_marker_fields() {
        let agent = DemoAgent::new("demo-1", "demo", "Demo One", vec![], vec!["shell".into()]);
        let out = agent
            .execute_task("Action", serde_json::json!({"n": 1}), serde_json::json!({}), 5)
            .await
            .unwrap();
        assert_eq!(out["n"], 1);
        assert_eq!(out["handled_by"], "demo-1");
    }

    #[tokio::test]
    async fn zero_timeout_fails_immediately() {
        let agent = DemoAgent::new("demo-1", "demo", "Demo One", vec![], vec![]);
        let err = agent.execute_task("Action", serde_json::json!({}), serde_json::json!({}), 0).await.unwrap_err();
        assert!(matches!(err, swarm_core::SwarmError::TimedOut(_)));
    }
}
