//! Capability data model (§3 "Capability", "Capability Filter", "Match
//! Result"): named units of work an agent can perform, the declarative
//! requirements a step places on candidate agents, and the ranked output of
//! matching agents against those requirements.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{SwarmError, SwarmResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityType {
    TaskExecution,
    Coordination,
    Monitoring,
    Documentation,
    Validation,
    Communication,
    DataProcessing,
    Analysis,
    Automation,
    Integration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Simple,
    Moderate,
    Complex,
    Expert,
}

/// A named unit of work an agent can perform. Immutable once published: a
/// new version replaces the prior one by name (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capability {
    pub name: String,
    pub capability_type: CapabilityType,
    pub complexity: Complexity,

    #[serde(default)]
    pub step_types: Vec<String>,
    #[serde(default)]
    pub required_tools: Vec<String>,
    #[serde(default)]
    pub optional_tools: Vec<String>,
    #[serde(default)]
    pub workflow_strategies: Vec<String>,

    pub typical_execution_time_secs: f64,
    pub max_execution_time_secs: f64,

    #[serde(default)]
    pub parallel_safe: bool,
    #[serde(default)]
    pub stateful: bool,
    #[serde(default)]
    pub resource_intensive: bool,

    #[serde(default)]
    pub input_schema: Option<Value>,
    #[serde(default)]
    pub output_schema: Option<Value>,

    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub conflicts_with: Vec<String>,

    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub deprecated: bool,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

impl Capability {
    pub fn validate(&self) -> SwarmResult<()> {
        if self.name.trim().is_empty() {
            return Err(SwarmError::validation("capability name must not be empty"));
        }
        if self.typical_execution_time_secs > self.max_execution_time_secs {
            return Err(SwarmError::validation(format!(
                "capability {}: typical_execution_time ({}) exceeds max_execution_time ({})",
                self.name, self.typical_execution_time_secs, self.max_execution_time_secs
            )));
        }
        Ok(())
    }
}

/// Declarative requirements a workflow step places on candidate agents
/// (§3 "Capability Filter").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CapabilityFilter {
    #[serde(default)]
    pub required_types: Vec<CapabilityType>,
    #[serde(default)]
    pub required_step_types: Vec<String>,
    #[serde(default)]
    pub required_tools: Vec<String>,
    #[serde(default)]
    pub required_strategies: Vec<String>,

    #[serde(default)]
    pub min_success_rate: Option<f64>,
    #[serde(default)]
    pub max_execution_time_secs: Option<f64>,
    #[serde(default)]
    pub min_available_capacity: u32,
    #[serde(default)]
    pub max_current_load_pct: Option<f64>,

    #[serde(default = "default_health_statuses")]
    pub health_statuses: Vec<crate::agent::Health>,

    #[serde(default)]
    pub environment: Option<String>,
    #[serde(default)]
    pub region: Option<String>,

    #[serde(default)]
    pub include_agents: Vec<String>,
    #[serde(default)]
    pub exclude_agents: Vec<String>,

    #[serde(default)]
    pub max_cost: Option<f64>,
    #[serde(default)]
    pub required_tags: Vec<String>,
}

fn default_health_statuses() -> Vec<crate::agent::Health> {
    use crate::agent::Health;
    vec![Health::Healthy, Health::Warning]
}

impl CapabilityFilter {
    pub fn is_empty(&self) -> bool {
        self.required_types.is_empty()
            && self.required_step_types.is_empty()
            && self.required_tools.is_empty()
            && self.required_strategies.is_empty()
    }
}

/// Per-axis sub-scores computed by the matcher (§4.2), each in [0,1].
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SubScores {
    pub capability: f64,
    pub tool: f64,
    pub workflow: f64,
    pub performance: f64,
    pub availability: f64,
    pub health: f64,
    pub cost: f64,
}

/// Ranked output of matching one agent against a filter+context (§3 "Match
/// Result"). Viable iff `total >= 0.5 && missing_requirements.is_empty() &&
/// sub_scores.health > 0.0`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchResult {
    pub agent_id: String,
    pub total_score: f64,
    pub sub_scores: SubScores,
    pub estimated_execution_time_secs: f64,
    pub estimated_cost: f64,
    pub confidence: f64,
    pub missing_requirements: Vec<String>,
}

impl MatchResult {
    pub fn is_viable(&self) -> bool {
        self.total_score >= 0.5 && self.missing_requirements.is_empty() && self.sub_scores.health > 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_rejects_typical_exceeding_max() {
        let cap = Capability {
            name: "deploy".into(),
            capability_type: CapabilityType::Automation,
            complexity: Complexity::Moderate,
            step_types: vec![],
            required_tools: vec![],
            optional_tools: vec![],
            workflow_strategies: vec![],
            typical_execution_time_secs: 100.0,
            max_execution_time_secs: 50.0,
            parallel_safe: true,
            stateful: false,
            resource_intensive: false,
            input_schema: None,
            output_schema: None,
            depends_on: vec![],
            conflicts_with: vec![],
            version: "1.0.0".into(),
            deprecated: false,
        };
        assert!(cap.validate().is_err());
    }

    #[test]
    fn match_result_requires_all_three_viability_conditions() {
        let mut result = MatchResult {
            agent_id: "a1".into(),
            total_score: 0.6,
            sub_scores: SubScores {
                health: 1.0,
                ..Default::default()
            },
            estimated_execution_time_secs: 10.0,
            estimated_cost: 0.1,
            confidence: 0.9,
            missing_requirements: vec![],
        };
        assert!(result.is_viable());

        result.sub_scores.health = 0.0;
        assert!(!result.is_viable());

        result.sub_scores.health = 1.0;
        result.missing_requirements.push("tool:kubectl".into());
        assert!(!result.is_viable());

        result.missing_requirements.clear();
        result.total_score = 0.49;
        assert!(!result.is_viable());
    }
}
