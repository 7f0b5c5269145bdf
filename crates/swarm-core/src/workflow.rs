//! Workflow definition and execution data model (§3 "Workflow", "Workflow
//! Step", "Execution", "Step Execution"). This module holds types only; the
//! driving logic lives in the runtime's workflow engine (C5).

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::capability::CapabilityFilter;
use crate::coordination::CoordinationStrategy;
use crate::{SwarmError, SwarmResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum WorkflowType {
    Sequential,
    Parallel,
    Pipeline,
    MultiAgent,
    ConditionalDag,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum WorkflowStatus {
    Draft,
    Active,
    Inactive,
    Deprecated,
    Archived,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum StepType {
    Action,
    Decision,
    Verification,
    Notification,
    Wait,
    Loop,
    Condition,
    Parallel,
    AgentTask,
    ToolExecution,
    HumanInput,
    Script,
}

/// What happens to the rest of a workflow when a step exhausts retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnFailure {
    Fail,
    Continue,
}

impl Default for OnFailure {
    fn default() -> Self {
        Self::Fail
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_backoff_factor() -> f64 {
    2.0
}
fn default_base_delay_ms() -> u64 {
    500
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_factor: default_backoff_factor(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

impl RetryPolicy {
    /// delay_n = base * factor^(n-1), jittered +/-20% by the caller.
    pub fn delay_for_attempt(&self, attempt: u32) -> std::time::Duration {
        let exp = self.backoff_factor.powi(attempt.saturating_sub(1) as i32);
        let millis = self.base_delay_ms as f64 * exp;
        std::time::Duration::from_millis(millis.round() as u64)
    }
}

/// Step-specific configuration: coordination strategy, parallelism, timeout,
/// retry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepConfig {
    #[serde(default)]
    pub coordination_strategy: Option<CoordinationStrategy>,
    #[serde(default = "default_parallelism")]
    pub parallelism: u32,
    pub timeout_s: u64,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub on_failure: OnFailure,
}

fn default_parallelism() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub id: String,
    pub step_type: StepType,
    pub order: u32,
    #[serde(default)]
    pub depends_on: Vec<String>,
    pub config: StepConfig,
    #[serde(default)]
    pub capability_filter: CapabilityFilter,
}

impl WorkflowStep {
    pub fn validate(&self, workflow_timeout_s: u64) -> SwarmResult<()> {
        if self.id.trim().is_empty() {
            return Err(SwarmError::validation("step id must not be empty"));
        }
        if self.config.timeout_s > workflow_timeout_s {
            return Err(SwarmError::validation(format!(
                "step {} timeout ({}) exceeds workflow timeout ({})",
                self.id, self.config.timeout_s, workflow_timeout_s
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: String,
    pub name: String,
    pub workflow_type: WorkflowType,
    pub steps: Vec<WorkflowStep>,
    pub status: WorkflowStatus,

    #[serde(default)]
    pub input_schema: Option<Value>,
    #[serde(default)]
    pub output_schema: Option<Value>,

    #[serde(default = "default_max_concurrent_executions")]
    pub max_concurrent_executions: u32,
    #[serde(default = "default_timeout_s")]
    pub default_timeout_s: u64,
    #[serde(default)]
    pub retry_policy: RetryPolicy,
}

fn default_max_concurrent_executions() -> u32 {
    10
}
fn default_timeout_s() -> u64 {
    3600
}

impl Workflow {
    pub fn from_yaml(yaml: &str) -> SwarmResult<Self> {
        let workflow: Workflow = serde_yaml::from_str(yaml)?;
        workflow.validate()?;
        Ok(workflow)
    }

    /// Step ids must be unique and `depends_on` must form a DAG (§3).
    pub fn validate(&self) -> SwarmResult<()> {
        if self.id.trim().is_empty() {
            return Err(SwarmError::validation("workflow id must not be empty"));
        }

        let mut seen = HashSet::new();
        for step in &self.steps {
            if !seen.insert(step.id.as_str()) {
                return Err(SwarmError::validation(format!("duplicate step id {}", step.id)));
            }
        }
        for step in &self.steps {
            step.validate(self.default_timeout_s)?;
            for dep in &step.depends_on {
                if !seen.contains(dep.as_str()) {
                    return Err(SwarmError::validation(format!(
                        "step {} depends on unknown step {}",
                        step.id, dep
                    )));
                }
            }
        }
        self.check_acyclic()?;
        Ok(())
    }

    fn check_acyclic(&self) -> SwarmResult<()> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            InProgress,
            Done,
        }
        let mut marks: HashMap<&str, Mark> = self.steps.iter().map(|s| (s.id.as_str(), Mark::Unvisited)).collect();
        let by_id: HashMap<&str, &WorkflowStep> = self.steps.iter().map(|s| (s.id.as_str(), s)).collect();

        fn visit<'a>(
            id: &'a str,
            by_id: &HashMap<&'a str, &'a WorkflowStep>,
            marks: &mut HashMap<&'a str, Mark>,
        ) -> SwarmResult<()> {
            match marks.get(id) {
                Some(Mark::Done) => return Ok(()),
                Some(Mark::InProgress) => {
                    return Err(SwarmError::validation(format!("dependency cycle detected at step {id}")))
                }
                _ => {}
            }
            marks.insert(id, Mark::InProgress);
            if let Some(step) = by_id.get(id) {
                for dep in &step.depends_on {
                    visit(dep, by_id, marks)?;
                }
            }
            marks.insert(id, Mark::Done);
            Ok(())
        }

        for step in &self.steps {
            visit(step.id.as_str(), &by_id, &mut marks)?;
        }
        Ok(())
    }

    /// Steps whose dependencies are satisfied and not yet terminal.
    pub fn ready_set(&self, completed: &HashSet<String>, failed: &HashSet<String>, skipped: &HashSet<String>) -> Vec<&WorkflowStep> {
        self.steps
            .iter()
            .filter(|s| {
                !completed.contains(&s.id)
                    && !failed.contains(&s.id)
                    && !skipped.contains(&s.id)
                    && s.depends_on.iter().all(|d| completed.contains(d))
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    /// Valid transitions per the FSM in §4.5.
    pub fn can_transition_to(self, next: ExecutionStatus) -> bool {
        use ExecutionStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Running, Paused)
                | (Paused, Running)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
                | (Paused, Cancelled)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum StepExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
    Cancelled,
    TimedOut,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepExecution {
    pub execution_id: String,
    pub step_id: String,
    pub assigned_agent_id: Option<String>,
    pub status: StepExecutionStatus,
    pub attempt_count: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub output: Option<Value>,
    pub error: Option<String>,
}

impl StepExecution {
    pub fn new(execution_id: impl Into<String>, step_id: impl Into<String>) -> Self {
        Self {
            execution_id: execution_id.into(),
            step_id: step_id.into(),
            assigned_agent_id: None,
            status: StepExecutionStatus::Pending,
            attempt_count: 0,
            started_at: None,
            ended_at: None,
            output: None,
            error: None,
        }
    }
}

/// A live workflow instance (§3 "Execution").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub id: String,
    pub workflow_id: String,
    pub status: ExecutionStatus,

    #[serde(default)]
    pub input_variables: HashMap<String, Value>,
    #[serde(default)]
    pub output_variables: HashMap<String, Value>,
    pub error: Option<String>,

    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub last_heartbeat: DateTime<Utc>,

    #[serde(default)]
    pub completed_steps: HashSet<String>,
    #[serde(default)]
    pub failed_steps: HashSet<String>,
    #[serde(default)]
    pub skipped_steps: HashSet<String>,

    pub current_step_id: Option<String>,

    #[serde(default)]
    pub step_results: HashMap<String, Value>,
    #[serde(default)]
    pub step_durations_ms: HashMap<String, u64>,

    #[serde(default)]
    pub checkpoint_history: Vec<String>,
}

impl Execution {
    pub fn new(workflow_id: impl Into<String>, input_variables: HashMap<String, Value>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            workflow_id: workflow_id.into(),
            status: ExecutionStatus::Pending,
            input_variables,
            output_variables: HashMap::new(),
            error: None,
            started_at: None,
            ended_at: None,
            last_heartbeat: Utc::now(),
            completed_steps: HashSet::new(),
            failed_steps: HashSet::new(),
            skipped_steps: HashSet::new(),
            current_step_id: None,
            step_results: HashMap::new(),
            step_durations_ms: HashMap::new(),
            checkpoint_history: Vec::new(),
        }
    }

    pub fn transition(&mut self, next: ExecutionStatus) -> SwarmResult<()> {
        if self.status == next {
            // idempotent no-ops per the round-trip laws in §8
            return Ok(());
        }
        if !self.status.can_transition_to(next) {
            return Err(SwarmError::invalid_transition(self.status, next));
        }
        self.status = next;
        Ok(())
    }

    /// `completed(e) ∩ failed(e) = ∅` and `completed(e) ∩ skipped(e) = ∅`.
    pub fn check_set_invariants(&self) -> SwarmResult<()> {
        if !self.completed_steps.is_disjoint(&self.failed_steps) {
            return Err(SwarmError::internal("completed and failed step sets overlap"));
        }
        if !self.completed_steps.is_disjoint(&self.skipped_steps) {
            return Err(SwarmError::internal("completed and skipped step sets overlap"));
        }
        Ok(())
    }
}

impl SwarmError {
    fn invalid_transition(from: ExecutionStatus, to: ExecutionStatus) -> Self {
        Self::internal(format!("cannot transition execution from {from:?} to {to:?}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simple_workflow() -> Workflow {
        Workflow {
            id: "wf-1".into(),
            name: "test".into(),
            workflow_type: WorkflowType::Sequential,
            steps: vec![
                WorkflowStep {
                    id: "s1".into(),
                    step_type: StepType::Action,
                    order: 0,
                    depends_on: vec![],
                    config: StepConfig {
                        coordination_strategy: None,
                        parallelism: 1,
                        timeout_s: 60,
                        retry: RetryPolicy::default(),
                        on_failure: OnFailure::Fail,
                    },
                    capability_filter: CapabilityFilter::default(),
                },
                WorkflowStep {
                    id: "s2".into(),
                    step_type: StepType::Action,
                    order: 1,
                    depends_on: vec!["s1".into()],
                    config: StepConfig {
                        coordination_strategy: None,
                        parallelism: 1,
                        timeout_s: 60,
                        retry: RetryPolicy::default(),
                        on_failure: OnFailure::Fail,
                    },
                    capability_filter: CapabilityFilter::default(),
                },
            ],
            status: WorkflowStatus::Active,
            input_schema: None,
            output_schema: None,
            max_concurrent_executions: 10,
            default_timeout_s: 3600,
            retry_policy: RetryPolicy::default(),
        }
    }

    #[test]
    fn validate_accepts_acyclic_dag() {
        assert!(simple_workflow().validate().is_ok());
    }

    #[test]
    fn validate_rejects_duplicate_step_ids() {
        let mut wf = simple_workflow();
        wf.steps[1].id = "s1".to_string();
        assert!(wf.validate().is_err());
    }

    #[test]
    fn validate_rejects_cycle() {
        let mut wf = simple_workflow();
        wf.steps[0].depends_on.push("s2".to_string());
        assert!(wf.validate().is_err());
    }

    #[test]
    fn validate_rejects_step_timeout_exceeding_workflow_timeout() {
        let mut wf = simple_workflow();
        wf.steps[0].config.timeout_s = 10_000;
        assert!(wf.validate().is_err());
    }

    #[test]
    fn ready_set_respects_dependencies() {
        let wf = simple_workflow();
        let completed = HashSet::new();
        let failed = HashSet::new();
        let skipped = HashSet::new();
        let ready = wf.ready_set(&completed, &failed, &skipped);
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].id, "s1");
    }

    #[test]
    fn execution_fsm_rejects_illegal_transition() {
        let mut exec = Execution::new("wf-1", HashMap::new());
        assert!(exec.transition(ExecutionStatus::Completed).is_err());
        exec.transition(ExecutionStatus::Running).unwrap();
        exec.transition(ExecutionStatus::Completed).unwrap();
        assert_eq!(exec.status, ExecutionStatus::Completed);
    }

    #[test]
    fn cancel_is_idempotent() {
        let mut exec = Execution::new("wf-1", HashMap::new());
        exec.transition(ExecutionStatus::Running).unwrap();
        exec.transition(ExecutionStatus::Cancelled).unwrap();
        exec.transition(ExecutionStatus::Cancelled).unwrap();
        assert_eq!(exec.status, ExecutionStatus::Cancelled);
    }

    #[test]
    fn invariants_reject_overlapping_sets() {
        let mut exec = Execution::new("wf-1", HashMap::new());
        exec.completed_steps.insert("s1".to_string());
        exec.failed_steps.insert("s1".to_string());
        assert!(exec.check_set_invariants().is_err());
    }
}
