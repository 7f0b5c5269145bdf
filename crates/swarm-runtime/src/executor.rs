//! Step Executor (C3, §4.3): executes one step against one already-selected
//! agent, enforcing the effective timeout and the step's retry policy.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde_json::Value;
use tracing::{debug, warn};

use swarm_core::{Agent, AgentPoolEntry, RetryPolicy, SwarmError, SwarmResult, WorkflowStep};

/// `execute_step`'s final failure, carrying the detail the external
/// contract requires (§7 "Propagation"): kind, attempt count, last error.
#[derive(Debug, Clone)]
pub struct StepFailure {
    pub error: SwarmError,
    pub attempts: u32,
}

impl std::fmt::Display for StepFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (after {} attempt(s))", self.error, self.attempts)
    }
}

fn jittered(delay: Duration) -> Duration {
    let pct = rand::thread_rng().gen_range(-0.20..=0.20);
    let millis = (delay.as_millis() as f64) * (1.0 + pct);
    Duration::from_millis(millis.max(0.0) as u64)
}

fn effective_timeout_s(step_timeout_s: u64, workflow_timeout_s: u64, remaining_deadline_s: Option<u64>) -> u64 {
    let mut t = step_timeout_s.min(workflow_timeout_s);
    if let Some(d) = remaining_deadline_s {
        t = t.min(d);
    }
    t
}

pub struct StepExecutor;

impl Default for StepExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl StepExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Resolves tools, enforces the effective timeout, and applies the
    /// step's retry policy (§4.3). `config` is the step-specific
    /// configuration blob handed to the agent alongside `input`.
    pub async fn execute_step(
        &self,
        step: &WorkflowStep,
        agent: &Arc<dyn Agent>,
        agent_entry: &AgentPoolEntry,
        input: Value,
        config: Value,
        workflow_timeout_s: u64,
        remaining_deadline_s: Option<u64>,
    ) -> Result<Value, StepFailure> {
        for tool in &step.capability_filter.required_tools {
            if !agent_entry.has_tool(tool) {
                return Err(StepFailure {
                    error: SwarmError::precondition_failed(format!(
                        "agent {} missing required tool {tool}",
                        agent_entry.id
                    )),
                    attempts: 0,
                });
            }
        }

        let timeout_s = effective_timeout_s(step.config.timeout_s, workflow_timeout_s, remaining_deadline_s);
        if timeout_s == 0 {
            return Err(StepFailure {
                error: SwarmError::timed_out(format!("step {} timeout is zero", step.id)),
                attempts: 1,
            });
        }

        let step_type = serde_json::to_value(step.step_type)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| "Action".to_string());

        let retry: &RetryPolicy = &step.config.retry;
        let mut last_error = SwarmError::internal("no attempt made");
        let mut attempts_made = 0u32;

        for attempt in 1..=retry.max_attempts {
            debug!(step_id = %step.id, agent_id = %agent_entry.id, attempt, "dispatching step");
            attempts_made = attempt;
            let call = agent.execute_task(&step_type, input.clone(), config.clone(), timeout_s);
            let outcome = tokio::time::timeout(Duration::from_secs(timeout_s), call).await;

            let error = match outcome {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => e,
                Err(_elapsed) => SwarmError::timed_out(format!("step {} exceeded {timeout_s}s", step.id)),
            };

            let non_retriable = matches!(
                error,
                SwarmError::Validation(_) | SwarmError::PreconditionFailed(_) | SwarmError::Cancelled(_)
            );
            last_error = error;

            if non_retriable || attempt == retry.max_attempts {
                break;
            }

            warn!(step_id = %step.id, agent_id = %agent_entry.id, attempt, error = %last_error, "step attempt failed, retrying");
            tokio::time::sleep(jittered(retry.delay_for_attempt(attempt))).await;
        }

        Err(StepFailure {
            error: last_error,
            attempts: attempts_made,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use swarm_core::{Capability, WorkflowStep};

    struct FlakyAgent {
        id: String,
        fail_times: u32,
        calls: AtomicU32,
        terminal: SwarmError,
    }

    #[async_trait]
    impl Agent for FlakyAgent {
        async fn execute_task(&self, _step_type: &str, input: Value, _config: Value, _timeout_s: u64) -> SwarmResult<Value> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_times {
                Err(self.terminal.clone())
            } else {
                Ok(input)
            }
        }
        async fn health_check(&self) -> bool {
            true
        }
        fn id(&self) -> &str {
            &self.id
        }
        fn agent_type(&self) -> &str {
            "test"
        }
        fn name(&self) -> &str {
            "Flaky"
        }
        fn capabilities(&self) -> &[Capability] {
            &[]
        }
        fn tools(&self) -> &[String] {
            &[]
        }
    }

    fn step(timeout_s: u64) -> WorkflowStep {
        use swarm_core::{CapabilityFilter, OnFailure, RetryPolicy, StepConfig, StepType};
        WorkflowStep {
            id: "s1".into(),
            step_type: StepType::AgentTask,
            order: 0,
            depends_on: vec![],
            config: StepConfig {
                coordination_strategy: None,
                parallelism: 1,
                timeout_s,
                retry: RetryPolicy {
                    max_attempts: 3,
                    backoff_factor: 1.0,
                    base_delay_ms: 1,
                },
                on_failure: OnFailure::Fail,
            },
            capability_filter: CapabilityFilter::default(),
        }
    }

    #[tokio::test]
    async fn retries_transient_errors_then_succeeds() {
        let agent: Arc<dyn Agent> = Arc::new(FlakyAgent {
            id: "a1".into(),
            fail_times: 2,
            calls: AtomicU32::new(0),
            terminal: SwarmError::retriable("blip"),
        });
        let entry = AgentPoolEntry::new("a1", "test", "Flaky");
        let executor = StepExecutor::new();
        let result = executor
            .execute_step(&step(5), &agent, &entry, json!({"n": 1}), json!({}), 3600, None)
            .await
            .unwrap();
        assert_eq!(result, json!({"n": 1}));
    }

    #[tokio::test]
    async fn does_not_retry_validation_errors() {
        let agent: Arc<dyn Agent> = Arc::new(FlakyAgent {
            id: "a1".into(),
            fail_times: 10,
            calls: AtomicU32::new(0),
            terminal: SwarmError::validation("bad input"),
        });
        let entry = AgentPoolEntry::new("a1", "test", "Flaky");
        let executor = StepExecutor::new();
        let err = executor
            .execute_step(&step(5), &agent, &entry, json!({}), json!({}), 3600, None)
            .await
            .unwrap_err();
        assert_eq!(err.attempts, 1);
        assert!(matches!(err.error, SwarmError::Validation(_)));
        assert_eq!(agent.health_check().await, true);
    }

    #[tokio::test]
    async fn zero_timeout_fails_immediately() {
        let mut entry = AgentPoolEntry::new("a1", "test", "Flaky");
        entry.limits.max_concurrent = 1;
        let agent: Arc<dyn Agent> = Arc::new(FlakyAgent {
            id: "a1".into(),
            fail_times: 0,
            calls: AtomicU32::new(0),
            terminal: SwarmError::retriable("n/a"),
        });
        let executor = StepExecutor::new();
        let mut s = step(0);
        s.config.timeout_s = 0;
        let err = executor
            .execute_step(&s, &agent, &entry, json!({}), json!({}), 3600, None)
            .await
            .unwrap_err();
        assert!(matches!(err.error, SwarmError::TimedOut(_)));
    }

    #[tokio::test]
    async fn missing_tool_fails_precondition() {
        let mut s = step(5);
        s.capability_filter.required_tools = vec!["kubectl".to_string()];
        let entry = AgentPoolEntry::new("a1", "test", "Flaky");
        let agent: Arc<dyn Agent> = Arc::new(FlakyAgent {
            id: "a1".into(),
            fail_times: 0,
            calls: AtomicU32::new(0),
            terminal: SwarmError::retriable("n/a"),
        });
        let executor = StepExecutor::new();
        let err = executor
            .execute_step(&s, &agent, &entry, json!({}), json!({}), 3600, None)
            .await
            .unwrap_err();
        assert!(matches!(err.error, SwarmError::PreconditionFailed(_)));
        assert_eq!(err.attempts, 0);
    }
}
