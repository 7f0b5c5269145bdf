//! Workflow Engine (C5, §4.5): owns execution lifecycles, walks a
//! workflow's step graph, and dispatches ready steps via the step executor
//! (C3) or the multi-agent coordinator (C4).

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use swarm_core::{
    AgentPoolEntry, Algorithm, CapabilityFilter, CapabilityMatcher, CapabilityRegistry,
    CheckpointLevel, Execution, ExecutionStatus, MatchingContext, OnFailure, SwarmError,
    SwarmResult, Workflow, WorkflowStatus, WorkflowStep, WorkflowType,
};

use crate::agents::AgentDirectory;
use crate::context::ExecutionContext;
use crate::coordinator::{Coordinator, SelectionBias};
use crate::executor::StepExecutor;
use crate::hooks::{MetricsSink, NoopMetricsSink, NoopStateBackend, StateBackend};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub max_concurrent_workflows: u32,
    pub checkpoint_interval_s: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_workflows: 10,
            checkpoint_interval_s: 60,
        }
    }
}

struct ExecutionControl {
    cancel: CancellationToken,
    paused: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

pub struct WorkflowEngine {
    workflows: DashMap<String, Workflow>,
    executions: Arc<DashMap<String, Execution>>,
    controls: DashMap<String, ExecutionControl>,
    registry: Arc<CapabilityRegistry>,
    matcher: Arc<CapabilityMatcher>,
    agents: Arc<AgentDirectory>,
    coordinator: Arc<Coordinator>,
    executor: Arc<StepExecutor>,
    state: Arc<dyn StateBackend>,
    metrics: Arc<dyn MetricsSink>,
    config: EngineConfig,
    active: Arc<AtomicU32>,
}

impl WorkflowEngine {
    pub fn new(
        registry: Arc<CapabilityRegistry>,
        matcher: Arc<CapabilityMatcher>,
        agents: Arc<AgentDirectory>,
        config: EngineConfig,
    ) -> Self {
        let executor = Arc::new(StepExecutor::new());
        let coordinator = Arc::new(Coordinator::new(
            registry.clone(),
            matcher.clone(),
            agents.clone(),
            executor.clone(),
        ));
        Self {
            workflows: DashMap::new(),
            executions: Arc::new(DashMap::new()),
            controls: DashMap::new(),
            registry,
            matcher,
            agents,
            coordinator,
            executor,
            state: Arc::new(NoopStateBackend),
            metrics: Arc::new(NoopMetricsSink),
            config,
            active: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn with_state_backend(mut self, backend: Arc<dyn StateBackend>) -> Self {
        self.state = backend;
        self
    }

    pub fn with_metrics_sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.metrics = sink;
        self
    }

    pub fn register_workflow(&self, workflow: Workflow) -> SwarmResult<()> {
        workflow.validate()?;
        self.workflows.insert(workflow.id.clone(), workflow);
        Ok(())
    }

    pub fn get_workflow(&self, workflow_id: &str) -> SwarmResult<Workflow> {
        self.workflows
            .get(workflow_id)
            .map(|w| w.clone())
            .ok_or_else(|| SwarmError::not_found(format!("workflow {workflow_id}")))
    }

    pub fn get_execution(&self, execution_id: &str) -> SwarmResult<Execution> {
        self.executions
            .get(execution_id)
            .map(|e| e.clone())
            .ok_or_else(|| SwarmError::not_found(format!("execution {execution_id}")))
    }

    pub fn list_active(&self) -> Vec<Execution> {
        self.executions
            .iter()
            .filter(|e| !e.status.is_terminal())
            .map(|e| e.value().clone())
            .collect()
    }

    /// Admits the execution, snapshots it, and starts the driver in the
    /// background (§4.5 "execute"). Returns immediately with the new
    /// execution id.
    pub async fn submit(&self, workflow_id: &str, input: std::collections::HashMap<String, Value>) -> SwarmResult<String> {
        let workflow = self.get_workflow(workflow_id)?;
        if workflow.status != WorkflowStatus::Active {
            return Err(SwarmError::not_active(format!("workflow {workflow_id} is not Active")));
        }
        if self.active.load(Ordering::SeqCst) >= self.config.max_concurrent_workflows {
            return Err(SwarmError::overloaded("engine at max_concurrent_workflows capacity"));
        }

        let execution = Execution::new(workflow_id, input);
        let execution_id = execution.id.clone();
        self.state.checkpoint(&execution, CheckpointLevel::Standard, "execution_start").await?;
        self.executions.insert(execution_id.clone(), execution);
        self.active.fetch_add(1, Ordering::SeqCst);

        self.controls.insert(
            execution_id.clone(),
            ExecutionControl {
                cancel: CancellationToken::new(),
                paused: Arc::new(AtomicBool::new(false)),
                notify: Arc::new(Notify::new()),
            },
        );

        self.spawn_driver(execution_id.clone(), workflow);
        Ok(execution_id)
    }

    /// Convenience wrapper used by one-shot callers (the CLI's `run`
    /// command): submits, then blocks until the execution reaches a
    /// terminal state.
    pub async fn execute(&self, workflow_id: &str, input: std::collections::HashMap<String, Value>) -> SwarmResult<Execution> {
        let execution_id = self.submit(workflow_id, input).await?;
        self.await_completion(&execution_id).await
    }

    pub async fn await_completion(&self, execution_id: &str) -> SwarmResult<Execution> {
        loop {
            let execution = self.get_execution(execution_id)?;
            if execution.status.is_terminal() {
                return Ok(execution);
            }
            tokio::time::sleep(std::time::Duration::from_millis(25)).await;
        }
    }

    /// Stops dispatching new steps and forces a Standard checkpoint before
    /// transitioning Running -> Paused (§4.5 "pause"). In-flight step
    /// executions run to their terminal state.
    pub async fn pause(&self, execution_id: &str) -> SwarmResult<()> {
        let control = self
            .controls
            .get(execution_id)
            .ok_or_else(|| SwarmError::not_found(format!("execution {execution_id}")))?;
        control.paused.store(true, Ordering::SeqCst);
        drop(control);

        let mut execution = self
            .executions
            .get_mut(execution_id)
            .ok_or_else(|| SwarmError::not_found(format!("execution {execution_id}")))?;
        execution.transition(ExecutionStatus::Paused)?;
        let snapshot = execution.clone();
        drop(execution);
        self.state.checkpoint(&snapshot, CheckpointLevel::Standard, "pause").await?;
        Ok(())
    }

    pub async fn resume(&self, execution_id: &str) -> SwarmResult<()> {
        let control = self
            .controls
            .get(execution_id)
            .ok_or_else(|| SwarmError::not_found(format!("execution {execution_id}")))?;
        control.paused.store(false, Ordering::SeqCst);
        control.notify.notify_waiters();
        drop(control);

        let mut execution = self
            .executions
            .get_mut(execution_id)
            .ok_or_else(|| SwarmError::not_found(format!("execution {execution_id}")))?;
        execution.transition(ExecutionStatus::Running)?;
        let snapshot = execution.clone();
        drop(execution);
        self.state.checkpoint(&snapshot, CheckpointLevel::Standard, "resume").await?;
        Ok(())
    }

    /// Idempotent: cancelling an already-cancelled execution is a no-op
    /// (§8 "cancel(cancel(e)) = cancel(e)").
    pub async fn cancel(&self, execution_id: &str) -> SwarmResult<()> {
        if let Some(control) = self.controls.get(execution_id) {
            control.cancel.cancel();
            control.notify.notify_waiters();
        }
        let mut execution = self
            .executions
            .get_mut(execution_id)
            .ok_or_else(|| SwarmError::not_found(format!("execution {execution_id}")))?;
        if execution.status.is_terminal() {
            return Ok(());
        }
        execution.transition(ExecutionStatus::Cancelled)?;
        execution.ended_at = Some(chrono::Utc::now());
        let snapshot = execution.clone();
        drop(execution);
        self.state.checkpoint(&snapshot, CheckpointLevel::Comprehensive, "cancel").await?;
        Ok(())
    }

    /// Rebuilds the execution context from a checkpoint and resumes the
    /// driver (§4.5 "restore").
    pub async fn restore(&self, execution_id: &str, checkpoint_id: Option<&str>) -> SwarmResult<String> {
        let restored = self.state.restore(execution_id, checkpoint_id).await?;
        let workflow = self.get_workflow(&restored.workflow_id)?;
        self.executions.insert(execution_id.to_string(), restored);
        self.active.fetch_add(1, Ordering::SeqCst);
        self.controls.insert(
            execution_id.to_string(),
            ExecutionControl {
                cancel: CancellationToken::new(),
                paused: Arc::new(AtomicBool::new(false)),
                notify: Arc::new(Notify::new()),
            },
        );
        self.spawn_driver(execution_id.to_string(), workflow);
        Ok(execution_id.to_string())
    }

    fn spawn_driver(&self, execution_id: String, workflow: Workflow) {
        let executions = self.executions.clone();
        let registry = self.registry.clone();
        let matcher = self.matcher.clone();
        let agents = self.agents.clone();
        let coordinator = self.coordinator.clone();
        let executor = self.executor.clone();
        let state = self.state.clone();
        let metrics = self.metrics.clone();
        let active = self.active.clone();
        let checkpoint_interval_s = self.config.checkpoint_interval_s;

        // Clone the control handles the driver needs; Engine itself stays
        // accessible to callers for pause/resume/cancel concurrently.
        let cancel = self.controls.get(&execution_id).unwrap().cancel.clone();
        let paused = self.controls.get(&execution_id).unwrap().paused.clone();
        let notify = self.controls.get(&execution_id).unwrap().notify.clone();

        tokio::spawn(async move {
            let driver = Driver {
                workflow,
                executions,
                registry,
                matcher,
                agents,
                coordinator,
                executor,
                state,
                metrics,
                cancel,
                paused,
                notify,
                checkpoint_interval_s,
            };
            driver.run(execution_id).await;
            active.fetch_sub(1, Ordering::SeqCst);
        });
    }
}

struct Driver {
    workflow: Workflow,
    executions: Arc<DashMap<String, Execution>>,
    registry: Arc<CapabilityRegistry>,
    matcher: Arc<CapabilityMatcher>,
    agents: Arc<AgentDirectory>,
    coordinator: Arc<Coordinator>,
    executor: Arc<StepExecutor>,
    state: Arc<dyn StateBackend>,
    metrics: Arc<dyn MetricsSink>,
    cancel: CancellationToken,
    paused: Arc<AtomicBool>,
    notify: Arc<Notify>,
    checkpoint_interval_s: u64,
}

impl Driver {
    async fn run(&self, execution_id: String) {
        {
            let mut execution = self.executions.get_mut(&execution_id).unwrap();
            if execution.status == ExecutionStatus::Pending {
                let _ = execution.transition(ExecutionStatus::Running);
                execution.started_at = Some(chrono::Utc::now());
            }
        }

        let mut last_checkpoint = Instant::now();
        loop {
            if self.cancel.is_cancelled() {
                debug!(execution_id = %execution_id, "driver observed cancellation, stopping");
                return;
            }
            if self.paused.load(Ordering::SeqCst) {
                tokio::select! {
                    _ = self.notify.notified() => continue,
                    _ = self.cancel.cancelled() => return,
                }
            }

            let ready = {
                let execution = self.executions.get(&execution_id).unwrap();
                self.workflow
                    .ready_set(&execution.completed_steps, &execution.failed_steps, &execution.skipped_steps)
                    .into_iter()
                    .cloned()
                    .collect::<Vec<_>>()
            };

            if ready.is_empty() {
                let mut execution = self.executions.get_mut(&execution_id).unwrap();
                // A failed step only fails the whole execution if its own
                // on_failure policy says so (§4.5 "step failure policy");
                // on_failure=continue failures that left the rest of the
                // graph able to finish must not sink an otherwise-done run.
                let has_fatal_failure = execution.failed_steps.iter().any(|step_id| {
                    self.workflow
                        .steps
                        .iter()
                        .find(|s| &s.id == step_id)
                        .map(|s| s.config.on_failure == OnFailure::Fail)
                        .unwrap_or(false)
                });
                let terminal = if has_fatal_failure {
                    ExecutionStatus::Failed
                } else {
                    ExecutionStatus::Completed
                };
                if execution.transition(terminal).is_ok() {
                    execution.ended_at = Some(chrono::Utc::now());
                }
                let snapshot = execution.clone();
                drop(execution);
                let _ = self
                    .state
                    .checkpoint(&snapshot, CheckpointLevel::Comprehensive, "execution_end")
                    .await;
                self.metrics.record_counter(
                    "workflow.executions_completed",
                    1.0,
                    &[("status", if terminal == ExecutionStatus::Completed { "completed" } else { "failed" })],
                );
                return;
            }

            let batch = match self.workflow.workflow_type {
                WorkflowType::Sequential | WorkflowType::Pipeline => vec![ready[0].clone()],
                _ => {
                    let cap = self.workflow.max_concurrent_executions.max(1) as usize;
                    ready.into_iter().take(cap).collect()
                }
            };

            let mut fatal_failure = None;
            for step in &batch {
                if self.cancel.is_cancelled() {
                    return;
                }
                let start = Instant::now();
                let outcome = self.dispatch(&execution_id, step).await;
                let elapsed_ms = start.elapsed().as_millis() as u64;
                self.metrics.record_timer("workflow.step_duration_ms", elapsed_ms as f64, &[("step_id", step.id.as_str())]);

                let mut execution = self.executions.get_mut(&execution_id).unwrap();
                execution.step_durations_ms.insert(step.id.clone(), elapsed_ms);
                match outcome {
                    Ok(value) => {
                        execution.step_results.insert(step.id.clone(), value);
                        execution.completed_steps.insert(step.id.clone());
                    }
                    Err(error) => {
                        warn!(execution_id = %execution_id, step_id = %step.id, error = %error, "step failed permanently");
                        execution.failed_steps.insert(step.id.clone());
                        execution.error = Some(error.to_string());
                        if step.config.on_failure == OnFailure::Fail {
                            fatal_failure = Some(error);
                        }
                    }
                }
                drop(execution);

                if fatal_failure.is_some() {
                    break;
                }
            }

            if let Some(error) = fatal_failure {
                let mut execution = self.executions.get_mut(&execution_id).unwrap();
                let _ = execution.transition(ExecutionStatus::Failed);
                execution.error = Some(error.to_string());
                execution.ended_at = Some(chrono::Utc::now());
                let snapshot = execution.clone();
                drop(execution);
                let _ = self
                    .state
                    .checkpoint(&snapshot, CheckpointLevel::Comprehensive, "execution_failed")
                    .await;
                return;
            }

            if last_checkpoint.elapsed().as_secs() >= self.checkpoint_interval_s {
                let snapshot = self.executions.get(&execution_id).unwrap().clone();
                let _ = self.state.checkpoint(&snapshot, CheckpointLevel::Standard, "periodic").await;
                last_checkpoint = Instant::now();
            }
        }
    }

    async fn dispatch(&self, execution_id: &str, step: &WorkflowStep) -> Result<Value, SwarmError> {
        let input = {
            let execution = self.executions.get(execution_id).unwrap();
            ExecutionContext::new(execution.clone()).variables_snapshot()
        };
        let ctx = MatchingContext {
            step_count: self.workflow.steps.len(),
            estimated_duration_secs: 30.0,
            priority: 5,
            deadline: None,
            budget: None,
            prefer_reliable: false,
            allow_parallel: true,
            environment: None,
        };

        if let Some(strategy) = step.config.coordination_strategy {
            let mut exec_ctx = ExecutionContext::new(self.executions.get(execution_id).unwrap().clone());
            let result = self
                .coordinator
                .coordinate(
                    step,
                    strategy,
                    input,
                    &ctx,
                    Algorithm::WeightedScore,
                    step.config.parallelism.max(1),
                    SelectionBias::None,
                    &mut exec_ctx,
                    self.cancel.clone(),
                )
                .await?;
            let mut execution = self.executions.get_mut(execution_id).unwrap();
            for (k, v) in exec_ctx.execution.step_results {
                execution.step_results.entry(k).or_insert(v);
            }
            return Ok(result);
        }

        let agent_entry = self.select_single_agent(&step.capability_filter, &ctx)?;
        let agent = self.agents.get(&agent_entry.id)?;
        self.executor
            .execute_step(step, &agent, &agent_entry, input, Value::Null, self.workflow.default_timeout_s, None)
            .await
            .map_err(|f| f.error)
    }

    fn select_single_agent(&self, filter: &CapabilityFilter, ctx: &MatchingContext) -> SwarmResult<AgentPoolEntry> {
        let snapshot = self.registry.list(None);
        let ranked = self.matcher.rank(&snapshot, filter, ctx, Algorithm::WeightedScore, 1)?;
        ranked
            .into_iter()
            .find(|r| r.is_viable())
            .and_then(|r| self.registry.get(&r.agent_id))
            .ok_or_else(|| SwarmError::no_agents("no viable agent for step capability filter"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use swarm_core::{Capability, RetryPolicy, StepConfig, StepType};

    struct EchoAgent {
        id: String,
    }

    #[async_trait]
    impl swarm_core::Agent for EchoAgent {
        async fn execute_task(&self, _step_type: &str, input: Value, _config: Value, _timeout_s: u64) -> SwarmResult<Value> {
            Ok(input)
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
            "Echo"
        }
        fn capabilities(&self) -> &[Capability] {
            &[]
        }
        fn tools(&self) -> &[String] {
            &[]
        }
    }

    fn simple_step(id: &str, depends_on: Vec<&str>) -> WorkflowStep {
        WorkflowStep {
            id: id.to_string(),
            step_type: StepType::Action,
            order: 0,
            depends_on: depends_on.into_iter().map(String::from).collect(),
            config: StepConfig {
                coordination_strategy: None,
                parallelism: 1,
                timeout_s: 5,
                retry: RetryPolicy {
                    max_attempts: 1,
                    backoff_factor: 1.0,
                    base_delay_ms: 1,
                },
                on_failure: OnFailure::Fail,
            },
            capability_filter: CapabilityFilter::default(),
        }
    }

    fn engine_with_one_agent() -> (WorkflowEngine, Arc<AgentDirectory>) {
        let registry = Arc::new(CapabilityRegistry::new(std::time::Duration::from_secs(300)));
        let mut entry = AgentPoolEntry::new("a1", "code", "Agent One");
        entry.limits.max_concurrent = 5;
        registry.upsert(entry).unwrap();
        let agents = Arc::new(AgentDirectory::new());
        agents.register(Arc::new(EchoAgent { id: "a1".into() }));
        let engine = WorkflowEngine::new(registry, Arc::new(CapabilityMatcher::new()), agents.clone(), EngineConfig::default());
        (engine, agents)
    }

    #[tokio::test]
    async fn sequential_workflow_completes_all_steps() {
        let (engine, _agents) = engine_with_one_agent();
        let workflow = Workflow {
            id: "wf1".into(),
            name: "test".into(),
            workflow_type: WorkflowType::Sequential,
            steps: vec![simple_step("s1", vec![]), simple_step("s2", vec!["s1"])],
            status: WorkflowStatus::Active,
            input_schema: None,
            output_schema: None,
            max_concurrent_executions: 5,
            default_timeout_s: 60,
            retry_policy: RetryPolicy::default(),
        };
        engine.register_workflow(workflow).unwrap();
        let execution = engine.execute("wf1", std::collections::HashMap::new()).await.unwrap();
        assert_eq!(execution.status, ExecutionStatus::Completed);
        assert_eq!(execution.completed_steps.len(), 2);
    }

    #[tokio::test]
    async fn admission_control_rejects_when_overloaded() {
        let registry = Arc::new(CapabilityRegistry::new(std::time::Duration::from_secs(300)));
        let agents = Arc::new(AgentDirectory::new());
        let mut config = EngineConfig::default();
        config.max_concurrent_workflows = 0;
        let engine = WorkflowEngine::new(registry, Arc::new(CapabilityMatcher::new()), agents, config);
        let workflow = Workflow {
            id: "wf1".into(),
            name: "test".into(),
            workflow_type: WorkflowType::Sequential,
            steps: vec![],
            status: WorkflowStatus::Active,
            input_schema: None,
            output_schema: None,
            max_concurrent_executions: 5,
            default_timeout_s: 60,
            retry_policy: RetryPolicy::default(),
        };
        engine.register_workflow(workflow).unwrap();
        let err = engine.execute("wf1", std::collections::HashMap::new()).await.unwrap_err();
        assert!(matches!(err, SwarmError::Overloaded(_)));
    }

    #[tokio::test]
    async fn pause_then_resume_lets_remaining_steps_run_once() {
        let (engine, _agents) = engine_with_one_agent();
        let workflow = Workflow {
            id: "wf1".into(),
            name: "test".into(),
            workflow_type: WorkflowType::Sequential,
            steps: vec![
                simple_step("s1", vec![]),
                simple_step("s2", vec!["s1"]),
                simple_step("s3", vec!["s2"]),
            ],
            status: WorkflowStatus::Active,
            input_schema: None,
            output_schema: None,
            max_concurrent_executions: 5,
            default_timeout_s: 60,
            retry_policy: RetryPolicy::default(),
        };
        engine.register_workflow(workflow).unwrap();
        let execution_id = engine.submit("wf1", std::collections::HashMap::new()).await.unwrap();
        engine.pause(&execution_id).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        engine.resume(&execution_id).await.unwrap();
        let execution = engine.await_completion(&execution_id).await.unwrap();
        assert_eq!(execution.status, ExecutionStatus::Completed);
        assert_eq!(execution.completed_steps.len(), 3);
    }

    #[tokio::test]
    async fn on_failure_continue_does_not_fail_the_execution() {
        let (engine, _agents) = engine_with_one_agent();
        let mut unmatchable = simple_step("s1", vec![]);
        unmatchable.config.on_failure = OnFailure::Continue;
        unmatchable.capability_filter.required_tools = vec!["nonexistent-tool".into()];

        let workflow = Workflow {
            id: "wf1".into(),
            name: "test".into(),
            workflow_type: WorkflowType::Sequential,
            steps: vec![unmatchable, simple_step("s2", vec![])],
            status: WorkflowStatus::Active,
            input_schema: None,
            output_schema: None,
            max_concurrent_executions: 5,
            default_timeout_s: 60,
            retry_policy: RetryPolicy::default(),
        };
        engine.register_workflow(workflow).unwrap();
        let execution = engine.execute("wf1", std::collections::HashMap::new()).await.unwrap();
        assert_eq!(execution.status, ExecutionStatus::Completed);
        assert!(execution.failed_steps.contains("s1"));
        assert!(execution.completed_steps.contains("s2"));
    }

    #[tokio::test]
    async fn on_failure_fail_fails_the_execution() {
        let (engine, _agents) = engine_with_one_agent();
        let mut unmatchable = simple_step("s1", vec![]);
        unmatchable.capability_filter.required_tools = vec!["nonexistent-tool".into()];

        let workflow = Workflow {
            id: "wf1".into(),
            name: "test".into(),
            workflow_type: WorkflowType::Sequential,
            steps: vec![unmatchable],
            status: WorkflowStatus::Active,
            input_schema: None,
            output_schema: None,
            max_concurrent_executions: 5,
            default_timeout_s: 60,
            retry_policy: RetryPolicy::default(),
        };
        engine.register_workflow(workflow).unwrap();
        let execution = engine.execute("wf1", std::collections::HashMap::new()).await.unwrap();
        assert_eq!(execution.status, ExecutionStatus::Failed);
    }
}
