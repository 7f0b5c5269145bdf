//! Multi-Agent Coordinator (C4, §4.4): selects agents for a step via the
//! matcher, creates a [`CoordinationGroup`], and drives one of the
//! coordination strategies to completion.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use swarm_core::{
    AgentPoolEntry, Algorithm, CapabilityFilter, CapabilityMatcher, CapabilityRegistry,
    CoordinationGroup, CoordinationStrategy, MatchingContext, SwarmError, SwarmResult, TaskStatus,
    WorkflowStep,
};

use crate::agents::AgentDirectory;
use crate::context::ExecutionContext;
use crate::executor::StepExecutor;

/// Whether agent selection prefers lower `active_tasks / (performance + 0.1)`
/// among equally-qualified candidates (§4.4 "Load-balancing bias").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionBias {
    #[default]
    None,
    LoadBalanced,
}

/// Grace period after a cancellation signal before a non-terminal task is
/// force-marked Failed with reason "cancelled" (§4.4 "Task lifecycle").
const DEFAULT_CANCEL_GRACE: Duration = Duration::from_secs(5);

pub struct Coordinator {
    registry: Arc<CapabilityRegistry>,
    matcher: Arc<CapabilityMatcher>,
    agents: Arc<AgentDirectory>,
    executor: Arc<StepExecutor>,
    cancel_grace: Duration,
}

/// One member's dispatch outcome, used internally to assemble the
/// strategy-shaped result value.
struct MemberOutcome {
    agent_id: String,
    result: Result<Value, SwarmError>,
}

impl Coordinator {
    pub fn new(
        registry: Arc<CapabilityRegistry>,
        matcher: Arc<CapabilityMatcher>,
        agents: Arc<AgentDirectory>,
        executor: Arc<StepExecutor>,
    ) -> Self {
        Self {
            registry,
            matcher,
            agents,
            executor,
            cancel_grace: DEFAULT_CANCEL_GRACE,
        }
    }

    pub fn with_cancel_grace(mut self, grace: Duration) -> Self {
        self.cancel_grace = grace;
        self
    }

    /// Selects `min(max(required_count,1), max_count, available_count)`
    /// agents via the matcher, ranked, optionally load-balanced (§4.4
    /// "Agent selection").
    fn select_agents(
        &self,
        filter: &CapabilityFilter,
        ctx: &MatchingContext,
        algorithm: Algorithm,
        required_count: u32,
        max_count: u32,
        bias: SelectionBias,
    ) -> SwarmResult<Vec<AgentPoolEntry>> {
        let snapshot = self.registry.list(None);
        let ranked = self
            .matcher
            .rank(&snapshot, filter, ctx, algorithm, snapshot.len().max(1))?;
        let mut viable: Vec<AgentPoolEntry> = ranked
            .into_iter()
            .filter(|r| r.is_viable())
            .filter_map(|r| self.registry.get(&r.agent_id))
            .collect();

        if bias == SelectionBias::LoadBalanced {
            viable.sort_by(|a, b| {
                let score_a = a.current_load as f64 / (a.scheduling.cost_per_execution.max(0.0) + 0.1);
                let score_b = b.current_load as f64 / (b.scheduling.cost_per_execution.max(0.0) + 0.1);
                score_a.partial_cmp(&score_b).unwrap_or(std::cmp::Ordering::Equal)
            });
        }

        let take = (required_count.max(1) as usize)
            .min(max_count as usize)
            .min(viable.len());
        if take == 0 {
            return Err(SwarmError::no_agents("no viable agents matched the step's capability filter"));
        }
        viable.truncate(take);
        Ok(viable)
    }

    /// Drives `strategy` for `step` over the selected agent pool, returning
    /// the strategy-shaped JSON result (§4.4).
    #[allow(clippy::too_many_arguments)]
    pub async fn coordinate(
        &self,
        step: &WorkflowStep,
        strategy: CoordinationStrategy,
        input: Value,
        ctx: &MatchingContext,
        algorithm: Algorithm,
        max_count: u32,
        bias: SelectionBias,
        exec_ctx: &mut ExecutionContext,
        cancel: CancellationToken,
    ) -> SwarmResult<Value> {
        let required_count = step.config.parallelism.max(1);
        let selected = self.select_agents(
            &step.capability_filter,
            ctx,
            algorithm,
            required_count,
            max_count,
            bias,
        )?;

        let mut group = CoordinationGroup::new(strategy, selected.iter().map(|a| a.id.clone()).collect());
        debug!(step_id = %step.id, group_id = %group.id, strategy = ?strategy, members = selected.len(), "coordination group created");

        let result = match strategy {
            CoordinationStrategy::Parallel => self.run_parallel(step, &selected, input, &mut group, &cancel).await,
            CoordinationStrategy::Sequential => {
                self.run_sequential(step, &selected, input, &mut group, exec_ctx, &cancel).await
            }
            CoordinationStrategy::Pipeline => {
                self.run_pipeline(step, &selected, input, &mut group, exec_ctx, &cancel).await
            }
            CoordinationStrategy::ScatterGather => self.run_scatter_gather(step, &selected, input, &mut group, &cancel).await,
            CoordinationStrategy::Consensus => self.run_consensus(step, &selected, input, &mut group, &cancel).await,
            CoordinationStrategy::Hierarchical => self.run_hierarchical(step, &selected, input, &mut group, &cancel).await,
            CoordinationStrategy::Adaptive => {
                // Not required for a minimal implementation (§4.4.7); fall
                // back to Parallel, the strategy Adaptive would pick under
                // no load/deadline pressure.
                self.run_parallel(step, &selected, input, &mut group, &cancel).await
            }
        };

        if cancel.is_cancelled() {
            group.cancel("cancelled");
        }
        result
    }

    async fn dispatch_one(&self, step: &WorkflowStep, entry: &AgentPoolEntry, input: Value) -> MemberOutcome {
        let result = match self.agents.get(&entry.id) {
            Ok(agent) => self
                .executor
                .execute_step(step, &agent, entry, input, Value::Null, step.config.timeout_s, None)
                .await
                .map_err(|f| f.error),
            Err(e) => Err(e),
        };
        MemberOutcome {
            agent_id: entry.id.clone(),
            result,
        }
    }

    async fn dispatch_all_parallel(
        &self,
        step: &WorkflowStep,
        agents: &[AgentPoolEntry],
        input: Value,
        cancel: &CancellationToken,
    ) -> Vec<MemberOutcome> {
        let futures = agents.iter().map(|a| {
            let input = input.clone();
            async move {
                tokio::select! {
                    outcome = self.dispatch_one(step, a, input) => outcome,
                    _ = cancel.cancelled() => MemberOutcome {
                        agent_id: a.id.clone(),
                        result: Err(SwarmError::cancelled(format!("agent {} cancelled", a.id))),
                    },
                }
            }
        });
        join_all(futures).await
    }

    async fn run_parallel(
        &self,
        step: &WorkflowStep,
        agents: &[AgentPoolEntry],
        input: Value,
        group: &mut CoordinationGroup,
        cancel: &CancellationToken,
    ) -> SwarmResult<Value> {
        let outcomes = self.dispatch_all_parallel(step, agents, input, cancel).await;
        let mut results = Vec::new();
        let mut errors = Vec::new();
        for outcome in outcomes {
            record_outcome(group, &outcome);
            match outcome.result {
                Ok(v) => results.push(v),
                Err(e) => errors.push(json_error(&outcome.agent_id, &e)),
            }
        }
        let success_count = results.len();
        let total_count = agents.len();
        if success_count == 0 {
            return Err(SwarmError::internal("all agents failed in parallel dispatch"));
        }
        Ok(serde_json::json!({
            "results": results,
            "errors": errors,
            "success_count": success_count,
            "total_count": total_count,
        }))
    }

    async fn run_sequential(
        &self,
        step: &WorkflowStep,
        agents: &[AgentPoolEntry],
        input: Value,
        group: &mut CoordinationGroup,
        exec_ctx: &mut ExecutionContext,
        cancel: &CancellationToken,
    ) -> SwarmResult<Value> {
        let mut last = Value::Null;
        let mut augmented = as_object_or_wrap(&input);
        for (idx, agent) in agents.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(SwarmError::cancelled("step cancelled before sequential dispatch completed"));
            }
            let outcome = self.dispatch_one(step, agent, Value::Object(augmented.clone())).await;
            record_outcome(group, &outcome);
            match outcome.result {
                Ok(v) => {
                    exec_ctx.set_agent_result(idx, v.clone());
                    augmented.insert(format!("agent_{idx}_result"), v.clone());
                    last = v;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(last)
    }

    async fn run_pipeline(
        &self,
        step: &WorkflowStep,
        agents: &[AgentPoolEntry],
        input: Value,
        group: &mut CoordinationGroup,
        exec_ctx: &mut ExecutionContext,
        cancel: &CancellationToken,
    ) -> SwarmResult<Value> {
        let mut stage_input = input;
        for (idx, agent) in agents.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(SwarmError::cancelled("step cancelled before pipeline completed"));
            }
            let outcome = self.dispatch_one(step, agent, stage_input.clone()).await;
            record_outcome(group, &outcome);
            match outcome.result {
                Ok(v) => {
                    exec_ctx.merge_step_output(idx, v.clone());
                    stage_input = v;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(stage_input)
    }

    async fn run_scatter_gather(
        &self,
        step: &WorkflowStep,
        agents: &[AgentPoolEntry],
        input: Value,
        group: &mut CoordinationGroup,
        cancel: &CancellationToken,
    ) -> SwarmResult<Value> {
        let chunks = split_into_chunks(&input, agents.len().max(1));
        let futures = agents.iter().zip(chunks.into_iter()).map(|(a, chunk)| {
            let chunk = chunk.clone();
            async move {
                tokio::select! {
                    outcome = self.dispatch_one(step, a, chunk) => outcome,
                    _ = cancel.cancelled() => MemberOutcome {
                        agent_id: a.id.clone(),
                        result: Err(SwarmError::cancelled(format!("agent {} cancelled", a.id))),
                    },
                }
            }
        });
        let outcomes = join_all(futures).await;

        let mut combined = Vec::new();
        let mut successful = Vec::new();
        let mut merged = Map::new();
        for outcome in outcomes {
            record_outcome(group, &outcome);
            if let Ok(v) = &outcome.result {
                successful.push(v.clone());
                if let Value::Object(m) = v {
                    for (k, val) in m {
                        merged.insert(k.clone(), val.clone());
                    }
                }
            }
            combined.push(match &outcome.result {
                Ok(v) => v.clone(),
                Err(e) => json_error(&outcome.agent_id, e),
            });
        }
        Ok(serde_json::json!({
            "combined_results": combined,
            "successful_results": successful,
            "result_count": successful.len(),
            "merged_data": Value::Object(merged),
        }))
    }

    async fn run_consensus(
        &self,
        step: &WorkflowStep,
        agents: &[AgentPoolEntry],
        input: Value,
        group: &mut CoordinationGroup,
        cancel: &CancellationToken,
    ) -> SwarmResult<Value> {
        let outcomes = self.dispatch_all_parallel(step, agents, input, cancel).await;
        let mut individual = Vec::new();
        let mut tallies: Vec<(String, Vec<String>)> = Vec::new();
        let total = outcomes.len();
        let mut successes = 0usize;

        for outcome in &outcomes {
            record_outcome(group, outcome);
            individual.push(serde_json::json!({
                "agent_id": outcome.agent_id,
                "result": outcome.result.as_ref().ok(),
                "error": outcome.result.as_ref().err().map(|e| e.to_string()),
            }));
            if let Ok(v) = &outcome.result {
                successes += 1;
                let canonical = serde_json::to_string(v).unwrap_or_default();
                match tallies.iter_mut().find(|(key, _)| key == &canonical) {
                    Some((_, ids)) => ids.push(outcome.agent_id.clone()),
                    None => tallies.push((canonical, vec![outcome.agent_id.clone()])),
                }
            }
        }

        // Majority wins; ties break on lowest agent id among the tied
        // groups' members (§9 "Consensus with ties", resolved in
        // SPEC_FULL.md §D.1).
        let winner = tallies.iter().max_by(|(_, a), (_, b)| {
            a.len().cmp(&b.len()).then_with(|| {
                let min_a = a.iter().min().cloned().unwrap_or_default();
                let min_b = b.iter().min().cloned().unwrap_or_default();
                min_b.cmp(&min_a)
            })
        });

        let consensus_result = winner
            .map(|(canonical, _)| serde_json::from_str::<Value>(canonical).unwrap_or(Value::Null))
            .unwrap_or(Value::Null);
        let confidence = if total == 0 { 0.0 } else { successes as f64 / total as f64 };

        Ok(serde_json::json!({
            "consensus_result": consensus_result,
            "individual_results": individual,
            "consensus_confidence": confidence,
        }))
    }

    async fn run_hierarchical(
        &self,
        step: &WorkflowStep,
        agents: &[AgentPoolEntry],
        input: Value,
        group: &mut CoordinationGroup,
        cancel: &CancellationToken,
    ) -> SwarmResult<Value> {
        let (leader, workers) = agents
            .split_first()
            .ok_or_else(|| SwarmError::no_agents("hierarchical strategy requires at least one agent"))?;

        let worker_outcomes = self.dispatch_all_parallel(step, workers, input.clone(), cancel).await;
        let mut worker_results = Vec::new();
        for outcome in &worker_outcomes {
            record_outcome(group, outcome);
            if let Err(e) = &outcome.result {
                warn!(agent_id = %outcome.agent_id, error = %e, "hierarchical worker failed, continuing");
            }
            worker_results.push(serde_json::json!({
                "agent_id": outcome.agent_id,
                "result": outcome.result.as_ref().ok(),
                "error": outcome.result.as_ref().err().map(|e| e.to_string()),
            }));
        }

        let mut leader_input = match input {
            Value::Object(m) => m,
            other => {
                let mut m = Map::new();
                m.insert("input".to_string(), other);
                m
            }
        };
        leader_input.insert("worker_results".to_string(), Value::Array(worker_results));

        let leader_outcome = self
            .dispatch_one(step, leader, Value::Object(leader_input))
            .await;
        record_outcome(group, &leader_outcome);
        leader_outcome.result
    }
}

fn record_outcome(group: &mut CoordinationGroup, outcome: &MemberOutcome) {
    if let Some(task) = group.tasks.get_mut(&outcome.agent_id) {
        task.attempt_count += 1;
        match &outcome.result {
            Ok(v) => {
                task.status = TaskStatus::Completed;
                task.output = Some(v.clone());
            }
            Err(e) => {
                task.status = if matches!(e, SwarmError::TimedOut(_)) {
                    TaskStatus::TimedOut
                } else {
                    TaskStatus::Failed
                };
                task.error = Some(e.to_string());
            }
        }
    }
}

fn json_error(agent_id: &str, error: &SwarmError) -> Value {
    serde_json::json!({ "agent_id": agent_id, "error": error.to_string() })
}

/// Coerces a non-object input into `{"input": <value>}` so per-stage
/// `agent_i_result` keys can be merged in alongside it.
fn as_object_or_wrap(input: &Value) -> Map<String, Value> {
    match input {
        Value::Object(m) => m.clone(),
        other => {
            let mut m = Map::new();
            m.insert("input".to_string(), other.clone());
            m
        }
    }
}

/// Splits an object's keys into `n` near-equal chunks by insertion order
/// (§4.4 "Scatter-Gather"). A non-object input is handed to every chunk
/// unchanged — there's nothing to split.
fn split_into_chunks(input: &Value, n: usize) -> Vec<Value> {
    let map = match input {
        Value::Object(m) => m,
        other => return vec![other.clone(); n],
    };
    let keys: Vec<&String> = map.keys().collect();
    let chunk_size = (keys.len() as f64 / n as f64).ceil() as usize;
    let chunk_size = chunk_size.max(1);
    let mut chunks = Vec::with_capacity(n);
    for slice in keys.chunks(chunk_size) {
        let mut m = Map::new();
        for k in slice {
            m.insert((*k).clone(), map[*k].clone());
        }
        chunks.push(Value::Object(m));
    }
    while chunks.len() < n {
        chunks.push(Value::Object(Map::new()));
    }
    chunks
}
