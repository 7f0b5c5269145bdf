//! The narrow interfaces through which the engine (C5) subscribes to the
//! state manager (C6) for periodic checkpoints/restores and the
//! performance monitor (C7) for metric emission (§2 "Control flow"),
//! without `swarm-runtime` depending on either crate directly. `swarmctl`
//! supplies the concrete implementations (`swarm-state::StateManager`,
//! `swarm-monitor::Monitor`).

use async_trait::async_trait;
use swarm_core::{CheckpointLevel, Execution, SwarmResult};

#[async_trait]
pub trait StateBackend: Send + Sync {
    /// Persists a checkpoint at `level`, tagged with `trigger` (e.g.
    /// "execution_start", "pause", "periodic", "cancel"). Returns the new
    /// checkpoint id.
    async fn checkpoint(&self, execution: &Execution, level: CheckpointLevel, trigger: &str) -> SwarmResult<String>;

    /// Restores the closest checkpoint at or before `checkpoint_id` (or the
    /// latest, if `None`) into a runnable [`Execution`] (§4.6 "restore").
    async fn restore(&self, execution_id: &str, checkpoint_id: Option<&str>) -> SwarmResult<Execution>;
}

pub trait MetricsSink: Send + Sync {
    fn record_counter(&self, name: &str, value: f64, tags: &[(&str, &str)]);
    fn record_gauge(&self, name: &str, value: f64, tags: &[(&str, &str)]);
    fn record_timer(&self, name: &str, millis: f64, tags: &[(&str, &str)]);
}

/// Used where a caller runs the engine without wiring a real state manager
/// (unit tests, `swarmctl run` one-shot executions with `--no-checkpoint`).
pub struct NoopStateBackend;

#[async_trait]
impl StateBackend for NoopStateBackend {
    async fn checkpoint(&self, _execution: &Execution, _level: CheckpointLevel, _trigger: &str) -> SwarmResult<String> {
        Ok(String::new())
    }

    async fn restore(&self, execution_id: &str, _checkpoint_id: Option<&str>) -> SwarmResult<Execution> {
        Err(swarm_core::SwarmError::not_found(format!(
            "no checkpoints recorded for execution {execution_id}"
        )))
    }
}

pub struct NoopMetricsSink;

impl MetricsSink for NoopMetricsSink {
    fn record_counter(&self, _name: &str, _value: f64, _tags: &[(&str, &str)]) {}
    fn record_gauge(&self, _name: &str, _value: f64, _tags: &[(&str, &str)]) {}
    fn record_timer(&self, _name: &str, _millis: f64, _tags: &[(&str, &str)]) {}
}
