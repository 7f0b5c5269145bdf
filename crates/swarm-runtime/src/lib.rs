//! swarm-runtime — the step executor (C3), multi-agent coordinator (C4),
//! and workflow engine (C5) that together drive a workflow's step graph to
//! completion.
//!
//! This crate depends only on `swarm-core` for its data model; it reaches
//! the state manager (C6) and performance monitor (C7) only through the
//! [`hooks::StateBackend`] and [`hooks::MetricsSink`] traits so the three
//! subsystems stay independently testable and the crate graph stays
//! acyclic — `swarmctl` is what wires concrete implementations together.

pub mod agents;
pub mod context;
pub mod coordinator;
pub mod engine;
pub mod executor;
pub mod hooks;

pub use agents::AgentDirectory;
pub use context::ExecutionContext;
pub use coordinator::{Coordinator, SelectionBias};
pub use engine::{EngineConfig, WorkflowEngine};
pub use executor::StepExecutor;
pub use hooks::{MetricsSink, NoopMetricsSink, NoopStateBackend, StateBackend};
