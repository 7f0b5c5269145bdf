//! swarm-core — data model, error taxonomy, agent contract, capability
//! registry and matcher (§3, §4.1, §4.2, §6, §7 of the orchestration spec).
//!
//! This crate performs no I/O: registry mutation is in-memory, the matcher
//! is pure scoring over snapshots. Execution (C3-C5), checkpointing (C6),
//! and metrics (C7) live in downstream crates that depend on these types.

pub mod agent;
pub mod capability;
pub mod checkpoint;
pub mod config;
pub mod coordination;
pub mod error;
pub mod matcher;
pub mod registry;
pub mod schema;
pub mod workflow;

pub use agent::{Agent, AgentPoolEntry, CapabilityMetrics, Health, ResourceLimits, SchedulingMetadata};
pub use capability::{
    Capability, CapabilityFilter, CapabilityType, Complexity, MatchResult, SubScores,
};
pub use checkpoint::{Checkpoint, CheckpointLevel, CheckpointState, MAX_CHECKPOINT_BYTES};
pub use config::SwarmConfig;
pub use coordination::{
    CoordinationGroup, CoordinationStrategy, GroupMessage, GroupState, TaskRecord, TaskStatus,
    GROUP_MESSAGE_QUEUE_CAPACITY,
};
pub use error::{SwarmError, SwarmResult};
pub use matcher::{Algorithm, CapabilityMatcher, MatchHistoryEntry, MatchingContext};
pub use registry::{CapabilityRegistry, ListFilter, RegistryStats, RegistryStatsSnapshot};
pub use schema::{InputSchema, OutputSchema};
pub use workflow::{
    Execution, ExecutionStatus, OnFailure, RetryPolicy, StepConfig, StepExecution,
    StepExecutionStatus, StepType, Workflow, WorkflowStatus, WorkflowStep, WorkflowType,
};

/// Crate version, surfaced by `swarmctl` in `--version` output.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default heartbeat TTL before stale eviction (§3 "Agent Pool Entry"),
/// used where a caller does not supply an explicit `SwarmConfig`.
pub const DEFAULT_HEARTBEAT_TTL_SECS: u64 = 300;
