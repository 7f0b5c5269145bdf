//! Checkpoint data model (§3 "Checkpoint", §4.6): a durable snapshot of an
//! execution's state at a point in time, at one of four payload levels. The
//! state manager (C6, `swarm-state`) owns storage, eviction, and integrity
//! verification; this module defines the shape it persists.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{SwarmError, SwarmResult};

/// How much of an execution's state a checkpoint captures. Ordered from
/// least to most expensive to create and restore (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointLevel {
    /// Execution status and current_step_id only.
    Minimal,
    /// Minimal plus variables and completed/failed/skipped step sets.
    Standard,
    /// Standard plus per-step results and durations.
    Comprehensive,
    /// Comprehensive plus the coordination groups active at the time.
    Debug,
}

/// The fields a checkpoint captures at each level, serialised as the
/// `state` payload. Fields absent at a given level are `None`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckpointState {
    pub status: String,
    pub current_step_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_variables: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_variables: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_steps: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_steps: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped_steps: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_results: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_durations_ms: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub coordination_groups: Option<Value>,
}

/// A durable snapshot of one execution's state (§3 "Checkpoint").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: String,
    pub execution_id: String,
    pub level: CheckpointLevel,
    pub created_at: DateTime<Utc>,
    pub state: CheckpointState,
    /// FNV-1a hex digest of the canonical JSON encoding of `state`, used to
    /// detect corruption on restore.
    pub content_hash: String,
    pub size_bytes: u64,
}

/// Checkpoints above this size are rejected outright rather than silently
/// accepted and evicted on first access (resolved open question, see
/// SPEC_FULL.md §D — matches the assumed per-entry cache ceiling).
pub const MAX_CHECKPOINT_BYTES: u64 = 16 * 1024 * 1024;

impl Checkpoint {
    pub fn new(execution_id: impl Into<String>, level: CheckpointLevel, state: CheckpointState) -> SwarmResult<Self> {
        let encoded = serde_json::to_vec(&state)?;
        let size_bytes = encoded.len() as u64;
        if size_bytes > MAX_CHECKPOINT_BYTES {
            return Err(SwarmError::validation(format!(
                "checkpoint size {size_bytes} exceeds max {MAX_CHECKPOINT_BYTES} bytes"
            )));
        }
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            execution_id: execution_id.into(),
            level,
            created_at: Utc::now(),
            content_hash: content_hash(&encoded),
            state,
            size_bytes,
        })
    }

    /// Recomputes the content hash over the current `state` and compares it
    /// against the stored one, detecting on-disk corruption or tampering.
    pub fn verify_integrity(&self) -> SwarmResult<()> {
        let encoded = serde_json::to_vec(&self.state)?;
        let actual = content_hash(&encoded);
        if actual != self.content_hash {
            return Err(SwarmError::integrity(format!(
                "checkpoint {} content hash mismatch: expected {}, got {actual}",
                self.id, self.content_hash
            )));
        }
        Ok(())
    }
}

fn content_hash(bytes: &[u8]) -> String {
    // FNV-1a 64-bit: no external hashing crate in the teacher's dependency
    // stack, and this only needs to detect accidental corruption, not resist
    // a deliberate adversary.
    let mut hash: u64 = 0xcbf29ce484222325;
    for b in bytes {
        hash ^= *b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    format!("{hash:016x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_checkpoint_passes_its_own_integrity_check() {
        let cp = Checkpoint::new(
            "exec-1",
            CheckpointLevel::Minimal,
            CheckpointState {
                status: "Running".into(),
                current_step_id: Some("step-1".into()),
                ..Default::default()
            },
        )
        .unwrap();
        assert!(cp.verify_integrity().is_ok());
    }

    #[test]
    fn tampered_state_fails_integrity_check() {
        let mut cp = Checkpoint::new(
            "exec-1",
            CheckpointLevel::Minimal,
            CheckpointState {
                status: "Running".into(),
                ..Default::default()
            },
        )
        .unwrap();
        cp.state.status = "Completed".into();
        assert!(matches!(cp.verify_integrity(), Err(SwarmError::Integrity(_))));
    }

    #[test]
    fn levels_order_least_to_most_expensive() {
        assert!(CheckpointLevel::Minimal < CheckpointLevel::Standard);
        assert!(CheckpointLevel::Standard < CheckpointLevel::Comprehensive);
        assert!(CheckpointLevel::Comprehensive < CheckpointLevel::Debug);
    }

    #[test]
    fn oversized_state_is_rejected() {
        let huge = CheckpointState {
            status: "Running".into(),
            step_results: Some(Value::String("x".repeat(17 * 1024 * 1024))),
            ..Default::default()
        };
        assert!(Checkpoint::new("exec-1", CheckpointLevel::Comprehensive, huge).is_err());
    }
}
