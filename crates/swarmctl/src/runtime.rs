//! Wires `swarm-core`, `swarm-runtime`, `swarm-state`, and `swarm-monitor`
//! into one running engine (§2 "Control flow"), and loads workflow/agent
//! pool definitions from the resources directory so `apply`/`execute`/
//! `serve` share one bootstrap path.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use swarm_core::{Agent, AgentPoolEntry, CapabilityMatcher, CapabilityRegistry, SwarmConfig, SwarmError, SwarmResult, Workflow};
use swarm_monitor::{Monitor, MonitorConfig};
use swarm_runtime::{AgentDirectory, EngineConfig, WorkflowEngine};
use swarm_state::{StateManager, StateManagerConfig};

use crate::agent::DemoAgent;
use crate::filestore::FilePersistenceStore;

/// Everything one `swarmctl` process needs to serve the external control
/// surface against a set of registered workflows and agents.
pub struct Runtime {
    pub engine: Arc<WorkflowEngine>,
    pub registry: Arc<CapabilityRegistry>,
    pub monitor: Arc<Monitor>,
}

/// Loads `SwarmConfig` from `path` if given, else the built-in defaults
/// (§6 "Configuration").
pub fn load_config(path: Option<&str>) -> SwarmResult<SwarmConfig> {
    match path {
        Some(p) => {
            let raw = std::fs::read_to_string(p).map_err(SwarmError::from)?;
            SwarmConfig::from_yaml(&raw)
        }
        None => Ok(SwarmConfig::default()),
    }
}

/// Builds a fresh engine backed by file-persisted checkpoints under
/// `<resources_dir>/.swarmctl-state`, then loads every `*.workflow.yaml`
/// and `*.pool.yaml` document in `resources_dir`.
pub async fn bootstrap(config: &SwarmConfig, resources_dir: &str) -> SwarmResult<Runtime> {
    let registry = Arc::new(CapabilityRegistry::new(Duration::from_secs(config.heartbeat_ttl_s)));
    let matcher = Arc::new(CapabilityMatcher::new());
    let agents = Arc::new(AgentDirectory::new());

    let state_dir = Path::new(resources_dir).join(".swarmctl-state");
    let store = Arc::new(FilePersistenceStore::new(state_dir)?);
    let state_manager = Arc::new(StateManager::new(
        store,
        StateManagerConfig {
            cache_size: config.cache_size,
            checkpoint_interval_s: config.checkpoint_interval_s,
        },
    ));

    let monitor = Arc::new(Monitor::new(MonitorConfig {
        retention_hours: config.metric_retention_h as i64,
        ..MonitorConfig::default()
    }));

    let engine = Arc::new(
        WorkflowEngine::new(
            registry.clone(),
            matcher,
            agents.clone(),
            EngineConfig {
                max_concurrent_workflows: config.max_concurrent_workflows,
                checkpoint_interval_s: config.checkpoint_interval_s,
            },
        )
        .with_state_backend(state_manager)
        .with_metrics_sink(monitor.clone()),
    );

    load_resources(resources_dir, &engine, &registry, &agents)?;

    Ok(Runtime { engine, registry, monitor })
}

fn load_resources(
    resources_dir: &str,
    engine: &Arc<WorkflowEngine>,
    registry: &Arc<CapabilityRegistry>,
    agents: &Arc<AgentDirectory>,
) -> SwarmResult<()> {
    let dir = Path::new(resources_dir);
    if !dir.is_dir() {
        return Ok(());
    }
    for entry in std::fs::read_dir(dir).map_err(SwarmError::from)? {
        let entry = entry.map_err(SwarmError::from)?;
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else { continue };
        if name.ends_with(".workflow.yaml") || name.ends_with(".workflow.yml") {
            register_workflow_file(&path, engine)?;
        } else if name.ends_with(".pool.yaml") || name.ends_with(".pool.yml") {
            register_pool_file(&path, registry, agents)?;
        }
    }
    Ok(())
}

pub fn register_workflow_file(path: &Path, engine: &Arc<WorkflowEngine>) -> SwarmResult<()> {
    let raw = std::fs::read_to_string(path).map_err(SwarmError::from)?;
    let workflow = Workflow::from_yaml(&raw)?;
    engine.register_workflow(workflow)
}

pub fn register_pool_file(path: &Path, registry: &Arc<CapabilityRegistry>, agents: &Arc<AgentDirectory>) -> SwarmResult<()> {
    let raw = std::fs::read_to_string(path).map_err(SwarmError::from)?;
    let entries: Vec<AgentPoolEntry> = serde_yaml::from_str(&raw)?;
    for entry in entries {
        let demo: Arc<dyn Agent> = Arc::new(DemoAgent::new(
            entry.id.clone(),
            entry.agent_type.clone(),
            entry.name.clone(),
            entry.capabilities.clone(),
            entry.tools.clone(),
        ));
        agents.register(demo);
        registry.upsert(entry)?;
    }
    Ok(())
}

/// A pool file path as a `PathBuf`, used by `apply` to copy a caller's
/// resource into `resources_dir` so subsequent `execute`/`serve`
/// invocations pick it up.
pub fn resource_destination(resources_dir: &str, source: &str, kind: ResourceKind) -> PathBuf {
    let stem = Path::new(source).file_stem().and_then(|s| s.to_str()).unwrap_or("resource");
    let suffix = match kind {
        ResourceKind::Workflow => "workflow.yaml",
        ResourceKind::Pool => "pool.yaml",
    };
    Path::new(resources_dir).join(format!("{stem}.{suffix}"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Workflow,
    Pool,
}

/// Sniffs whether a YAML document is a workflow or an agent pool by
/// attempting to parse each shape, matching the discriminated-by-shape
/// convention `apply`-style CLIs use when no `kind:` field is mandated.
pub fn sniff_resource_kind(raw: &str) -> SwarmResult<ResourceKind> {
    if Workflow::from_yaml(raw).is_ok() {
        return Ok(ResourceKind::Workflow);
    }
    if serde_yaml::from_str::<Vec<AgentPoolEntry>>(raw).is_ok() {
        return Ok(ResourceKind::Pool);
    }
    Err(SwarmError::validation(
        "file is neither a valid workflow document nor an agent-pool document",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniff_recognizes_workflow_documents() {
        let yaml = r#"
id: wf-1
name: demo
workflow_type: Sequential
status: Active
steps: []
"#;
        assert_eq!(sniff_resource_kind(yaml).unwrap(), ResourceKind::Workflow);
    }

    #[test]
    fn sniff_recognizes_pool_documents() {
        let yaml = r#"
- id: a1
  agent_type: demo
  name: Demo One
  current_load: 0
  health: Healthy
  last_heartbeat: "2026-01-01T00:00:00Z"
  uptime_start: "2026-01-01T00:00:00Z"
"#;
        assert_eq!(sniff_resource_kind(yaml).unwrap(), ResourceKind::Pool);
    }

    #[test]
    fn sniff_rejects_garbage() {
        assert!(sniff_resource_kind("not: [valid, for, either").is_err());
    }
}
