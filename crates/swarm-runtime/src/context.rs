//! The in-memory Execution Context (§3 "Ownership": "The Engine exclusively
//! owns the Execution and the in-memory Execution Context"). Wraps an
//! [`swarm_core::Execution`]'s variable bag with the merge/project helpers
//! the coordinator's strategies need, and the snapshot helper that
//! produces immutable input for agents (§5 "Shared-resource policy":
//! "agents receive immutable input snapshots").

use std::collections::HashMap;

use serde_json::Value;
use swarm_core::Execution;

#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub execution: Execution,
}

impl ExecutionContext {
    pub fn new(execution: Execution) -> Self {
        Self { execution }
    }

    /// An immutable snapshot of the current variable bag, safe to hand to
    /// an agent as task input.
    pub fn variables_snapshot(&self) -> Value {
        Value::Object(
            self.execution
                .input_variables
                .iter()
                .chain(
                    self.execution
                        .step_results
                        .iter()
                        .map(|(k, v)| (k, v)),
                )
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    /// Merges a step's output into the context. Used by Pipeline (§4.4.3):
    /// dict outputs merge by key, scalars land under `stage_i_output`.
    pub fn merge_step_output(&mut self, stage_index: usize, output: Value) {
        match output {
            Value::Object(map) => {
                for (k, v) in map {
                    self.execution.step_results.insert(k, v);
                }
            }
            other => {
                self.execution
                    .step_results
                    .insert(format!("stage_{stage_index}_output"), other);
            }
        }
    }

    /// Records a sequential member's result under `agent_i_result`, visible
    /// to the next agent in selection order (§4.4.2 "Sequential").
    pub fn set_agent_result(&mut self, index: usize, value: Value) {
        self.execution
            .step_results
            .insert(format!("agent_{index}_result"), value);
    }

    pub fn set_output_variables(&mut self, vars: HashMap<String, Value>) {
        self.execution.output_variables = vars;
    }
}
