//! `swarmctl get <workflows|agents|executions> [name]` (§6 `list_active`
//! plus the kubectl-style read surface the teacher's CLI exposes).

use anyhow::{anyhow, Result};
use comfy_table::{presets::UTF8_FULL, Table};

use crate::output::ConsoleOutput;
use crate::runtime::Runtime;

pub async fn execute(rt: &Runtime, resource_type: &str, name: Option<&str>, output: &str, out: &ConsoleOutput) -> Result<()> {
    match resource_type {
        "workflows" | "workflow" => print_workflows(rt, name, output),
        "agents" | "agent" => print_agents(rt, name, output),
        "executions" | "execution" => print_executions(rt, name, output),
        other => {
            out.print_error(&format!("unknown resource type {other:?} (expected workflows, agents, or executions)"));
            Err(anyhow!("unknown resource type {other}"))
        }
    }
}

fn print_workflows(rt: &Runtime, name: Option<&str>, output: &str) -> Result<()> {
    let workflows = if let Some(id) = name {
        vec![rt.engine.get_workflow(id)?]
    } else {
        // WorkflowEngine has no bulk listing beyond get_workflow/list_active
        // (§4.5 names no `list_workflows` operation); `get workflows` with
        // no name is only meaningful once at least one id is known.
        return Err(anyhow!("pass a workflow id: swarmctl get workflows <id>"));
    };

    match output {
        "json" => println!("{}", serde_json::to_string_pretty(&workflows)?),
        "yaml" => println!("{}", serde_yaml::to_string(&workflows)?),
        _ => {
            let mut table = Table::new();
            table.load_preset(UTF8_FULL).set_header(vec!["ID", "NAME", "TYPE", "STATUS", "STEPS"]);
            for w in &workflows {
                table.add_row(vec![
                    w.id.clone(),
                    w.name.clone(),
                    format!("{:?}", w.workflow_type),
                    format!("{:?}", w.status),
                    w.steps.len().to_string(),
                ]);
            }
            println!("{table}");
        }
    }
    Ok(())
}

fn print_agents(rt: &Runtime, name: Option<&str>, output: &str) -> Result<()> {
    let agents = if let Some(id) = name {
        rt.registry.get(id).into_iter().collect::<Vec<_>>()
    } else {
        rt.registry.list(None)
    };

    match output {
        "json" => println!("{}", serde_json::to_string_pretty(&agents)?),
        "yaml" => println!("{}", serde_yaml::to_string(&agents)?),
        _ => {
            let mut table = Table::new();
            table.load_preset(UTF8_FULL).set_header(vec!["ID", "TYPE", "HEALTH", "LOAD", "CAPACITY"]);
            for a in &agents {
                table.add_row(vec![
                    a.id.clone(),
                    a.agent_type.clone(),
                    format!("{:?}", a.health),
                    a.current_load.to_string(),
                    a.limits.max_concurrent.to_string(),
                ]);
            }
            println!("{table}");
        }
    }
    Ok(())
}

fn print_executions(rt: &Runtime, name: Option<&str>, output: &str) -> Result<()> {
    let executions = if let Some(id) = name {
        vec![rt.engine.get_execution(id)?]
    } else {
        rt.engine.list_active()
    };

    match output {
        "json" => println!("{}", serde_json::to_string_pretty(&executions)?),
        "yaml" => println!("{}", serde_yaml::to_string(&executions)?),
        _ => {
            let mut table = Table::new();
            table.load_preset(UTF8_FULL).set_header(vec!["ID", "WORKFLOW", "STATUS", "COMPLETED", "FAILED"]);
            for e in &executions {
                table.add_row(vec![
                    e.id.clone(),
                    e.workflow_id.clone(),
                    format!("{:?}", e.status),
                    e.completed_steps.len().to_string(),
                    e.failed_steps.len().to_string(),
                ]);
            }
            println!("{table}");
        }
    }
    Ok(())
}
