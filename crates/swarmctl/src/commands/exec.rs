//! The execution-lifecycle half of the external control surface (§6):
//! `execute`, `pause`, `resume`, `cancel`, `restore`, `status`, `metrics`,
//! `list_active`. Each of these bootstraps its own in-process [`Runtime`],
//! so lifecycle calls only see executions created earlier in the *same*
//! process — sequencing `execute` then `pause` against the same execution
//! requires `swarmctl serve`, which keeps one engine alive across calls.

use std::collections::HashMap;

use anyhow::{anyhow, Result};
use comfy_table::{presets::UTF8_FULL, Table};
use serde_json::Value;

use crate::output::ConsoleOutput;
use crate::runtime::{register_workflow_file, Runtime};

fn parse_input(raw: &str) -> Result<HashMap<String, Value>> {
    match serde_json::from_str::<Value>(raw)? {
        Value::Object(map) => Ok(map.into_iter().collect()),
        Value::Null => Ok(HashMap::new()),
        other => Err(anyhow!("--input must be a JSON object, got {other}")),
    }
}

pub async fn execute(
    rt: &Runtime,
    workflow_id: &str,
    file: Option<&str>,
    input: &str,
    wait: bool,
    output: &str,
    out: &ConsoleOutput,
) -> Result<()> {
    if let Some(path) = file {
        register_workflow_file(std::path::Path::new(path), &rt.engine)?;
    }
    let vars = parse_input(input)?;

    if wait {
        let execution = rt.engine.execute(workflow_id, vars).await?;
        print_execution(&execution, output)
    } else {
        let execution_id = rt.engine.submit(workflow_id, vars).await?;
        out.print_success(&format!("execution {execution_id} submitted"));
        Ok(())
    }
}

pub async fn pause(rt: &Runtime, execution_id: &str, out: &ConsoleOutput) -> Result<()> {
    rt.engine.pause(execution_id).await?;
    out.print_success(&format!("execution {execution_id} paused"));
    Ok(())
}

pub async fn resume(rt: &Runtime, execution_id: &str, out: &ConsoleOutput) -> Result<()> {
    rt.engine.resume(execution_id).await?;
    out.print_success(&format!("execution {execution_id} resumed"));
    Ok(())
}

pub async fn cancel(rt: &Runtime, execution_id: &str, out: &ConsoleOutput) -> Result<()> {
    rt.engine.cancel(execution_id).await?;
    out.print_success(&format!("execution {execution_id} cancelled"));
    Ok(())
}

pub async fn restore(rt: &Runtime, execution_id: &str, checkpoint_id: Option<&str>, out: &ConsoleOutput) -> Result<()> {
    let restored_id = rt.engine.restore(execution_id, checkpoint_id).await?;
    out.print_success(&format!("execution {restored_id} restored and resumed"));
    Ok(())
}

pub fn status(rt: &Runtime, execution_id: &str, output: &str) -> Result<()> {
    let execution = rt.engine.get_execution(execution_id)?;
    print_execution(&execution, output)
}

pub fn list_active(rt: &Runtime, output: &str) -> Result<()> {
    let active = rt.engine.list_active();
    match output {
        "json" => println!("{}", serde_json::to_string_pretty(&active)?),
        "yaml" => println!("{}", serde_yaml::to_string(&active)?),
        _ => {
            let mut table = Table::new();
            table.load_preset(UTF8_FULL).set_header(vec!["ID", "WORKFLOW", "STATUS"]);
            for e in &active {
                table.add_row(vec![e.id.clone(), e.workflow_id.clone(), format!("{:?}", e.status)]);
            }
            println!("{table}");
        }
    }
    Ok(())
}

pub fn metrics(rt: &Runtime, output: &str) -> Result<()> {
    let alerts = rt.monitor.active_alerts();
    let health = rt.monitor.health_score(0.0);
    let registry_stats = rt.registry.stats();

    match output {
        "json" => {
            let body = serde_json::json!({
                "health_score": health,
                "active_alerts": alerts,
                "registry": {
                    "registered_total": registry_stats.registered_total,
                    "heartbeats_total": registry_stats.heartbeats_total,
                    "stale_evictions_total": registry_stats.stale_evictions_total,
                },
            });
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        "yaml" => {
            let body = serde_json::json!({
                "health_score": health,
                "active_alerts": alerts,
            });
            println!("{}", serde_yaml::to_string(&body)?);
        }
        _ => {
            println!("system health score: {health}/100");
            println!("agents registered: {}", registry_stats.registered_total);
            println!("heartbeats received: {}", registry_stats.heartbeats_total);
            println!("stale evictions: {}", registry_stats.stale_evictions_total);
            println!("active alerts: {}", alerts.len());
            for alert in &alerts {
                println!("  - [{:?}] {}", alert.severity, alert.message);
            }
        }
    }
    Ok(())
}

fn print_execution(execution: &swarm_core::Execution, output: &str) -> Result<()> {
    match output {
        "json" => println!("{}", serde_json::to_string_pretty(execution)?),
        "yaml" => println!("{}", serde_yaml::to_string(execution)?),
        _ => {
            println!("execution:  {}", execution.id);
            println!("workflow:   {}", execution.workflow_id);
            println!("status:     {:?}", execution.status);
            println!("completed:  {}", execution.completed_steps.len());
            println!("failed:     {}", execution.failed_steps.len());
            if let Some(error) = &execution.error {
                println!("error:      {error}");
            }
        }
    }
    Ok(())
}
