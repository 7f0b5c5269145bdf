//! `swarmctl apply -f <file>`: validates a workflow or agent-pool YAML
//! document and copies it into the resources directory so `execute` and
//! `serve` pick it up on their next bootstrap (kubectl's `apply` without a
//! cluster to talk to: there is no separate running API server unless the
//! caller has one of their own `serve` processes up).

use anyhow::{Context, Result};

use crate::output::ConsoleOutput;
use crate::runtime::{resource_destination, sniff_resource_kind, ResourceKind};

pub fn execute(file: &str, resources_dir: &str, out: &ConsoleOutput) -> Result<()> {
    let raw = std::fs::read_to_string(file).with_context(|| format!("reading {file}"))?;
    let kind = sniff_resource_kind(&raw)?;

    std::fs::create_dir_all(resources_dir).with_context(|| format!("creating {resources_dir}"))?;
    let dest = resource_destination(resources_dir, file, kind);
    std::fs::write(&dest, &raw).with_context(|| format!("writing {}", dest.display()))?;

    let label = match kind {
        ResourceKind::Workflow => "workflow",
        ResourceKind::Pool => "agent pool",
    };
    out.print_success(&format!("applied {label} {} -> {}", file, dest.display()));
    Ok(())
}
