//! `swarmctl`: the external control surface for the workflow orchestration
//! engine (§6). Bootstraps a [`Runtime`] from `--config`/`--resources-dir`
//! and dispatches to the subcommand handlers under `commands/`.

mod agent;
mod cli;
mod commands;
mod filestore;
mod output;
mod runtime;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use output::ConsoleOutput;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("swarmctl=info".parse().unwrap()))
        .with_target(false)
        .init();

    let out = ConsoleOutput::new().quiet(cli.quiet);
    std::process::exit(run(cli, &out).await);
}

async fn run(cli: Cli, out: &ConsoleOutput) -> i32 {
    // `completion` and `apply` don't need a running engine; every other
    // verb bootstraps one from the resolved config and resources dir.
    let result = match &cli.command {
        Commands::Completion { shell } => commands::completion::execute(*shell).map_err(Into::into),
        Commands::Apply { file } => commands::apply::execute(file, &cli.resources_dir, out),
        other => dispatch_with_runtime(&cli, other, out).await,
    };

    match result {
        Ok(()) => 0,
        Err(err) => {
            out.print_error(&format!("{err}"));
            exit_code_for(&err)
        }
    }
}

async fn dispatch_with_runtime(cli: &Cli, command: &Commands, out: &ConsoleOutput) -> anyhow::Result<()> {
    let config = runtime::load_config(cli.config.as_deref())?;
    let rt = runtime::bootstrap(&config, &cli.resources_dir).await?;

    match command {
        Commands::Get { resource_type, name, output } => {
            commands::get::execute(&rt, resource_type, name.as_deref(), output, out).await
        }
        Commands::Execute { workflow_id, file, input, wait, output } => {
            commands::exec::execute(&rt, workflow_id, file.as_deref(), input, *wait, output, out).await
        }
        Commands::Pause { execution_id } => commands::exec::pause(&rt, execution_id, out).await,
        Commands::Resume { execution_id } => commands::exec::resume(&rt, execution_id, out).await,
        Commands::Cancel { execution_id } => commands::exec::cancel(&rt, execution_id, out).await,
        Commands::Restore { execution_id, checkpoint_id } => {
            commands::exec::restore(&rt, execution_id, checkpoint_id.as_deref(), out).await
        }
        Commands::Status { execution_id, output } => commands::exec::status(&rt, execution_id, output),
        Commands::Metrics { output } => commands::exec::metrics(&rt, output),
        Commands::ListActive { output } => commands::exec::list_active(&rt, output),
        Commands::Serve { workflow_id, input } => commands::serve::execute(&rt, workflow_id.as_deref(), input, out).await,
        Commands::Apply { .. } | Commands::Completion { .. } => unreachable!("handled before bootstrap"),
    }
}

/// Maps an error back through [`swarm_core::SwarmError`]'s exit-code
/// taxonomy (§6) when one is in the anyhow chain, else a generic failure.
fn exit_code_for(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<swarm_core::SwarmError>())
        .map(|e| e.exit_code())
        .unwrap_or(5)
}
