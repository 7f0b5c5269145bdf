use clap::{Parser, Subcommand};

/// swarmctl - kubectl-style control surface for the workflow orchestration
/// engine (§6 "External control surface"): `execute`, `pause`, `resume`,
/// `cancel`, `restore`, `status`, `metrics`, `list_active`, plus `apply` to
/// register workflows/agent pools and `serve` to run the engine long-lived.
#[derive(Parser, Debug)]
#[command(name = "swarmctl")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to a SwarmConfig YAML file (falls back to built-in defaults).
    #[arg(long, short = 'c', global = true, env = "SWARMCTL_CONFIG")]
    pub config: Option<String>,

    /// Directory holding workflow and agent-pool YAML used by `apply`/`serve`.
    #[arg(long, global = true, env = "SWARMCTL_RESOURCES_DIR", default_value = ".")]
    pub resources_dir: String,

    /// Suppress non-essential output.
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Register a workflow definition or agent pool from a YAML file.
    Apply {
        /// Path to a workflow or agent-pool YAML document.
        #[arg(short, long)]
        file: String,
    },

    /// List workflows, agents, or executions known to a running `serve`
    /// instance's snapshot directory, or a one-shot in-process pool.
    Get {
        /// Resource type: workflows | agents | executions.
        resource_type: String,

        /// Narrow to a single id (optional).
        name: Option<String>,

        /// Output format: text | json | yaml.
        #[arg(short, long, default_value = "text")]
        output: String,
    },

    /// Execute a workflow (§4.5 `execute`).
    Execute {
        /// Workflow id (must already be registered via `apply`, or pass
        /// `--file` to register it in the same invocation).
        workflow_id: String,

        /// Register the workflow from this file before executing it.
        #[arg(long)]
        file: Option<String>,

        /// Input variables as a JSON object.
        #[arg(short, long, default_value = "{}")]
        input: String,

        /// Block until the execution reaches a terminal status.
        #[arg(long)]
        wait: bool,

        #[arg(short, long, default_value = "text")]
        output: String,
    },

    /// Pause a running execution (§4.5 `pause`).
    Pause { execution_id: String },

    /// Resume a paused execution (§4.5 `resume`).
    Resume { execution_id: String },

    /// Cancel an execution, in-flight or paused (§4.5 `cancel`).
    Cancel { execution_id: String },

    /// Rebuild an execution's context from a checkpoint and resume it
    /// (§4.5 `restore`).
    Restore {
        execution_id: String,
        /// Specific checkpoint id; defaults to the latest.
        #[arg(long)]
        checkpoint_id: Option<String>,
    },

    /// Print an execution's current status (§6 `status`).
    Status {
        execution_id: String,
        #[arg(short, long, default_value = "text")]
        output: String,
    },

    /// Print recorded metrics, active alerts, and the system health score
    /// (§6 `metrics`).
    Metrics {
        #[arg(short, long, default_value = "text")]
        output: String,
    },

    /// List executions currently admitted by the engine (§6 `list_active`).
    ListActive {
        #[arg(short, long, default_value = "text")]
        output: String,
    },

    /// Run the engine as a long-lived process: loads every workflow and
    /// agent-pool file in `--resources-dir`, registers demo agents for any
    /// pool entries with no external binding, and serves `execute` calls
    /// read from a simple command file / stdin loop until interrupted.
    Serve {
        /// Socket-free demo mode: also accept one `execute` from the
        /// command line and exit once it completes.
        #[arg(long)]
        workflow_id: Option<String>,
        #[arg(long, default_value = "{}")]
        input: String,
    },

    /// Generate shell completions.
    Completion {
        #[arg(value_enum)]
        shell: crate::commands::completion::Shell,
    },
}
