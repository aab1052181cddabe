//! agentmesh - plan and run tool batches from the command line
//!
//! ## Commands
//!
//! - `plan`: show how a batch of tool calls would be leveled, with warnings
//! - `run`: execute a batch against fixture-backed tools and print the summary
//! - `config`: print the effective configuration as TOML

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, Level};

use agentmesh_core::obs::RunSpan;
use agentmesh_core::telemetry::init_tracing;
use agentmesh_core::{
    execution_report, CoordinatorConfig, Orchestrator, TaskManager, ToolCall, ToolRegistry,
};

#[derive(Parser)]
#[command(name = "agentmesh")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Dependency-aware coordination of multi-agent tool calls", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Configuration file (.toml or .json); defaults are used when omitted
    #[arg(short, long, global = true, env = "AGENTMESH_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the execution plan for a batch without running it
    Plan {
        /// JSON array of tool calls: [{"name": ..., "args": {...}, "id": ...}]
        #[arg(short, long)]
        batch: PathBuf,
    },

    /// Execute a batch against canned tool outputs
    Run {
        /// JSON array of tool calls
        #[arg(short, long)]
        batch: PathBuf,

        /// JSON object mapping tool name to {"returns": <json>} or {"fails": "<message>"}
        #[arg(short, long)]
        fixtures: PathBuf,

        /// Print the plain-text execution report instead of summary JSON
        #[arg(long)]
        report: bool,
    },

    /// Print the effective configuration
    Config,
}

/// Canned behaviour for one tool.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Fixture {
    Returns(Value),
    Fails(String),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };
    init_tracing(cli.json, level);

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Plan { batch } => {
            let out = cmd_plan(config, &batch)?;
            print!("{out}");
            Ok(())
        }
        Commands::Run {
            batch,
            fixtures,
            report,
        } => {
            let out = cmd_run(config, &batch, &fixtures, report).await?;
            println!("{out}");
            Ok(())
        }
        Commands::Config => {
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<CoordinatorConfig> {
    let config = match path {
        Some(path) => CoordinatorConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => CoordinatorConfig::default(),
    }
    .with_env_overrides();
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn read_batch(path: &Path) -> Result<Vec<ToolCall>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read batch {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid batch file {}", path.display()))
}

fn read_fixtures(path: &Path) -> Result<BTreeMap<String, Fixture>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read fixtures {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid fixtures file {}", path.display()))
}

/// Render the plan for a batch as text.
fn cmd_plan(config: CoordinatorConfig, batch: &Path) -> Result<String> {
    let calls = read_batch(batch)?;
    let _span = RunSpan::enter("plan");
    let manager = TaskManager::new(Arc::new(config));
    let plan = manager.plan(&calls)?;
    let warnings = manager.validate_plan(&plan);
    info!(tasks = plan.total_tasks, warnings = warnings.len(), "plan built");

    let mut out = format!(
        "Plan: {} task(s), {} level(s), ~{:.1}s estimated\n",
        plan.total_tasks,
        plan.levels().len(),
        plan.estimated_time
    );
    for (level, tasks) in plan.levels() {
        out.push_str(&format!("\nLevel {level}:\n"));
        for task in tasks {
            out.push_str(&format!("  - {} [{}]", task.tool_name, task.role));
            if !task.dependencies.is_empty() {
                let deps: Vec<String> = task
                    .dependencies
                    .iter()
                    .filter_map(|d| plan.task(d))
                    .map(|t| t.tool_name.clone())
                    .collect();
                out.push_str(&format!(" after {}", deps.join(", ")));
            }
            out.push('\n');
        }
    }
    if !warnings.is_empty() {
        out.push_str("\nWarnings:\n");
        for w in &warnings {
            out.push_str(&format!("  ! {w}\n"));
        }
    }
    Ok(out)
}

/// Execute a batch against fixtures; returns summary JSON or the text report.
async fn cmd_run(
    config: CoordinatorConfig,
    batch: &Path,
    fixtures: &Path,
    report: bool,
) -> Result<String> {
    let calls = read_batch(batch)?;
    let fixtures = read_fixtures(fixtures)?;

    let mut registry = ToolRegistry::new(config.execution.blocking_pool_size);
    for (name, fixture) in fixtures {
        registry.register_async(name, move |_args| {
            let fixture = fixture.clone();
            async move {
                match fixture {
                    Fixture::Returns(value) => Ok(value),
                    Fixture::Fails(message) => Err(anyhow!(message)),
                }
            }
        })?;
    }

    let orchestrator = Orchestrator::new(Arc::new(config), registry);
    let summary = orchestrator.coordinate(&calls).await;

    if report {
        Ok(execution_report(&summary))
    } else {
        serde_json::to_string_pretty(&summary).context("Failed to serialize summary")
    }
}
