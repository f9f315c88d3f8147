//! Cascade command-line interface.
//!
//! `cascade run workflow.json --input value=15` executes a workflow
//! definition and prints its final outputs; `cascade validate` checks a
//! definition without running it.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{ArgAction, Parser, Subcommand};
use serde_json::{Map, Value};

use cascade_engine::{Engine, EngineOptions};
use cascade_workflow::{BuiltWorkflow, WorkflowDefinition};

#[derive(Parser)]
#[command(name = "cascade", version, about = "Run Cascade workflow definitions")]
struct Cli {
    /// Increase log verbosity (-v: debug, -vv: trace).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a workflow definition without running it.
    Validate {
        /// Path to the workflow definition JSON.
        file: PathBuf,
    },
    /// Run a workflow to completion and print its final outputs.
    Run {
        /// Path to the workflow definition JSON.
        file: PathBuf,
        /// Workflow input as key=value. The value parses as JSON when it
        /// can, otherwise it is taken as a string. Repeatable.
        #[arg(short, long = "input", value_name = "KEY=VALUE")]
        inputs: Vec<String>,
        /// JSON file holding the inputs object; inline --input wins on
        /// collision.
        #[arg(long, value_name = "FILE")]
        input_file: Option<PathBuf>,
        /// Cap on concurrently executing nodes.
        #[arg(long)]
        max_concurrent: Option<usize>,
        /// Workflow timeout in milliseconds.
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "cascade=info",
        1 => "cascade=debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn load_workflow(path: &Path) -> anyhow::Result<BuiltWorkflow> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading workflow file {}", path.display()))?;
    let definition: WorkflowDefinition =
        serde_json::from_str(&raw).context("parsing workflow definition")?;
    BuiltWorkflow::build(definition).context("building workflow graph")
}

fn parse_inputs(
    pairs: &[String],
    input_file: Option<&Path>,
) -> anyhow::Result<Map<String, Value>> {
    let mut inputs = Map::new();
    if let Some(path) = input_file {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading input file {}", path.display()))?;
        match serde_json::from_str(&raw).context("parsing input file")? {
            Value::Object(map) => inputs.extend(map),
            other => bail!("input file must hold a JSON object, got {other}"),
        }
    }
    for pair in pairs {
        let Some((name, value)) = pair.split_once('=') else {
            bail!("input {pair:?} is not of the form key=value");
        };
        let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.into()));
        inputs.insert(name.to_owned(), value);
    }
    Ok(inputs)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Validate { file } => {
            let workflow = load_workflow(&file)?;
            println!(
                "{}: valid ({} nodes, {} levels)",
                workflow.name,
                workflow.node_count(),
                workflow.execution_levels.len()
            );
            Ok(())
        }
        Command::Run {
            file,
            inputs,
            input_file,
            max_concurrent,
            timeout_ms,
        } => {
            let workflow = Arc::new(load_workflow(&file)?);
            let inputs = parse_inputs(&inputs, input_file.as_deref())?;

            let mut options = EngineOptions::default();
            if let Some(cap) = max_concurrent {
                options = options.with_max_concurrent_nodes(cap);
            }
            if let Some(ms) = timeout_ms {
                options = options.with_timeout(Duration::from_millis(ms));
            }

            let engine = Engine::with_builtins();
            let report = engine.run_execution(workflow, inputs, options).await?;

            println!(
                "{}",
                serde_json::to_string_pretty(&Value::Object(report.final_outputs.clone()))?
            );
            if let Some(failure) = &report.error {
                eprintln!(
                    "execution {}: {} ({})",
                    report.status, failure.message, failure.kind
                );
                std::process::exit(1);
            }
            Ok(())
        }
    }
}
