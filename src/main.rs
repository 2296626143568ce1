//! Strand CLI - run, validate, and compile workflows

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use strand::compiler::{self, CanvasGraph};
use strand::execution::ExecutionStatus;
use strand::graph::DependencyGraph;
use strand::provider::{create_provider, InMemoryPromptStore};
use strand::repository::{InMemoryWorkflowRepository, WorkflowRepository};
use strand::store::ExecutionStore;
use strand::workflow::Workflow;
use strand::{Engine, StepExecutors};

#[derive(Parser)]
#[command(name = "strand")]
#[command(about = "Strand - dependency-graph workflow orchestration")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a workflow file
    Run {
        /// Path to a workflow file (.yaml or .json)
        file: String,

        /// Run-level input as key=value (value parsed as JSON when possible)
        #[arg(short, long)]
        input: Vec<String>,

        /// Completion provider (openai, mock)
        #[arg(short, long, default_value = "openai")]
        provider: String,
    },

    /// Validate a workflow file (structure and dependency graph)
    Validate {
        /// Path to a workflow file (.yaml or .json)
        file: String,
    },

    /// Compile a canvas graph file into a workflow definition
    Compile {
        /// Path to a canvas graph file (.yaml or .json)
        file: String,

        /// Write the compiled workflow here instead of stdout
        #[arg(short, long)]
        output: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            file,
            input,
            provider,
        } => run_workflow(&file, &input, &provider).await,
        Commands::Validate { file } => validate_workflow(&file),
        Commands::Compile { file, output } => compile_graph(&file, output.as_deref()),
    };

    if let Err(e) = result {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run_workflow(file: &str, inputs: &[String], provider_name: &str) -> Result<()> {
    let workflow: Workflow = load_document(file)?;
    let workflow_id = workflow.id.clone();

    let repository = InMemoryWorkflowRepository::new();
    repository.upsert(workflow).await;

    let provider = create_provider(provider_name)?;
    let executors = StepExecutors::new(provider, Arc::new(InMemoryPromptStore::new()));
    let store = Arc::new(ExecutionStore::new());
    let engine = Engine::new(Arc::new(repository), Arc::new(executors), store);

    let execution = engine
        .execute_workflow(&workflow_id, parse_inputs(inputs)?)
        .await?;

    match execution.status {
        ExecutionStatus::Completed => {
            println!(
                "{} {} ({} steps)",
                "✓".green().bold(),
                "completed".green(),
                execution.step_results.len()
            );
        }
        _ => {
            println!("{} {}", "✗".red().bold(), "failed".red());
            for error in &execution.errors {
                println!("  {} {}: {}", "→".red(), error.step_id.bold(), error.message);
            }
        }
    }

    println!("{}", serde_json::to_string_pretty(&execution)?);

    if execution.status != ExecutionStatus::Completed {
        std::process::exit(1);
    }
    Ok(())
}

fn validate_workflow(file: &str) -> Result<()> {
    let workflow: Workflow = load_document(file)?;
    let graph = DependencyGraph::build(&workflow)?;

    println!(
        "{} {} ({} steps, {} levels)",
        "✓".green().bold(),
        "valid".green(),
        graph.len(),
        graph.max_level() + 1
    );
    Ok(())
}

fn compile_graph(file: &str, output: Option<&str>) -> Result<()> {
    let graph: CanvasGraph = load_document(file)?;
    let workflow = compiler::compile(&graph)?;

    let rendered = if output.is_some_and(|p| p.ends_with(".json")) {
        serde_json::to_string_pretty(&workflow)?
    } else {
        serde_yaml::to_string(&workflow)?
    };

    match output {
        Some(path) => {
            std::fs::write(path, rendered).with_context(|| format!("writing {}", path))?;
            println!(
                "{} compiled {} nodes into {}",
                "✓".green().bold(),
                graph.nodes.len(),
                path
            );
        }
        None => println!("{}", rendered),
    }
    Ok(())
}

/// Parse a workflow or graph document, YAML or JSON by extension.
fn load_document<T: DeserializeOwned>(path: &str) -> Result<T> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path))?;
    if path.ends_with(".json") {
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path))
    } else {
        serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path))
    }
}

/// `key=value` pairs into a JSON object; values parse as JSON when they can,
/// otherwise they stay strings.
fn parse_inputs(pairs: &[String]) -> Result<Value> {
    let mut object = serde_json::Map::new();
    for pair in pairs {
        let (key, raw) = pair
            .split_once('=')
            .ok_or_else(|| anyhow!("invalid input '{}', expected key=value", pair))?;
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        object.insert(key.to_string(), value);
    }
    Ok(Value::Object(object))
}
