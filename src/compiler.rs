//! Workflow compiler
//!
//! Turns a user-authored canvas graph (visually placed nodes plus directed
//! connections) into an executable [`Workflow`]. The compiler runs its own
//! validation — id format, duplicate ids, dangling connections, cycle
//! detection — independently of the engine, and wires upstream outputs into
//! downstream input slots.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use crate::executor::Endpoint;
use crate::workflow::{
    LlmCompletionConfig, OutputMap, ParallelGroupConfig, Step, StepConfig, TransformConfig,
    Trigger, Workflow,
};

/// Input slot names tried for dependency wiring, generic payload-like names
/// first.
const SLOT_PRIORITY: &[&str] = &["payload", "data", "input", "context", "items", "source"];

/// Node categories that compile to a generated pass-through transform.
const PASSTHROUGH_KINDS: &[&str] = &["merge", "output", "passthrough"];

static NODE_ID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9_-]*$").expect("node id regex is valid")
});

/// The visual document the canvas editor produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasGraph {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub nodes: Vec<CanvasNode>,
    #[serde(default)]
    pub connections: Vec<Connection>,
    #[serde(default)]
    pub triggers: Vec<Trigger>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasNode {
    pub id: String,
    /// Capability chosen in the editor; maps to one of the four step types.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub label: String,
    /// Explicit user-provided input values. Never overwritten by wiring.
    #[serde(default)]
    pub inputs: OutputMap,
    #[serde(default)]
    pub config: OutputMap,
    #[serde(default)]
    pub position: Position,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// Directed edge: target depends on source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub source: String,
    pub target: String,
    /// Upstream output to wire; defaults to the source's first output.
    #[serde(default)]
    pub source_output: Option<String>,
    /// Explicit downstream slot; heuristic picks one when absent.
    #[serde(default)]
    pub target_input: Option<String>,
}

#[derive(Error, Debug)]
pub enum CompileError {
    #[error("duplicate node id '{0}'")]
    DuplicateNodeId(String),

    #[error("invalid node id '{0}': must start with a letter and contain only alphanumerics, hyphens, or underscores")]
    InvalidNodeId(String),

    #[error("connection {side} references unknown node '{node_id}'")]
    UnknownNode {
        side: &'static str,
        node_id: String,
    },

    #[error("cycle detected between '{from}' and '{to}'")]
    Cycle { from: String, to: String },

    #[error("node '{node_id}' has unknown capability '{capability}'")]
    UnknownCapability {
        node_id: String,
        capability: String,
    },

    #[error("node '{node_id}': {message}")]
    InvalidConfig { node_id: String, message: String },
}

/// Compile a canvas graph into an executable workflow definition.
pub fn compile(graph: &CanvasGraph) -> Result<Workflow, CompileError> {
    validate_nodes(graph)?;
    validate_connections(graph)?;

    let deps = dependency_map(graph);
    let order = topological_order(graph, &deps)?;
    check_orphans(graph, &deps);

    let mut steps: Vec<Step> = Vec::with_capacity(graph.nodes.len());

    for node_id in &order {
        let node = graph
            .nodes
            .iter()
            .find(|n| &n.id == node_id)
            .expect("topological order only contains known nodes");

        let mut step = compile_node(node)?;
        step.dependencies = deps.get(node_id.as_str()).cloned().unwrap_or_default();

        wire_dependencies(&mut step, node, graph, &steps);
        bind_remaining_inputs(&mut step, node);
        if PASSTHROUGH_KINDS.contains(&node.kind.as_str()) {
            generate_passthrough_script(&mut step);
        }

        steps.push(step);
    }

    Ok(Workflow {
        id: graph
            .id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string()),
        name: graph.name.clone(),
        version: 1,
        description: graph.description.clone(),
        steps,
        triggers: if graph.triggers.is_empty() {
            vec![Trigger::Manual]
        } else {
            graph.triggers.clone()
        },
    })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate_nodes(graph: &CanvasGraph) -> Result<(), CompileError> {
    let mut seen = std::collections::HashSet::new();
    for node in &graph.nodes {
        if !NODE_ID_RE.is_match(&node.id) {
            return Err(CompileError::InvalidNodeId(node.id.clone()));
        }
        if !seen.insert(node.id.as_str()) {
            return Err(CompileError::DuplicateNodeId(node.id.clone()));
        }
    }
    Ok(())
}

fn validate_connections(graph: &CanvasGraph) -> Result<(), CompileError> {
    let ids: std::collections::HashSet<&str> =
        graph.nodes.iter().map(|n| n.id.as_str()).collect();
    for conn in &graph.connections {
        if !ids.contains(conn.source.as_str()) {
            return Err(CompileError::UnknownNode {
                side: "source",
                node_id: conn.source.clone(),
            });
        }
        if !ids.contains(conn.target.as_str()) {
            return Err(CompileError::UnknownNode {
                side: "target",
                node_id: conn.target.clone(),
            });
        }
    }
    Ok(())
}

/// Invert connections into target → sources, deduplicated in connection
/// order.
fn dependency_map(graph: &CanvasGraph) -> std::collections::HashMap<&str, Vec<String>> {
    let mut deps: std::collections::HashMap<&str, Vec<String>> = graph
        .nodes
        .iter()
        .map(|n| (n.id.as_str(), Vec::new()))
        .collect();

    for conn in &graph.connections {
        let sources = deps.entry(conn.target.as_str()).or_default();
        if !sources.contains(&conn.source) {
            sources.push(conn.source.clone());
        }
    }
    deps
}

/// DFS with three-color marking: dependencies before dependents, declared
/// order as the tie-break. A back-edge names the two conflicting nodes.
fn topological_order(
    graph: &CanvasGraph,
    deps: &std::collections::HashMap<&str, Vec<String>>,
) -> Result<Vec<String>, CompileError> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Unvisited,
        InProgress,
        Done,
    }

    fn visit(
        id: &str,
        deps: &std::collections::HashMap<&str, Vec<String>>,
        marks: &mut std::collections::HashMap<String, Mark>,
        order: &mut Vec<String>,
    ) -> Result<(), CompileError> {
        match marks.get(id).copied().unwrap_or(Mark::Unvisited) {
            Mark::Done => return Ok(()),
            Mark::InProgress => unreachable!("in-progress nodes are caught by the caller"),
            Mark::Unvisited => {}
        }
        marks.insert(id.to_string(), Mark::InProgress);

        if let Some(sources) = deps.get(id) {
            for source in sources {
                match marks.get(source.as_str()).copied().unwrap_or(Mark::Unvisited) {
                    Mark::InProgress => {
                        return Err(CompileError::Cycle {
                            from: id.to_string(),
                            to: source.clone(),
                        })
                    }
                    Mark::Done => {}
                    Mark::Unvisited => visit(source, deps, marks, order)?,
                }
            }
        }

        marks.insert(id.to_string(), Mark::Done);
        order.push(id.to_string());
        Ok(())
    }

    let mut marks = std::collections::HashMap::new();
    let mut order = Vec::with_capacity(graph.nodes.len());
    for node in &graph.nodes {
        visit(&node.id, deps, &mut marks, &mut order)?;
    }
    Ok(order)
}

/// Non-fatal: isolated nodes in a multi-node graph are logged, not rejected.
fn check_orphans(graph: &CanvasGraph, deps: &std::collections::HashMap<&str, Vec<String>>) {
    if graph.nodes.len() < 2 {
        return;
    }
    for node in &graph.nodes {
        let has_inbound = deps.get(node.id.as_str()).is_some_and(|d| !d.is_empty());
        let has_outbound = graph.connections.iter().any(|c| c.source == node.id);
        if !has_inbound && !has_outbound {
            warn!(node_id = %node.id, "orphan node has no connections");
        }
    }
}

// ---------------------------------------------------------------------------
// Per-node compilation
// ---------------------------------------------------------------------------

fn compile_node(node: &CanvasNode) -> Result<Step, CompileError> {
    let config = compile_config(node)?;
    let outputs = declared_outputs(node).unwrap_or_else(|| default_outputs(&config));

    Ok(Step {
        id: node.id.clone(),
        name: if node.label.is_empty() {
            node.id.clone()
        } else {
            node.label.clone()
        },
        inputs: node.inputs.clone(),
        outputs,
        dependencies: Vec::new(),
        config,
    })
}

fn compile_config(node: &CanvasNode) -> Result<StepConfig, CompileError> {
    let kind = node.kind.as_str();

    if kind == "llm-completion" || kind == "completion" || kind == "prompt" {
        let cfg: LlmCompletionConfig =
            serde_json::from_value(Value::Object(node.config.clone())).map_err(|e| {
                CompileError::InvalidConfig {
                    node_id: node.id.clone(),
                    message: e.to_string(),
                }
            })?;
        return Ok(StepConfig::LlmCompletion(cfg));
    }

    if kind == "transform" {
        let script = node
            .config
            .get("script")
            .and_then(Value::as_str)
            .unwrap_or("{ }")
            .to_string();
        return Ok(StepConfig::Transform(TransformConfig { script }));
    }

    if PASSTHROUGH_KINDS.contains(&kind) {
        // Placeholder; regenerated after wiring, once the slots are known
        return Ok(StepConfig::Transform(TransformConfig {
            script: "{ value: null }".to_string(),
        }));
    }

    if kind == "parallel-group" {
        let raw = node.config.get("steps").cloned().unwrap_or(Value::Array(vec![]));
        let sub_nodes: Vec<CanvasNode> =
            serde_json::from_value(raw).map_err(|e| CompileError::InvalidConfig {
                node_id: node.id.clone(),
                message: format!("invalid group steps: {}", e),
            })?;
        let mut sub_steps = Vec::with_capacity(sub_nodes.len());
        for sub in &sub_nodes {
            let mut step = compile_node(sub)?;
            bind_remaining_inputs(&mut step, sub);
            sub_steps.push(step);
        }
        return Ok(StepConfig::ParallelGroup(ParallelGroupConfig {
            steps: sub_steps,
        }));
    }

    // Endpoint-named nodes, and the generic platform-call node
    let endpoint = if kind == "platform-call" {
        node.config
            .get("endpoint")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| CompileError::InvalidConfig {
                node_id: node.id.clone(),
                message: "platform-call requires config.endpoint".to_string(),
            })?
    } else if Endpoint::from_id(kind).is_some() {
        kind.to_string()
    } else {
        return Err(CompileError::UnknownCapability {
            node_id: node.id.clone(),
            capability: node.kind.clone(),
        });
    };

    let params = node
        .config
        .get("params")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    Ok(StepConfig::ExternalCall(
        crate::workflow::ExternalCallConfig { endpoint, params },
    ))
}

fn declared_outputs(node: &CanvasNode) -> Option<Vec<String>> {
    node.config.get("outputs").and_then(Value::as_array).map(|items| {
        items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect()
    })
}

fn default_outputs(config: &StepConfig) -> Vec<String> {
    match config {
        StepConfig::ExternalCall(cfg) => Endpoint::from_id(&cfg.endpoint)
            .map(|e| e.output_names().iter().map(|s| s.to_string()).collect())
            .unwrap_or_default(),
        StepConfig::LlmCompletion(_) => vec!["text".to_string()],
        StepConfig::Transform(_) => vec!["value".to_string()],
        StepConfig::ParallelGroup(cfg) => {
            let mut outputs = Vec::new();
            for sub in &cfg.steps {
                for name in &sub.outputs {
                    if !outputs.contains(name) {
                        outputs.push(name.clone());
                    }
                }
            }
            outputs
        }
    }
}

// ---------------------------------------------------------------------------
// Input wiring
// ---------------------------------------------------------------------------

/// Bind each upstream dependency to an unused input slot, preferring the
/// explicit connection slot, then the priority list. Explicit user values
/// are never overwritten.
fn wire_dependencies(step: &mut Step, node: &CanvasNode, graph: &CanvasGraph, compiled: &[Step]) {
    let mut wired_sources: Vec<&str> = Vec::new();

    for conn in graph.connections.iter().filter(|c| c.target == node.id) {
        if wired_sources.contains(&conn.source.as_str()) {
            continue;
        }
        wired_sources.push(&conn.source);

        let output = conn.source_output.clone().unwrap_or_else(|| {
            compiled
                .iter()
                .find(|s| s.id == conn.source)
                .map(|s| s.first_output().to_string())
                .unwrap_or_else(|| "text".to_string())
        });
        let reference = format!("$steps.{}.{}", conn.source, output);

        let slot = conn
            .target_input
            .as_deref()
            .filter(|name| !step.inputs.contains_key(*name))
            .map(str::to_string)
            .or_else(|| {
                SLOT_PRIORITY
                    .iter()
                    .find(|name| !step.inputs.contains_key(**name))
                    .map(|name| name.to_string())
            });

        match slot {
            Some(slot) => {
                step.inputs.insert(slot, Value::String(reference));
            }
            None => warn!(
                node_id = %node.id,
                source = %conn.source,
                "no free input slot for dependency"
            ),
        }
    }
}

/// Credential-shaped expected inputs bind to run-level references; other
/// unset inputs fall back to declared defaults.
fn bind_remaining_inputs(step: &mut Step, node: &CanvasNode) {
    for name in expected_inputs(&step.config) {
        if !step.inputs.contains_key(name) && is_credential_shaped(name) {
            step.inputs
                .insert(name.to_string(), Value::String(format!("$input.{}", name)));
        }
    }

    if let Some(defaults) = node.config.get("defaults").and_then(Value::as_object) {
        for (name, value) in defaults {
            if !step.inputs.contains_key(name) {
                step.inputs.insert(name.clone(), value.clone());
            }
        }
    }
}

fn expected_inputs(config: &StepConfig) -> Vec<&'static str> {
    match config {
        StepConfig::ExternalCall(cfg) => {
            let mut expected = vec!["accessToken"];
            if let Some(endpoint) = Endpoint::from_id(&cfg.endpoint) {
                expected.extend_from_slice(endpoint.required_params());
            }
            expected
        }
        _ => Vec::new(),
    }
}

fn is_credential_shaped(name: &str) -> bool {
    let lower = name.to_lowercase();
    ["token", "key", "secret", "credential", "auth"]
        .iter()
        .any(|marker| lower.contains(marker))
}

/// Pass-through categories get a generated transform script over whatever
/// slots ended up wired.
fn generate_passthrough_script(step: &mut Step) {
    let wired: Vec<&str> = step.inputs.keys().map(String::as_str).collect();
    let script = match wired.len() {
        0 => "{ value: null }".to_string(),
        1 => format!("{{ value: {} }}", wired[0]),
        _ => format!("{{ value: [{}] }}", wired.join(", ")),
    };
    step.config = StepConfig::Transform(TransformConfig { script });
}
