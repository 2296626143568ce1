//! Workflow definition model
//!
//! Pure data: the shapes the compiler emits, the repository stores, and the
//! engine loads. Structural invariants (unique step ids, dependency
//! existence, acyclicity) are enforced by [`DependencyGraph::build`]
//! (crate::graph::DependencyGraph::build) on the engine path and
//! independently by the compiler.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Output (and resolved-input) maps are plain JSON objects.
pub type OutputMap = Map<String, Value>;

/// A complete workflow definition. Immutable once loaded for a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    pub id: String,
    pub name: String,
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub description: Option<String>,
    pub steps: Vec<Step>,
    #[serde(default)]
    pub triggers: Vec<Trigger>,
}

fn default_version() -> u32 {
    1
}

impl Workflow {
    /// Look up a step by id.
    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }
}

/// How a workflow is started. Only `manual` is exercised by the core;
/// scheduled/webhook delivery belongs to an external collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Trigger {
    Manual,
    Scheduled { cron: String },
    Webhook { path: String },
}

/// One unit of work: declared inputs, promised outputs, dependencies, and a
/// capability-specific config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    /// Unique within the workflow; referenced by `dependencies` and by
    /// `$steps.<id>` references downstream.
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Input name → literal JSON value or DSL reference string.
    #[serde(default)]
    pub inputs: OutputMap,
    /// Ordered list of output names this step promises to produce.
    #[serde(default)]
    pub outputs: Vec<String>,
    /// Step ids this step depends on; all must exist in the same workflow.
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(flatten)]
    pub config: StepConfig,
}

impl Step {
    /// The capability tag, for dispatch keys and log fields.
    pub fn kind(&self) -> StepKind {
        match self.config {
            StepConfig::ExternalCall(_) => StepKind::ExternalCall,
            StepConfig::LlmCompletion(_) => StepKind::LlmCompletion,
            StepConfig::Transform(_) => StepKind::Transform,
            StepConfig::ParallelGroup(_) => StepKind::ParallelGroup,
        }
    }

    /// First declared output name; executors that produce a single value bind
    /// it here.
    pub fn first_output(&self) -> &str {
        self.outputs.first().map(String::as_str).unwrap_or("text")
    }
}

/// Closed capability set. Serialized adjacently: the `capability` tag selects
/// the variant, `config` carries its settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "capability", content = "config", rename_all = "kebab-case")]
pub enum StepConfig {
    ExternalCall(ExternalCallConfig),
    LlmCompletion(LlmCompletionConfig),
    Transform(TransformConfig),
    ParallelGroup(ParallelGroupConfig),
}

/// Lightweight capability tag (logging, errors, compiler mapping).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepKind {
    ExternalCall,
    LlmCompletion,
    Transform,
    ParallelGroup,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::ExternalCall => "external-call",
            StepKind::LlmCompletion => "llm-completion",
            StepKind::Transform => "transform",
            StepKind::ParallelGroup => "parallel-group",
        }
    }
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settings for one call against the platform endpoint catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalCallConfig {
    /// Endpoint id, e.g. `channel-info` or `video-search`.
    pub endpoint: String,
    /// Endpoint parameters; merged with resolved inputs at call time.
    #[serde(default)]
    pub params: OutputMap,
}

/// Settings for an LLM completion step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmCompletionConfig {
    /// Literal prompt template. When blank, `prompt_key` is looked up in the
    /// prompt store instead.
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub prompt_key: Option<String>,
    /// Literal system message template; same store-lookup fallback.
    #[serde(default)]
    pub system: String,
    #[serde(default)]
    pub system_key: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    1024
}

/// Settings for a transform step: one expression program.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformConfig {
    pub script: String,
}

/// Settings for a parallel group: complete embedded sub-step definitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParallelGroupConfig {
    pub steps: Vec<Step>,
}
