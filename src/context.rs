//! Per-run execution context and step results
//!
//! One `ExecutionContext` exists per run and is never shared across runs.
//! Step outputs accumulate in it level by level; the reference DSL reads from
//! it when wiring later steps' inputs.

use std::time::Duration;

use serde_json::Value;

use crate::workflow::OutputMap;

/// Mutable per-run state: run-level inputs plus the outputs of every step
/// completed so far.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub workflow_id: String,
    pub execution_id: String,
    /// Run-level values supplied by the caller (JSON object).
    pub inputs: Value,
    /// Step id → its output object. Grown as levels complete.
    pub step_results: OutputMap,
}

impl ExecutionContext {
    pub fn new(workflow_id: impl Into<String>, execution_id: impl Into<String>, inputs: Value) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            execution_id: execution_id.into(),
            inputs: if inputs.is_object() { inputs } else { Value::Object(OutputMap::new()) },
            step_results: OutputMap::new(),
        }
    }

    /// Merge one completed step's outputs into the context.
    pub fn record_outputs(&mut self, step_id: &str, outputs: OutputMap) {
        self.step_results
            .insert(step_id.to_string(), Value::Object(outputs));
    }

    /// `step_results` as a JSON value, for path resolution.
    pub fn step_results_value(&self) -> Value {
        Value::Object(self.step_results.clone())
    }
}

/// Outcome of one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Completed,
    Failed,
}

/// What a single step produced: outputs on success, an error message on
/// failure, elapsed time either way.
#[derive(Debug, Clone)]
pub struct StepResult {
    pub step_id: String,
    pub status: StepStatus,
    pub outputs: OutputMap,
    pub error: Option<String>,
    pub duration: Duration,
}

impl StepResult {
    pub fn completed(step_id: impl Into<String>, outputs: OutputMap, duration: Duration) -> Self {
        Self {
            step_id: step_id.into(),
            status: StepStatus::Completed,
            outputs,
            error: None,
            duration,
        }
    }

    pub fn failed(step_id: impl Into<String>, error: impl Into<String>, duration: Duration) -> Self {
        Self {
            step_id: step_id.into(),
            status: StepStatus::Failed,
            outputs: OutputMap::new(),
            error: Some(error.into()),
            duration,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == StepStatus::Completed
    }
}
