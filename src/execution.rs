//! Persisted/observable run records
//!
//! A `WorkflowExecution` is created with status `running` when a run starts,
//! mutated in place through the execution store, and finalized to
//! `completed`/`failed` with `finished_at` stamped. The core never deletes
//! records; eviction is the store's concern.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::workflow::OutputMap;

/// Run lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// One workflow-level error entry. A failed run carries exactly one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionError {
    pub step_id: String,
    pub message: String,
    pub at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ExecutionError {
    pub fn new(step_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            step_id: step_id.into(),
            message: message.into(),
            at: Utc::now(),
            detail: None,
        }
    }
}

/// The observable record of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowExecution {
    pub id: String,
    pub workflow_id: String,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    /// Flattened: step id → its output object.
    #[serde(default)]
    pub step_results: OutputMap,
    #[serde(default)]
    pub errors: Vec<ExecutionError>,
}

impl WorkflowExecution {
    /// A fresh running record with a generated id.
    pub fn start(workflow_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            workflow_id: workflow_id.into(),
            status: ExecutionStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
            step_results: OutputMap::new(),
            errors: Vec::new(),
        }
    }

    pub fn complete(&mut self, step_results: OutputMap) {
        self.step_results = step_results;
        self.status = ExecutionStatus::Completed;
        self.finished_at = Some(Utc::now());
    }

    pub fn fail(&mut self, error: ExecutionError) {
        self.errors.push(error);
        self.status = ExecutionStatus::Failed;
        self.finished_at = Some(Utc::now());
    }

    pub fn is_active(&self) -> bool {
        self.status == ExecutionStatus::Running
    }

    /// Wall-clock duration in milliseconds, once finished.
    pub fn duration_ms(&self) -> Option<i64> {
        self.finished_at
            .map(|end| (end - self.started_at).num_milliseconds())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn start_is_running_without_end_time() {
        let exec = WorkflowExecution::start("wf-1");
        assert_eq!(exec.status, ExecutionStatus::Running);
        assert!(exec.finished_at.is_none());
        assert!(exec.is_active());
        assert!(exec.duration_ms().is_none());
    }

    #[test]
    fn fail_appends_single_error_and_stamps_end() {
        let mut exec = WorkflowExecution::start("wf-1");
        exec.fail(ExecutionError::new("b", "boom"));

        assert_eq!(exec.status, ExecutionStatus::Failed);
        assert_eq!(exec.errors.len(), 1);
        assert_eq!(exec.errors[0].step_id, "b");
        assert!(exec.finished_at.is_some());
    }

    #[test]
    fn status_serializes_lowercase() {
        let exec = WorkflowExecution::start("wf-1");
        let value = serde_json::to_value(&exec).unwrap();
        assert_eq!(value["status"], json!("running"));
        assert_eq!(value["workflowId"], json!("wf-1"));
    }
}
