//! Error types for the engine and the step executors
//!
//! Two layers mirror the failure taxonomy: `EngineError` for definition-level
//! failures that abort a run before (or instead of) executing steps, and
//! `StepError` for failures inside a single step executor. Step errors never
//! cross the engine boundary — the engine folds them into a failed
//! [`StepResult`](crate::context::StepResult).

use thiserror::Error;

/// Definition-level failures: unknown workflow, broken dependency structure.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("workflow '{0}' not found")]
    WorkflowNotFound(String),

    #[error("cyclic dependency detected at step '{step_id}'")]
    CyclicDependency { step_id: String },

    #[error("step '{step_id}' depends on unknown step '{dependency}'")]
    UnknownDependency { step_id: String, dependency: String },

    #[error("duplicate step id '{0}'")]
    DuplicateStepId(String),
}

/// Failures raised by a step executor. Always fatal to the run.
#[derive(Error, Debug)]
pub enum StepError {
    #[error("missing required input '{0}'")]
    MissingInput(String),

    #[error("missing access token credential")]
    MissingCredential,

    #[error("unknown endpoint '{0}'")]
    UnknownEndpoint(String),

    #[error("platform API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("prompt key '{0}' not found in prompt store")]
    PromptNotFound(String),

    #[error("completion provider error: {0}")]
    Provider(String),

    #[error("model returned an empty completion")]
    EmptyCompletion,

    #[error("transform error: {0}")]
    Transform(String),

    #[error("transform must return an object, got {0}")]
    TransformResult(&'static str),

    #[error("parallel group failed: {0}")]
    Group(String),
}

impl From<reqwest::Error> for StepError {
    fn from(err: reqwest::Error) -> Self {
        StepError::Http(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_error_names_offending_step() {
        let err = EngineError::CyclicDependency {
            step_id: "fetch-stats".to_string(),
        };
        assert!(err.to_string().contains("fetch-stats"));
    }

    #[test]
    fn api_error_carries_status_and_body() {
        let err = StepError::Api {
            status: 403,
            body: "quota exceeded".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("403"));
        assert!(msg.contains("quota exceeded"));
    }
}
