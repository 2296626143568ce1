//! Workflow engine: level-by-level wavefront scheduler
//!
//! Loads a definition, builds its dependency graph, and executes it as a
//! strict breadth-first wavefront: every step at level L is dispatched
//! concurrently and the run blocks until all of them finish before level
//! L+1 begins. The first failure observed in a level fails the whole run;
//! outputs from that level are discarded, even for steps that succeeded.

use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::context::{ExecutionContext, StepResult};
use crate::error::EngineError;
use crate::execution::{ExecutionError, WorkflowExecution};
use crate::executor::StepExecutors;
use crate::graph::DependencyGraph;
use crate::reference;
use crate::repository::WorkflowRepository;
use crate::store::ExecutionStore;
use crate::workflow::Step;

pub struct Engine {
    repository: Arc<dyn WorkflowRepository>,
    executors: Arc<StepExecutors>,
    store: Arc<ExecutionStore>,
}

impl Engine {
    pub fn new(
        repository: Arc<dyn WorkflowRepository>,
        executors: Arc<StepExecutors>,
        store: Arc<ExecutionStore>,
    ) -> Self {
        Self {
            repository,
            executors,
            store,
        }
    }

    pub fn store(&self) -> &Arc<ExecutionStore> {
        &self.store
    }

    /// Run a workflow to completion. Only an unknown workflow id errors;
    /// every other failure is recorded on the returned execution.
    #[instrument(skip(self, inputs))]
    pub async fn execute_workflow(
        &self,
        workflow_id: &str,
        inputs: Value,
    ) -> Result<WorkflowExecution, EngineError> {
        let workflow = self
            .repository
            .get(workflow_id)
            .await
            .ok_or_else(|| EngineError::WorkflowNotFound(workflow_id.to_string()))?;

        let mut execution = WorkflowExecution::start(&workflow.id);
        self.store.insert(execution.clone());
        debug!(execution_id = %execution.id, steps = workflow.steps.len(), "run started");

        let graph = match DependencyGraph::build(&workflow) {
            Ok(graph) => graph,
            Err(err) => {
                execution.fail(ExecutionError::new(offending_step(&err), err.to_string()));
                self.finalize(&execution);
                return Ok(execution);
            }
        };

        let mut ctx = ExecutionContext::new(&workflow.id, &execution.id, inputs);

        for level in 0..=graph.max_level() {
            let steps: Vec<&Step> = graph
                .steps_at_level(level)
                .into_iter()
                .filter_map(|id| workflow.step(id))
                .collect();
            debug!(level, count = steps.len(), "dispatching level");

            let results = join_all(steps.iter().map(|step| self.execute_step(step, &ctx))).await;

            if let Some(failure) = results.iter().find(|r| !r.is_completed()) {
                let message = failure.error.clone().unwrap_or_default();
                warn!(level, step_id = %failure.step_id, %message, "level failed, aborting run");
                execution.fail(ExecutionError::new(&failure.step_id, message));
                self.finalize(&execution);
                return Ok(execution);
            }

            for result in results {
                ctx.record_outputs(&result.step_id, result.outputs);
            }
        }

        execution.complete(ctx.step_results.clone());
        self.finalize(&execution);
        debug!(execution_id = %execution.id, "run completed");
        Ok(execution)
    }

    /// Resolve inputs, dispatch to the capability's executor, and fold any
    /// executor error into a failed result. Errors never escape here.
    pub async fn execute_step(&self, step: &Step, ctx: &ExecutionContext) -> StepResult {
        let resolved = reference::resolve_inputs(&step.inputs, ctx);
        let started = Instant::now();

        match self.executors.run(step, resolved, ctx).await {
            Ok(outputs) => StepResult::completed(&step.id, outputs, started.elapsed()),
            Err(err) => {
                warn!(step_id = %step.id, error = %err, "step failed");
                StepResult::failed(&step.id, err.to_string(), started.elapsed())
            }
        }
    }

    fn finalize(&self, execution: &WorkflowExecution) {
        self.store.update(&execution.id, |stored| {
            *stored = execution.clone();
        });
    }
}

/// Step id to attach to a workflow-level definition error.
fn offending_step(err: &EngineError) -> &str {
    match err {
        EngineError::CyclicDependency { step_id } => step_id,
        EngineError::UnknownDependency { step_id, .. } => step_id,
        EngineError::DuplicateStepId(id) => id,
        EngineError::WorkflowNotFound(_) => "workflow",
    }
}
