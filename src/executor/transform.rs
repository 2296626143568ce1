//! Transform executor
//!
//! Evaluates one expression program against a restricted scope: the resolved
//! inputs at top level, plus read-only `steps` and `inputs` roots from the
//! run context. The program must yield a plain object; anything else, or any
//! evaluation error, fails the step. Execution is synchronous — no remote
//! calls, no yielding.

use serde_json::Value;

use crate::context::ExecutionContext;
use crate::error::StepError;
use crate::expr;
use crate::workflow::{OutputMap, TransformConfig};

pub struct TransformExecutor;

impl TransformExecutor {
    pub fn execute(
        &self,
        cfg: &TransformConfig,
        inputs: &OutputMap,
        ctx: &ExecutionContext,
    ) -> Result<OutputMap, StepError> {
        let scope = build_scope(inputs, ctx);

        let result = expr::evaluate(&cfg.script, &scope)
            .map_err(|e| StepError::Transform(e.to_string()))?;

        match result {
            Value::Object(map) => Ok(map),
            other => Err(StepError::TransformResult(expr::type_name(&other))),
        }
    }
}

/// Resolved inputs at top level; `steps` and `inputs` always name the run
/// context, shadowing same-named inputs.
fn build_scope(inputs: &OutputMap, ctx: &ExecutionContext) -> Value {
    let mut scope = inputs.clone();
    scope.insert("steps".to_string(), ctx.step_results_value());
    scope.insert("inputs".to_string(), ctx.inputs.clone());
    Value::Object(scope)
}
