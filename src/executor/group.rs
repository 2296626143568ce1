//! Parallel-group executor
//!
//! Runs an embedded list of complete sub-step definitions concurrently
//! through the same single-step execution path. Sub-steps share the group's
//! resolved inputs; each may override specific inputs with its own (resolved
//! against the run context). Output maps merge in declaration order — later
//! sub-steps win on key collision. Any sub-failure fails the whole group with
//! every failure message aggregated into one.

use futures::future::join_all;

use crate::context::ExecutionContext;
use crate::error::StepError;
use crate::reference;
use crate::workflow::{OutputMap, ParallelGroupConfig};

use super::StepExecutors;

pub struct ParallelGroupExecutor;

impl ParallelGroupExecutor {
    pub async fn execute(
        &self,
        executors: &StepExecutors,
        cfg: &ParallelGroupConfig,
        inputs: &OutputMap,
        ctx: &ExecutionContext,
    ) -> Result<OutputMap, StepError> {
        let futures = cfg.steps.iter().map(|sub| {
            let mut sub_inputs = inputs.clone();
            for (name, value) in &sub.inputs {
                sub_inputs.insert(name.clone(), reference::resolve_value(value, ctx));
            }
            async move { (sub.id.as_str(), executors.run(sub, sub_inputs, ctx).await) }
        });

        let results = join_all(futures).await;

        let mut failures: Vec<String> = Vec::new();
        let mut merged = OutputMap::new();
        for (sub_id, result) in results {
            match result {
                Ok(outputs) => merged.extend(outputs),
                Err(err) => failures.push(format!("{}: {}", sub_id, err)),
            }
        }

        if failures.is_empty() {
            Ok(merged)
        } else {
            Err(StepError::Group(failures.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{InMemoryPromptStore, MockProvider};
    use crate::workflow::{Step, StepConfig, TransformConfig};
    use serde_json::{json, Map};
    use std::sync::Arc;

    fn transform_sub(id: &str, script: &str, inputs: &[(&str, serde_json::Value)]) -> Step {
        Step {
            id: id.to_string(),
            name: id.to_string(),
            inputs: inputs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
            outputs: vec![],
            dependencies: vec![],
            config: StepConfig::Transform(TransformConfig {
                script: script.to_string(),
            }),
        }
    }

    fn executors() -> StepExecutors {
        StepExecutors::new(
            Arc::new(MockProvider::new()),
            Arc::new(InMemoryPromptStore::new()),
        )
    }

    fn group_inputs(pairs: &[(&str, serde_json::Value)]) -> OutputMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn merges_sub_step_outputs() {
        let cfg = ParallelGroupConfig {
            steps: vec![
                transform_sub("first", "{ a: base + 1 }", &[]),
                transform_sub("second", "{ b: base + 2 }", &[]),
            ],
        };
        let ctx = ExecutionContext::new("wf", "exec", json!({}));
        let out = ParallelGroupExecutor
            .execute(&executors(), &cfg, &group_inputs(&[("base", json!(10))]), &ctx)
            .await
            .unwrap();

        assert_eq!(out["a"], json!(11));
        assert_eq!(out["b"], json!(12));
    }

    #[tokio::test]
    async fn later_sub_step_wins_key_collision() {
        let cfg = ParallelGroupConfig {
            steps: vec![
                transform_sub("first", "{ v: 1 }", &[]),
                transform_sub("second", "{ v: 2 }", &[]),
            ],
        };
        let ctx = ExecutionContext::new("wf", "exec", json!({}));
        let out = ParallelGroupExecutor
            .execute(&executors(), &cfg, &Map::new(), &ctx)
            .await
            .unwrap();

        assert_eq!(out["v"], json!(2));
    }

    #[tokio::test]
    async fn sub_step_overrides_group_inputs() {
        let cfg = ParallelGroupConfig {
            steps: vec![
                transform_sub("kept", "{ a: base }", &[]),
                transform_sub("overridden", "{ b: base }", &[("base", json!(99))]),
            ],
        };
        let ctx = ExecutionContext::new("wf", "exec", json!({}));
        let out = ParallelGroupExecutor
            .execute(&executors(), &cfg, &group_inputs(&[("base", json!(1))]), &ctx)
            .await
            .unwrap();

        assert_eq!(out["a"], json!(1));
        assert_eq!(out["b"], json!(99));
    }

    #[tokio::test]
    async fn override_inputs_resolve_references() {
        let mut ctx = ExecutionContext::new("wf", "exec", json!({}));
        ctx.record_outputs("earlier", json!({"n": 7}).as_object().cloned().unwrap());

        let cfg = ParallelGroupConfig {
            steps: vec![transform_sub(
                "uses-ref",
                "{ out: n * 2 }",
                &[("n", json!("$steps.earlier.n"))],
            )],
        };
        let out = ParallelGroupExecutor
            .execute(&executors(), &cfg, &Map::new(), &ctx)
            .await
            .unwrap();

        assert_eq!(out["out"], json!(14));
    }

    #[tokio::test]
    async fn aggregates_all_failure_messages() {
        let cfg = ParallelGroupConfig {
            steps: vec![
                transform_sub("ok", "{ fine: 1 }", &[]),
                transform_sub("bad-type", "42", &[]),
                transform_sub("bad-eval", "{ v: missing + 1 }", &[]),
            ],
        };
        let ctx = ExecutionContext::new("wf", "exec", json!({}));
        let err = ParallelGroupExecutor
            .execute(&executors(), &cfg, &Map::new(), &ctx)
            .await
            .unwrap_err();

        match err {
            StepError::Group(message) => {
                assert!(message.contains("bad-type"));
                assert!(message.contains("bad-eval"));
                assert!(!message.contains("ok:"));
            }
            other => panic!("expected group error, got {:?}", other),
        }
    }
}
