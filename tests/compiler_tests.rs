//! Compile-then-run tests: a canvas graph through the compiler and straight
//! into the engine.

use std::sync::Arc;

use serde_json::json;
use strand::compiler::{self, CanvasGraph};
use strand::execution::ExecutionStatus;
use strand::provider::{InMemoryPromptStore, MockProvider};
use strand::repository::{InMemoryWorkflowRepository, WorkflowRepository};
use strand::store::ExecutionStore;
use strand::{Engine, StepExecutors};

fn canvas(raw: serde_json::Value) -> CanvasGraph {
    serde_json::from_value(raw).expect("canvas fixture parses")
}

#[tokio::test]
async fn compiled_graph_executes_end_to_end() {
    let graph = canvas(json!({
        "id": "wf-ideas",
        "name": "Video ideas",
        "nodes": [
            {
                "id": "seed",
                "type": "transform",
                "config": {"script": "{ value: inputs.topic }", "outputs": ["value"]}
            },
            {
                "id": "write",
                "type": "llm-completion",
                "config": {"prompt": "Ideas about {{payload}}"}
            },
            {
                "id": "final",
                "type": "output",
                "config": {}
            }
        ],
        "connections": [
            {"source": "seed", "target": "write"},
            {"source": "write", "target": "final"}
        ]
    }));

    let workflow = compiler::compile(&graph).unwrap();
    assert_eq!(workflow.id, "wf-ideas");

    let repository = InMemoryWorkflowRepository::new();
    repository.upsert(workflow).await;
    let provider = Arc::new(MockProvider::with_responses(vec![
        "1. Hooks\n2. Pacing".to_string(),
    ]));
    let engine = Engine::new(
        Arc::new(repository),
        Arc::new(StepExecutors::new(
            provider.clone(),
            Arc::new(InMemoryPromptStore::new()),
        )),
        Arc::new(ExecutionStore::new()),
    );

    let execution = engine
        .execute_workflow("wf-ideas", json!({"topic": "retention"}))
        .await
        .unwrap();

    assert_eq!(execution.status, ExecutionStatus::Completed);
    // The wired prompt carried the upstream output into the template
    assert_eq!(
        provider.requests()[0].messages[0].content,
        "Ideas about retention"
    );
    // The pass-through output node republishes the completion
    assert_eq!(
        execution.step_results["final"]["value"],
        json!("1. Hooks\n2. Pacing")
    );
}

#[tokio::test]
async fn compiled_dependencies_match_connections() {
    let graph = canvas(json!({
        "id": "wf-fan",
        "name": "Fan in",
        "nodes": [
            {"id": "a", "type": "transform", "config": {"script": "{ value: 1 }"}},
            {"id": "b", "type": "transform", "config": {"script": "{ value: 2 }"}},
            {"id": "join", "type": "merge", "config": {}}
        ],
        "connections": [
            {"source": "a", "target": "join"},
            {"source": "b", "target": "join"}
        ]
    }));

    let workflow = compiler::compile(&graph).unwrap();
    let join = workflow.step("join").unwrap();
    assert_eq!(join.dependencies, vec!["a", "b"]);

    // And the engine agrees the compiled workflow is runnable
    let repository = InMemoryWorkflowRepository::new();
    repository.upsert(workflow).await;
    let engine = Engine::new(
        Arc::new(repository),
        Arc::new(StepExecutors::new(
            Arc::new(MockProvider::new()),
            Arc::new(InMemoryPromptStore::new()),
        )),
        Arc::new(ExecutionStore::new()),
    );
    let execution = engine.execute_workflow("wf-fan", json!({})).await.unwrap();

    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert_eq!(execution.step_results["join"]["value"], json!([1, 2]));
}

#[test]
fn cyclic_canvas_never_reaches_the_engine() {
    let graph = canvas(json!({
        "name": "Loop",
        "nodes": [
            {"id": "a", "type": "transform", "config": {}},
            {"id": "b", "type": "transform", "config": {}}
        ],
        "connections": [
            {"source": "a", "target": "b"},
            {"source": "b", "target": "a"}
        ]
    }));

    let err = compiler::compile(&graph).unwrap_err();
    assert!(err.to_string().contains("cycle"));
}
