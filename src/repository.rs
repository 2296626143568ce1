//! Workflow definition persistence contract
//!
//! The engine only needs four operations over an opaque document store:
//! get-by-id-or-key, list, upsert, delete. The storage medium is the
//! collaborator's concern; the in-memory implementation backs tests and the
//! CLI.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::workflow::Workflow;

#[async_trait]
pub trait WorkflowRepository: Send + Sync {
    /// Look up by id, falling back to the human key (name).
    async fn get(&self, id_or_key: &str) -> Option<Arc<Workflow>>;

    async fn list(&self) -> Vec<Arc<Workflow>>;

    async fn upsert(&self, workflow: Workflow) -> Arc<Workflow>;

    /// Returns true when something was removed.
    async fn delete(&self, id: &str) -> bool;
}

/// In-process store keyed by workflow id.
#[derive(Default)]
pub struct InMemoryWorkflowRepository {
    workflows: DashMap<String, Arc<Workflow>>,
}

impl InMemoryWorkflowRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkflowRepository for InMemoryWorkflowRepository {
    async fn get(&self, id_or_key: &str) -> Option<Arc<Workflow>> {
        if let Some(found) = self.workflows.get(id_or_key) {
            return Some(Arc::clone(found.value()));
        }
        self.workflows
            .iter()
            .find(|entry| entry.value().name == id_or_key)
            .map(|entry| Arc::clone(entry.value()))
    }

    async fn list(&self) -> Vec<Arc<Workflow>> {
        let mut all: Vec<Arc<Workflow>> = self
            .workflows
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    async fn upsert(&self, workflow: Workflow) -> Arc<Workflow> {
        let stored = Arc::new(workflow);
        self.workflows
            .insert(stored.id.clone(), Arc::clone(&stored));
        stored
    }

    async fn delete(&self, id: &str) -> bool {
        self.workflows.remove(id).is_some()
    }
}
