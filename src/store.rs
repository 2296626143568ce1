//! Execution store
//!
//! Process-wide registry of run records plus a bounded most-recent-first
//! history. One instance is constructed at process start and shared by
//! reference between the engine and whatever serves the monitoring surface.
//! All mutations are synchronized (sharded map + history mutex) because
//! concurrent runs update the store from a multithreaded runtime.

use std::collections::VecDeque;
use std::sync::Mutex;

use dashmap::DashMap;

use crate::execution::{ExecutionStatus, WorkflowExecution};

/// Default bounded-history capacity.
const DEFAULT_CAPACITY: usize = 100;

pub struct ExecutionStore {
    executions: DashMap<String, WorkflowExecution>,
    /// Execution ids, most recent first. Evicts oldest past capacity.
    history: Mutex<VecDeque<String>>,
    capacity: usize,
}

impl Default for ExecutionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            executions: DashMap::new(),
            history: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
        }
    }

    /// Insert a new record; evicts the oldest when past capacity.
    pub fn insert(&self, execution: WorkflowExecution) {
        let id = execution.id.clone();
        self.executions.insert(id.clone(), execution);

        let mut history = self.history.lock().unwrap();
        history.push_front(id);
        while history.len() > self.capacity {
            if let Some(evicted) = history.pop_back() {
                self.executions.remove(&evicted);
            }
        }
    }

    /// Mutate a stored record in place. Returns false for unknown ids.
    pub fn update<F>(&self, id: &str, mutate: F) -> bool
    where
        F: FnOnce(&mut WorkflowExecution),
    {
        match self.executions.get_mut(id) {
            Some(mut entry) => {
                mutate(entry.value_mut());
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: &str) -> Option<WorkflowExecution> {
        self.executions.get(id).map(|e| e.value().clone())
    }

    /// Most-recent-first page of records.
    pub fn list(&self, offset: usize, limit: usize) -> Vec<WorkflowExecution> {
        let history = self.history.lock().unwrap();
        history
            .iter()
            .skip(offset)
            .take(limit)
            .filter_map(|id| self.get(id))
            .collect()
    }

    /// All records for one workflow, most recent first.
    pub fn for_workflow(&self, workflow_id: &str) -> Vec<WorkflowExecution> {
        let history = self.history.lock().unwrap();
        history
            .iter()
            .filter_map(|id| self.get(id))
            .filter(|e| e.workflow_id == workflow_id)
            .collect()
    }

    /// Currently running records.
    pub fn active(&self) -> Vec<WorkflowExecution> {
        let history = self.history.lock().unwrap();
        history
            .iter()
            .filter_map(|id| self.get(id))
            .filter(WorkflowExecution::is_active)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.executions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executions.is_empty()
    }

    /// Aggregate counters over everything still retained.
    pub fn stats(&self) -> ExecutionStats {
        let mut stats = ExecutionStats::default();
        let mut duration_total_ms: i64 = 0;

        for entry in self.executions.iter() {
            let execution = entry.value();
            stats.total += 1;
            match execution.status {
                ExecutionStatus::Running => stats.running += 1,
                ExecutionStatus::Completed => {
                    stats.completed += 1;
                    duration_total_ms += execution.duration_ms().unwrap_or(0);
                }
                ExecutionStatus::Failed => stats.failed += 1,
                ExecutionStatus::Cancelled => stats.cancelled += 1,
            }
        }

        let finished = stats.completed + stats.failed + stats.cancelled;
        if finished > 0 {
            stats.success_rate = stats.completed as f64 * 100.0 / finished as f64;
        }
        if stats.completed > 0 {
            stats.avg_duration_ms = duration_total_ms as f64 / stats.completed as f64;
        }
        stats
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ExecutionStats {
    pub total: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// Completed over finished runs, as a percentage.
    pub success_rate: f64,
    /// Mean wall-clock duration of completed runs.
    pub avg_duration_ms: f64,
}
