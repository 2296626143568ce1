//! Dependency graph built from a workflow's steps
//!
//! Levels drive the wavefront scheduler: `level(step)` is the length of the
//! longest dependency chain ending at that step, so for every edge
//! (dependent → dependency), `level(dependency) < level(dependent)`.

use std::collections::HashMap;

use crate::error::EngineError;
use crate::workflow::Workflow;

/// Derived, never persisted. Nodes are step ids; edges point at
/// dependencies.
#[derive(Debug)]
pub struct DependencyGraph {
    /// Step ids in workflow declaration order.
    nodes: Vec<String>,
    /// Step id → its dependency ids.
    edges: HashMap<String, Vec<String>>,
    /// Step id → longest-chain level.
    levels: HashMap<String, usize>,
    max_level: usize,
}

/// Three-color DFS marking.
#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

impl DependencyGraph {
    /// Build and validate the graph: unique ids, dependency existence,
    /// acyclicity, levels.
    pub fn build(workflow: &Workflow) -> Result<Self, EngineError> {
        let mut edges: HashMap<String, Vec<String>> = HashMap::with_capacity(workflow.steps.len());
        let mut nodes: Vec<String> = Vec::with_capacity(workflow.steps.len());

        for step in &workflow.steps {
            if edges
                .insert(step.id.clone(), step.dependencies.clone())
                .is_some()
            {
                return Err(EngineError::DuplicateStepId(step.id.clone()));
            }
            nodes.push(step.id.clone());
        }

        for step in &workflow.steps {
            for dep in &step.dependencies {
                if !edges.contains_key(dep) {
                    return Err(EngineError::UnknownDependency {
                        step_id: step.id.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }

        let mut levels: HashMap<String, usize> = HashMap::with_capacity(nodes.len());
        let mut marks: HashMap<&str, Mark> =
            nodes.iter().map(|id| (id.as_str(), Mark::Unvisited)).collect();

        for id in &nodes {
            visit(id, &edges, &mut marks, &mut levels)?;
        }

        let max_level = levels.values().copied().max().unwrap_or(0);

        Ok(Self {
            nodes,
            edges,
            levels,
            max_level,
        })
    }

    pub fn level_of(&self, step_id: &str) -> Option<usize> {
        self.levels.get(step_id).copied()
    }

    pub fn max_level(&self) -> usize {
        self.max_level
    }

    /// Step ids at one level, in declaration order.
    pub fn steps_at_level(&self, level: usize) -> Vec<&str> {
        self.nodes
            .iter()
            .filter(|id| self.levels.get(id.as_str()) == Some(&level))
            .map(String::as_str)
            .collect()
    }

    pub fn dependencies_of(&self, step_id: &str) -> &[String] {
        self.edges.get(step_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Depth-first level computation. Revisiting an in-progress node means the
/// dependency relation loops back through it.
fn visit<'a>(
    id: &'a str,
    edges: &'a HashMap<String, Vec<String>>,
    marks: &mut HashMap<&'a str, Mark>,
    levels: &mut HashMap<String, usize>,
) -> Result<usize, EngineError> {
    match marks.get(id).copied().unwrap_or(Mark::Unvisited) {
        Mark::Done => return Ok(levels[id]),
        Mark::InProgress => {
            return Err(EngineError::CyclicDependency {
                step_id: id.to_string(),
            })
        }
        Mark::Unvisited => {}
    }

    marks.insert(id, Mark::InProgress);

    let mut level = 0;
    if let Some(deps) = edges.get(id) {
        for dep in deps {
            level = level.max(1 + visit(dep, edges, marks, levels)?);
        }
    }

    marks.insert(id, Mark::Done);
    levels.insert(id.to_string(), level);
    Ok(level)
}
