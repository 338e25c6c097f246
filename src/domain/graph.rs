//! Task graph
//!
//! Tasks declare the tasks they depend on. Running a task runs its
//! dependencies first, in declaration order, each exactly once per
//! invocation. Uses petgraph for storage and cycle detection.

use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

use super::task::{TaskName, TaskOutcome};

#[derive(Debug, Error, PartialEq)]
pub enum GraphError {
    #[error("Adding dependency would create a cycle: {0} -> {1}")]
    CycleDetected(TaskName, TaskName),

    #[error("Task not registered: {0}")]
    TaskNotFound(TaskName),

    #[error("Self-dependency not allowed: {0}")]
    SelfDependency(TaskName),
}

/// A directed acyclic graph of tasks
#[derive(Debug, Default)]
pub struct TaskGraph {
    /// Edges point from a dependency to its dependent
    graph: DiGraph<TaskName, ()>,

    node_map: HashMap<TaskName, NodeIndex>,

    /// Dependencies per task in declaration order
    declared: HashMap<TaskName, Vec<TaskName>>,
}

impl TaskGraph {
    /// Creates an empty task graph
    pub fn new() -> Self {
        Self::default()
    }

    /// The theme build graph: build needs css, watch needs build, zip needs css
    pub fn standard() -> Result<Self, GraphError> {
        let mut graph = Self::new();
        for task in TaskName::ALL {
            graph.add_task(task);
        }

        graph.add_dependency(TaskName::Build, TaskName::Css)?;
        graph.add_dependency(TaskName::Watch, TaskName::Build)?;
        graph.add_dependency(TaskName::Zip, TaskName::Css)?;

        Ok(graph)
    }

    /// Registers a task
    pub fn add_task(&mut self, task: TaskName) {
        if !self.node_map.contains_key(&task) {
            let idx = self.graph.add_node(task);
            self.node_map.insert(task, idx);
            self.declared.insert(task, Vec::new());
        }
    }

    /// Declares that `task` depends on `depends_on`
    pub fn add_dependency(&mut self, task: TaskName, depends_on: TaskName) -> Result<(), GraphError> {
        if task == depends_on {
            return Err(GraphError::SelfDependency(task));
        }

        let task_idx = *self.node_map.get(&task).ok_or(GraphError::TaskNotFound(task))?;
        let dep_idx = *self
            .node_map
            .get(&depends_on)
            .ok_or(GraphError::TaskNotFound(depends_on))?;

        if self.graph.find_edge(dep_idx, task_idx).is_some() {
            return Ok(());
        }

        let edge = self.graph.add_edge(dep_idx, task_idx, ());

        if is_cyclic_directed(&self.graph) {
            self.graph.remove_edge(edge);
            return Err(GraphError::CycleDetected(task, depends_on));
        }

        self.declared.entry(task).or_default().push(depends_on);
        Ok(())
    }

    /// Direct dependencies of a task, in declaration order
    pub fn dependencies(&self, task: TaskName) -> Vec<TaskName> {
        self.declared.get(&task).cloned().unwrap_or_default()
    }

    /// Tasks that directly depend on `task`
    pub fn dependents(&self, task: TaskName) -> Vec<TaskName> {
        let idx = match self.node_map.get(&task) {
            Some(idx) => *idx,
            None => return vec![],
        };

        let mut dependents: Vec<TaskName> = self
            .graph
            .neighbors_directed(idx, petgraph::Direction::Outgoing)
            .filter_map(|i| self.graph.node_weight(i).copied())
            .collect();
        dependents.sort();
        dependents
    }

    /// The order in which tasks run when `target` is invoked
    ///
    /// Dependencies come before dependents; a task shared by several
    /// dependents appears once, at its first position.
    pub fn execution_plan(&self, target: TaskName) -> Result<Vec<TaskName>, GraphError> {
        if !self.contains(target) {
            return Err(GraphError::TaskNotFound(target));
        }

        let mut plan = Vec::new();
        let mut visited = HashSet::new();
        self.visit(target, &mut visited, &mut plan);
        Ok(plan)
    }

    fn visit(&self, task: TaskName, visited: &mut HashSet<TaskName>, plan: &mut Vec<TaskName>) {
        if !visited.insert(task) {
            return;
        }
        for dep in self.dependencies(task) {
            self.visit(dep, visited, plan);
        }
        plan.push(task);
    }

    /// Runs `target` and its dependencies in sequence
    ///
    /// Execution stops after the first fatal outcome; partial outcomes let
    /// the remaining tasks run.
    pub fn execute<F>(&self, target: TaskName, mut body: F) -> Result<ExecutionReport, GraphError>
    where
        F: FnMut(TaskName) -> TaskOutcome,
    {
        let plan = self.execution_plan(target)?;
        let mut report = ExecutionReport::default();

        for task in plan {
            let outcome = body(task);
            let fatal = outcome.is_fatal();
            report.outcomes.push((task, outcome));
            if fatal {
                break;
            }
        }

        Ok(report)
    }

    /// Returns true if the graph contains the task
    pub fn contains(&self, task: TaskName) -> bool {
        self.node_map.contains_key(&task)
    }

    /// Returns the number of tasks in the graph
    pub fn len(&self) -> usize {
        self.node_map.len()
    }

    /// Returns true if the graph is empty
    pub fn is_empty(&self) -> bool {
        self.node_map.is_empty()
    }
}

/// Outcomes of one graph execution, in run order
#[derive(Debug, Default)]
pub struct ExecutionReport {
    pub outcomes: Vec<(TaskName, TaskOutcome)>,
}

impl ExecutionReport {
    /// The task that failed fatally, with its error
    pub fn fatal(&self) -> Option<(TaskName, &anyhow::Error)> {
        self.outcomes.iter().find_map(|(task, outcome)| match outcome {
            TaskOutcome::Fatal(err) => Some((*task, err)),
            _ => None,
        })
    }

    /// Total number of soft failures across all tasks
    pub fn soft_failures(&self) -> usize {
        self.outcomes
            .iter()
            .map(|(_, outcome)| match outcome {
                TaskOutcome::Partial { failures } => *failures,
                _ => 0,
            })
            .sum()
    }

    /// Tasks that ran, in order
    pub fn tasks(&self) -> Vec<TaskName> {
        self.outcomes.iter().map(|(task, _)| *task).collect()
    }
}
