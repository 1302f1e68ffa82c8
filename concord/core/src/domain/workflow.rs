// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Workflow Aggregate
//!
//! A [`Workflow`] orchestrates a set of existing tasks according to a
//! dependency DAG and a [`FailurePolicy`]. Edges express "task B starts only
//! after task A completes"; the engine starts every node whose dependencies
//! are satisfied, so independent branches proceed concurrently while
//! dependent branches are serialized.
//!
//! # Invariants
//!
//! - The graph is non-empty, references each task at most once, and edges
//!   only connect tasks in the workflow — enforced by [`Workflow::new`].
//! - The graph is acyclic — enforced by DFS at construction time.
//! - `state` moves `pending → running → {completed | failed}` only.
//! - A workflow is `completed` iff every required (non-skippable) node's
//!   task completed; under the `continue` policy, nodes downstream of a
//!   failure are recorded in `skipped` and never started.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, VecDeque};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::agent::AgentId;
use crate::domain::task::TaskId;

/// Unique identifier for a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowId(pub Uuid);

impl WorkflowId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WorkflowId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowState {
    Pending,
    Running,
    Completed,
    Failed,
}

impl WorkflowState {
    pub fn is_terminal(self) -> bool {
        matches!(self, WorkflowState::Completed | WorkflowState::Failed)
    }
}

impl std::fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WorkflowState::Pending => "pending",
            WorkflowState::Running => "running",
            WorkflowState::Completed => "completed",
            WorkflowState::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// What the engine does when a task in the workflow fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Fail the workflow immediately; start no further tasks.
    #[default]
    Abort,
    /// Keep running branches not downstream of the failure; the workflow
    /// still ends `failed` if a required task failed.
    Continue,
}

/// One node of the workflow graph: a task and the agent that executes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowTaskNode {
    pub task_id: TaskId,
    /// Agent the engine assigns the task to when the node becomes eligible.
    pub executor: AgentId,
    /// A skippable node's failure (or skip) does not fail the workflow.
    #[serde(default)]
    pub skippable: bool,
}

impl WorkflowTaskNode {
    pub fn new(task_id: TaskId, executor: AgentId) -> Self {
        Self { task_id, executor, skippable: false }
    }

    pub fn skippable(mut self) -> Self {
        self.skippable = true;
        self
    }
}

/// Dependency DAG over the workflow's tasks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowGraph {
    pub nodes: Vec<WorkflowTaskNode>,
    /// Edges `(from, to)`: `to` starts only after `from` completes.
    #[serde(default)]
    pub edges: Vec<(TaskId, TaskId)>,
}

impl WorkflowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_node(mut self, node: WorkflowTaskNode) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn with_edge(mut self, from: TaskId, to: TaskId) -> Self {
        self.edges.push((from, to));
        self
    }

    pub fn node(&self, task_id: TaskId) -> Option<&WorkflowTaskNode> {
        self.nodes.iter().find(|n| n.task_id == task_id)
    }

    pub fn contains(&self, task_id: TaskId) -> bool {
        self.node(task_id).is_some()
    }

    /// Direct dependencies of `task_id` (edge sources pointing at it).
    pub fn dependencies_of(&self, task_id: TaskId) -> Vec<TaskId> {
        self.edges
            .iter()
            .filter(|(_, to)| *to == task_id)
            .map(|(from, _)| *from)
            .collect()
    }

    /// Direct dependents of `task_id` (edge targets reached from it).
    pub fn dependents_of(&self, task_id: TaskId) -> Vec<TaskId> {
        self.edges
            .iter()
            .filter(|(from, _)| *from == task_id)
            .map(|(_, to)| *to)
            .collect()
    }

    /// Transitive closure of everything downstream of `task_id`.
    ///
    /// Used by the `continue` failure policy to decide which nodes can never
    /// start once `task_id` fails.
    pub fn downstream_of(&self, task_id: TaskId) -> BTreeSet<TaskId> {
        let mut downstream = BTreeSet::new();
        let mut queue: VecDeque<TaskId> = VecDeque::from(self.dependents_of(task_id));
        while let Some(next) = queue.pop_front() {
            if downstream.insert(next) {
                queue.extend(self.dependents_of(next));
            }
        }
        downstream
    }
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Workflow graph has no tasks")]
    EmptyGraph,

    #[error("Task {0} appears more than once in the workflow graph")]
    DuplicateTask(TaskId),

    #[error("Edge references task {0} which is not in the workflow")]
    EdgeEndpointMissing(TaskId),

    #[error("Workflow graph contains a dependency cycle")]
    CycleDetected,

    #[error("Illegal workflow transition {from} -> {to}")]
    InvalidState { from: WorkflowState, to: WorkflowState },
}

/// Workflow aggregate root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: WorkflowId,
    pub name: String,
    pub graph: WorkflowGraph,
    pub failure_policy: FailurePolicy,
    pub state: WorkflowState,
    /// Nodes that will never start because an upstream task failed
    /// (`continue` policy bookkeeping). Their task records stay `created`.
    pub skipped: BTreeSet<TaskId>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Workflow {
    /// Create a new workflow with validation.
    pub fn new(
        name: impl Into<String>,
        graph: WorkflowGraph,
        failure_policy: FailurePolicy,
    ) -> Result<Self, WorkflowError> {
        if graph.nodes.is_empty() {
            return Err(WorkflowError::EmptyGraph);
        }

        let mut seen = BTreeSet::new();
        for node in &graph.nodes {
            if !seen.insert(node.task_id) {
                return Err(WorkflowError::DuplicateTask(node.task_id));
            }
        }

        for (from, to) in &graph.edges {
            if !seen.contains(from) {
                return Err(WorkflowError::EdgeEndpointMissing(*from));
            }
            if !seen.contains(to) {
                return Err(WorkflowError::EdgeEndpointMissing(*to));
            }
        }

        Self::check_for_cycles(&graph)?;

        Ok(Self {
            id: WorkflowId::new(),
            name: name.into(),
            graph,
            failure_policy,
            state: WorkflowState::Pending,
            skipped: BTreeSet::new(),
            failure_reason: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        })
    }

    /// Validate the graph for circular dependencies (simple DFS).
    fn check_for_cycles(graph: &WorkflowGraph) -> Result<(), WorkflowError> {
        fn visit(
            current: TaskId,
            graph: &WorkflowGraph,
            visited: &mut HashMap<TaskId, bool>,
            rec_stack: &mut HashMap<TaskId, bool>,
        ) -> bool {
            visited.insert(current, true);
            rec_stack.insert(current, true);

            for next in graph.dependents_of(current) {
                if !visited.get(&next).copied().unwrap_or(false) {
                    if visit(next, graph, visited, rec_stack) {
                        return true;
                    }
                } else if rec_stack.get(&next).copied().unwrap_or(false) {
                    return true; // Cycle detected
                }
            }

            rec_stack.insert(current, false);
            false
        }

        let mut visited = HashMap::new();
        let mut rec_stack = HashMap::new();

        for node in &graph.nodes {
            if !visited.get(&node.task_id).copied().unwrap_or(false)
                && visit(node.task_id, graph, &mut visited, &mut rec_stack)
            {
                return Err(WorkflowError::CycleDetected);
            }
        }

        Ok(())
    }

    fn transition(&mut self, next: WorkflowState) -> Result<(), WorkflowError> {
        let legal = matches!(
            (self.state, next),
            (WorkflowState::Pending, WorkflowState::Running)
                | (WorkflowState::Running, WorkflowState::Completed)
                | (WorkflowState::Running, WorkflowState::Failed)
        );
        if !legal {
            return Err(WorkflowError::InvalidState { from: self.state, to: next });
        }
        self.state = next;
        Ok(())
    }

    pub fn start(&mut self) -> Result<(), WorkflowError> {
        self.transition(WorkflowState::Running)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    pub fn complete(&mut self) -> Result<(), WorkflowError> {
        self.transition(WorkflowState::Completed)?;
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), WorkflowError> {
        self.transition(WorkflowState::Failed)?;
        self.failure_reason = Some(reason.into());
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    pub fn mark_skipped(&mut self, task_id: TaskId) -> bool {
        self.skipped.insert(task_id)
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn task_ids(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.graph.nodes.iter().map(|n| n.task_id)
    }
}
