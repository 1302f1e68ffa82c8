// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Task Aggregate
//!
//! A [`Task`] is the unit of work tracked through an explicit lifecycle state
//! machine:
//!
//! ```text
//! created ──> assigned ──> in_progress ──┬──> completed
//!                                        ├──> failed
//!                                        └──> cancelled
//! ```
//!
//! ## Invariants
//!
//! - A task is in exactly one [`TaskState`] at any instant; only the edges
//!   above are legal, and every other transition attempt fails
//!   [`TaskError::InvalidState`].
//! - `created → assigned` additionally requires every dependency task to be
//!   `completed` — enforced by the `TaskManager`, not here, because it needs
//!   the other tasks' records.
//! - `version` increases by exactly one per successful transition and is the
//!   basis of the compare-and-swap protocol in
//!   [`crate::domain::store::TaskStore`]. Two racing writers with the same
//!   `expected_version` produce exactly one winner.
//! - `failed` is terminal. Retrying failed work means creating a new task
//!   with a new id; versions never reset.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::agent::AgentId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskId(pub Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Created,
    Assigned,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl TaskState {
    /// Whether `self -> next` is an edge of the legal lifecycle graph.
    pub fn can_transition_to(self, next: TaskState) -> bool {
        use TaskState::*;
        matches!(
            (self, next),
            (Created, Assigned)
                | (Assigned, InProgress)
                | (InProgress, Completed)
                | (InProgress, Failed)
                | (InProgress, Cancelled)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed | TaskState::Cancelled)
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskState::Created => "created",
            TaskState::Assigned => "assigned",
            TaskState::InProgress => "in_progress",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
            TaskState::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

/// Creation input for a task; everything the caller decides up front.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: TaskPriority,
    /// Tasks that must be `completed` before this one can be assigned.
    #[serde(default)]
    pub depends_on: Vec<TaskId>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl TaskSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn depends_on(mut self, task_id: TaskId) -> Self {
        self.depends_on.push(task_id);
        self
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    pub description: String,
    pub priority: TaskPriority,
    pub state: TaskState,
    pub depends_on: Vec<TaskId>,
    pub assigned_to: Option<AgentId>,
    pub metadata: HashMap<String, serde_json::Value>,
    pub result: Option<serde_json::Value>,
    pub failure_reason: Option<String>,
    /// Optimistic concurrency counter; starts at 1, bumped per transition.
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Illegal task transition {from} -> {to}")]
    InvalidState { from: TaskState, to: TaskState },
}

impl Task {
    pub fn new(spec: TaskSpec) -> Self {
        let now = Utc::now();
        Self {
            id: TaskId::new(),
            name: spec.name,
            description: spec.description,
            priority: spec.priority,
            state: TaskState::Created,
            depends_on: spec.depends_on,
            assigned_to: None,
            metadata: spec.metadata,
            result: None,
            failure_reason: None,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    fn transition(&mut self, next: TaskState) -> Result<(), TaskError> {
        if !self.state.can_transition_to(next) {
            return Err(TaskError::InvalidState { from: self.state, to: next });
        }
        self.state = next;
        self.version += 1;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn assign(&mut self, agent_id: AgentId) -> Result<(), TaskError> {
        self.transition(TaskState::Assigned)?;
        self.assigned_to = Some(agent_id);
        Ok(())
    }

    pub fn start(&mut self) -> Result<(), TaskError> {
        self.transition(TaskState::InProgress)
    }

    pub fn complete(&mut self, result: serde_json::Value) -> Result<(), TaskError> {
        self.transition(TaskState::Completed)?;
        self.result = Some(result);
        Ok(())
    }

    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), TaskError> {
        self.transition(TaskState::Failed)?;
        self.failure_reason = Some(reason.into());
        Ok(())
    }

    pub fn cancel(&mut self) -> Result<(), TaskError> {
        self.transition(TaskState::Cancelled)
    }

    /// Apply a bare state change without payload, for `update_state`.
    pub fn set_state(&mut self, next: TaskState) -> Result<(), TaskError> {
        self.transition(next)
    }
}

/// Filter for `list_tasks`; unset fields match everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskFilter {
    pub state: Option<TaskState>,
    pub assigned_to: Option<AgentId>,
    pub name_contains: Option<String>,
}

impl TaskFilter {
    pub fn matches(&self, task: &Task) -> bool {
        if let Some(state) = self.state {
            if task.state != state {
                return false;
            }
        }
        if let Some(agent) = self.assigned_to {
            if task.assigned_to != Some(agent) {
                return false;
            }
        }
        if let Some(needle) = &self.name_contains {
            if !task.name.contains(needle.as_str()) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_legal_lifecycle_path() {
        let mut task = Task::new(TaskSpec::new("build"));
        assert_eq!(task.state, TaskState::Created);
        assert_eq!(task.version, 1);

        task.assign(AgentId::new()).unwrap();
        task.start().unwrap();
        task.complete(json!({"ok": true})).unwrap();

        assert_eq!(task.state, TaskState::Completed);
        assert_eq!(task.version, 4);
        assert!(task.state.is_terminal());
    }

    #[test]
    fn test_illegal_edges_rejected() {
        let mut task = Task::new(TaskSpec::new("build"));

        // created -> in_progress skips assignment
        assert!(matches!(
            task.start(),
            Err(TaskError::InvalidState { from: TaskState::Created, to: TaskState::InProgress })
        ));

        // created -> completed skips everything
        assert!(task.complete(json!(null)).is_err());

        // terminal states accept nothing further
        task.assign(AgentId::new()).unwrap();
        task.start().unwrap();
        task.fail("boom").unwrap();
        assert!(task.set_state(TaskState::InProgress).is_err());
        assert!(task.cancel().is_err());
    }

    #[test]
    fn test_cancel_only_from_in_progress() {
        let mut task = Task::new(TaskSpec::new("build"));
        assert!(task.cancel().is_err());

        task.assign(AgentId::new()).unwrap();
        assert!(task.cancel().is_err());

        task.start().unwrap();
        assert!(task.cancel().is_ok());
        assert_eq!(task.state, TaskState::Cancelled);
    }

    #[test]
    fn test_failure_reason_recorded() {
        let mut task = Task::new(TaskSpec::new("build"));
        task.assign(AgentId::new()).unwrap();
        task.start().unwrap();
        task.fail("dependency host unreachable").unwrap();

        assert_eq!(task.failure_reason.as_deref(), Some("dependency host unreachable"));
        assert!(task.result.is_none());
    }

    #[test]
    fn test_filter_matching() {
        let agent = AgentId::new();
        let mut task = Task::new(TaskSpec::new("compile-report"));
        task.assign(agent).unwrap();

        let by_state = TaskFilter { state: Some(TaskState::Assigned), ..Default::default() };
        assert!(by_state.matches(&task));

        let by_agent = TaskFilter { assigned_to: Some(agent), ..Default::default() };
        assert!(by_agent.matches(&task));

        let by_name = TaskFilter { name_contains: Some("report".into()), ..Default::default() };
        assert!(by_name.matches(&task));

        let wrong = TaskFilter { state: Some(TaskState::Completed), ..Default::default() };
        assert!(!wrong.matches(&task));
    }
}
