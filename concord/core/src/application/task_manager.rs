// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Task Manager
//!
//! Owns the task lifecycle: `created → assigned → in_progress` and on to
//! one of the terminal states. Every mutation is optimistic: callers pass
//! the version they last read, and a compare-and-swap against the store
//! decides the winner when writers race. The loser gets
//! [`TaskManagerError::Conflict`] and must re-read before retrying.
//!
//! Assignment additionally gates on dependencies: a task with an incomplete
//! dependency cannot leave `created`. Failed tasks stay failed; the record
//! is the durable evidence, and retries happen as new tasks.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info};

use crate::domain::agent::AgentId;
use crate::domain::events::TaskEvent;
use crate::domain::store::{StoreError, TaskStore};
use crate::domain::task::{Task, TaskError, TaskFilter, TaskId, TaskSpec, TaskState};
use crate::infrastructure::event_bus::EventBus;

#[derive(Debug, Error)]
pub enum TaskManagerError {
    #[error("Task not found: {0}")]
    NotFound(TaskId),

    #[error("Illegal task transition {from} -> {to}")]
    InvalidState { from: TaskState, to: TaskState },

    #[error("Task {task} depends on {dependency}, which has not completed")]
    DependencyNotSatisfied { task: TaskId, dependency: TaskId },

    #[error("Task {task} version conflict: expected {expected}, found {actual}")]
    Conflict {
        task: TaskId,
        expected: u64,
        actual: u64,
    },

    #[error(transparent)]
    Store(StoreError),
}

impl From<TaskError> for TaskManagerError {
    fn from(err: TaskError) -> Self {
        match err {
            TaskError::InvalidState { from, to } => TaskManagerError::InvalidState { from, to },
        }
    }
}

/// Attribute a raw store error to the task being operated on.
fn store_err(task: TaskId, err: StoreError) -> TaskManagerError {
    match err {
        StoreError::NotFound(_) => TaskManagerError::NotFound(task),
        StoreError::Conflict { expected, actual } => TaskManagerError::Conflict {
            task,
            expected,
            actual,
        },
        other => TaskManagerError::Store(other),
    }
}

/// Task lifecycle service with optimistic concurrency.
pub struct TaskManager {
    store: Arc<dyn TaskStore>,
    event_bus: EventBus,
}

impl TaskManager {
    pub fn new(store: Arc<dyn TaskStore>, event_bus: EventBus) -> Self {
        Self { store, event_bus }
    }

    /// Create a task. Every declared dependency must already exist.
    pub async fn create_task(&self, spec: TaskSpec) -> Result<Task, TaskManagerError> {
        for dep in &spec.depends_on {
            if self
                .store
                .get(*dep)
                .await
                .map_err(TaskManagerError::Store)?
                .is_none()
            {
                return Err(TaskManagerError::NotFound(*dep));
            }
        }

        let task = Task::new(spec);
        self.store
            .insert(&task)
            .await
            .map_err(|e| store_err(task.id, e))?;

        info!(task_id = %task.id, name = %task.name, "Task created");
        self.event_bus.publish_task_event(TaskEvent::TaskCreated {
            task_id: task.id,
            name: task.name.clone(),
            depends_on: task.depends_on.clone(),
            created_at: task.created_at,
        });
        Ok(task)
    }

    /// Claim a task for an agent (`created → assigned`).
    ///
    /// Fails `Conflict` if `expected_version` is no longer current — losers
    /// of an assignment race land here whether they lose at the version
    /// precheck or at the store's compare-and-swap. Fails
    /// `DependencyNotSatisfied` naming the first unmet dependency.
    pub async fn assign_task(
        &self,
        task_id: TaskId,
        agent_id: AgentId,
        expected_version: u64,
    ) -> Result<Task, TaskManagerError> {
        let mut task = self.load(task_id).await?;
        self.check_version(&task, expected_version)?;

        for dep in &task.depends_on {
            let satisfied = self
                .store
                .get(*dep)
                .await
                .map_err(TaskManagerError::Store)?
                .map(|d| d.state == TaskState::Completed)
                .unwrap_or(false);
            if !satisfied {
                return Err(TaskManagerError::DependencyNotSatisfied {
                    task: task_id,
                    dependency: *dep,
                });
            }
        }

        task.assign(agent_id)?;
        self.store
            .compare_and_swap(expected_version, &task)
            .await
            .map_err(|e| store_err(task_id, e))?;

        info!(task_id = %task_id, agent_id = %agent_id, "Task assigned");
        self.event_bus.publish_task_event(TaskEvent::TaskAssigned {
            task_id,
            agent_id,
            version: task.version,
            assigned_at: Utc::now(),
        });
        Ok(task)
    }

    /// Apply a bare state transition (`in_progress`, terminal states).
    ///
    /// `assigned` is not a valid target here; claiming a task requires an
    /// agent and goes through [`assign_task`](TaskManager::assign_task).
    pub async fn update_state(
        &self,
        task_id: TaskId,
        new_state: TaskState,
        expected_version: u64,
    ) -> Result<Task, TaskManagerError> {
        let mut task = self.load(task_id).await?;
        self.check_version(&task, expected_version)?;

        if new_state == TaskState::Assigned {
            return Err(TaskManagerError::InvalidState {
                from: task.state,
                to: new_state,
            });
        }

        task.set_state(new_state)?;
        self.store
            .compare_and_swap(expected_version, &task)
            .await
            .map_err(|e| store_err(task_id, e))?;

        debug!(task_id = %task_id, state = %new_state, "Task state updated");
        self.publish_transition(&task);
        Ok(task)
    }

    /// Record successful completion along with the task's result payload.
    pub async fn complete_task(
        &self,
        task_id: TaskId,
        result: serde_json::Value,
        expected_version: u64,
    ) -> Result<Task, TaskManagerError> {
        let mut task = self.load(task_id).await?;
        self.check_version(&task, expected_version)?;

        task.complete(result)?;
        self.store
            .compare_and_swap(expected_version, &task)
            .await
            .map_err(|e| store_err(task_id, e))?;

        info!(task_id = %task_id, "Task completed");
        self.event_bus.publish_task_event(TaskEvent::TaskCompleted {
            task_id,
            version: task.version,
            completed_at: Utc::now(),
        });
        Ok(task)
    }

    /// Record failure with its reason. The record is permanent; recreate the
    /// work as a new task to retry.
    pub async fn fail_task(
        &self,
        task_id: TaskId,
        reason: impl Into<String>,
        expected_version: u64,
    ) -> Result<Task, TaskManagerError> {
        let reason = reason.into();
        let mut task = self.load(task_id).await?;
        self.check_version(&task, expected_version)?;

        task.fail(reason.clone())?;
        self.store
            .compare_and_swap(expected_version, &task)
            .await
            .map_err(|e| store_err(task_id, e))?;

        info!(task_id = %task_id, reason = %reason, "Task failed");
        self.event_bus.publish_task_event(TaskEvent::TaskFailed {
            task_id,
            reason: Some(reason),
            version: task.version,
            failed_at: Utc::now(),
        });
        Ok(task)
    }

    /// Cancel a running task (`in_progress → cancelled` only).
    pub async fn cancel_task(
        &self,
        task_id: TaskId,
        expected_version: u64,
    ) -> Result<Task, TaskManagerError> {
        let mut task = self.load(task_id).await?;
        self.check_version(&task, expected_version)?;

        task.cancel()?;
        self.store
            .compare_and_swap(expected_version, &task)
            .await
            .map_err(|e| store_err(task_id, e))?;

        info!(task_id = %task_id, "Task cancelled");
        self.event_bus.publish_task_event(TaskEvent::TaskCancelled {
            task_id,
            version: task.version,
            cancelled_at: Utc::now(),
        });
        Ok(task)
    }

    pub async fn get_task(&self, task_id: TaskId) -> Result<Task, TaskManagerError> {
        self.load(task_id).await
    }

    /// List tasks matching `filter`, oldest first.
    pub async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>, TaskManagerError> {
        let mut tasks: Vec<Task> = self
            .store
            .list()
            .await
            .map_err(TaskManagerError::Store)?
            .into_iter()
            .filter(|t| filter.matches(t))
            .collect();
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(tasks)
    }

    /// Remove a task record entirely. Tasks are otherwise retained in their
    /// terminal state indefinitely.
    pub async fn purge_task(&self, task_id: TaskId) -> Result<(), TaskManagerError> {
        self.load(task_id).await?;
        self.store
            .remove(task_id)
            .await
            .map_err(|e| store_err(task_id, e))?;
        info!(task_id = %task_id, "Task purged");
        Ok(())
    }

    async fn load(&self, task_id: TaskId) -> Result<Task, TaskManagerError> {
        self.store
            .get(task_id)
            .await
            .map_err(TaskManagerError::Store)?
            .ok_or(TaskManagerError::NotFound(task_id))
    }

    /// Version precheck ahead of the domain transition, so a racer holding
    /// a stale version sees `Conflict` rather than `InvalidState` even when
    /// it reads after the winner has already advanced the task.
    fn check_version(&self, task: &Task, expected_version: u64) -> Result<(), TaskManagerError> {
        if task.version != expected_version {
            return Err(TaskManagerError::Conflict {
                task: task.id,
                expected: expected_version,
                actual: task.version,
            });
        }
        Ok(())
    }

    fn publish_transition(&self, task: &Task) {
        let event = match task.state {
            TaskState::InProgress => TaskEvent::TaskStarted {
                task_id: task.id,
                version: task.version,
                started_at: Utc::now(),
            },
            TaskState::Completed => TaskEvent::TaskCompleted {
                task_id: task.id,
                version: task.version,
                completed_at: Utc::now(),
            },
            TaskState::Failed => TaskEvent::TaskFailed {
                task_id: task.id,
                reason: task.failure_reason.clone(),
                version: task.version,
                failed_at: Utc::now(),
            },
            TaskState::Cancelled => TaskEvent::TaskCancelled {
                task_id: task.id,
                version: task.version,
                cancelled_at: Utc::now(),
            },
            // created and assigned have dedicated publishers
            TaskState::Created | TaskState::Assigned => return,
        };
        self.event_bus.publish_task_event(event);
    }
}
