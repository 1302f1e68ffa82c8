// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Workflow Engine
//!
//! Drives workflows over existing tasks. Starting a workflow kicks off an
//! evaluation loop: every node whose dependencies are all completed is
//! assigned to its executor agent and moved to `in_progress`; an observer
//! task subscribed to the event bus re-evaluates whenever a member task
//! completes, so independent branches run concurrently and joins wait for
//! all their inputs.
//!
//! # Failure policies
//!
//! - `abort`: the first task failure fails the workflow. Tasks already
//!   running are left to finish, but nothing new starts.
//! - `continue`: branches not downstream of the failure keep going. Nodes
//!   downstream of it are marked skipped and never start. The workflow
//!   still ends `failed` if any required (non-skippable) node's task did
//!   not complete.
//!
//! # Concurrency
//!
//! All evaluation for one workflow runs under a per-workflow mutex, so the
//! observer and manual calls never interleave their read-evaluate-write
//! cycles. Task mutations still go through the task manager's
//! compare-and-swap; an assignment lost to an outside claimant is absorbed
//! as a debug-level no-op rather than an error.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use futures::future;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::application::task_manager::{TaskManager, TaskManagerError};
use crate::domain::events::{TaskEvent, WorkflowEvent};
use crate::domain::store::{StoreError, WorkflowStore};
use crate::domain::task::{TaskId, TaskState};
use crate::domain::workflow::{
    FailurePolicy, Workflow, WorkflowError, WorkflowGraph, WorkflowId, WorkflowState,
    WorkflowTaskNode,
};
use crate::infrastructure::event_bus::{
    ConcordEvent, EventBus, EventBusError, EventReceiver, WorkflowEventReceiver,
};

#[derive(Debug, Error)]
pub enum WorkflowEngineError {
    #[error("Workflow not found: {0}")]
    NotFound(WorkflowId),

    #[error("Workflow references unknown task: {0}")]
    TaskNotFound(TaskId),

    #[error(transparent)]
    Invalid(#[from] WorkflowError),

    #[error(transparent)]
    Task(TaskManagerError),

    #[error(transparent)]
    Store(StoreError),
}

impl From<TaskManagerError> for WorkflowEngineError {
    fn from(err: TaskManagerError) -> Self {
        match err {
            TaskManagerError::NotFound(task_id) => WorkflowEngineError::TaskNotFound(task_id),
            other => WorkflowEngineError::Task(other),
        }
    }
}

/// Orchestrates task DAGs according to their failure policy.
pub struct WorkflowEngine {
    workflows: Arc<dyn WorkflowStore>,
    task_manager: Arc<TaskManager>,
    event_bus: EventBus,
    /// Serializes evaluation per workflow; see module docs.
    evaluation_locks: DashMap<WorkflowId, Arc<Mutex<()>>>,
}

impl WorkflowEngine {
    pub fn new(
        workflows: Arc<dyn WorkflowStore>,
        task_manager: Arc<TaskManager>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            workflows,
            task_manager,
            event_bus,
            evaluation_locks: DashMap::new(),
        }
    }

    /// Validate and persist a new workflow over existing tasks.
    pub async fn create_workflow(
        &self,
        name: impl Into<String>,
        graph: WorkflowGraph,
        failure_policy: FailurePolicy,
    ) -> Result<Workflow, WorkflowEngineError> {
        for node in &graph.nodes {
            self.task_manager.get_task(node.task_id).await?;
        }

        let workflow = Workflow::new(name, graph, failure_policy)?;
        self.workflows
            .put(&workflow)
            .await
            .map_err(WorkflowEngineError::Store)?;

        info!(
            workflow_id = %workflow.id,
            name = %workflow.name,
            tasks = workflow.graph.nodes.len(),
            "Workflow created"
        );
        self.event_bus.publish_workflow_event(WorkflowEvent::WorkflowCreated {
            workflow_id: workflow.id,
            name: workflow.name.clone(),
            task_count: workflow.graph.nodes.len(),
            created_at: workflow.created_at,
        });
        Ok(workflow)
    }

    /// Start a workflow: transition it to `running`, attach the observer
    /// that reacts to member-task events, and run the first evaluation.
    pub async fn start_workflow(
        self: &Arc<Self>,
        workflow_id: WorkflowId,
    ) -> Result<Workflow, WorkflowEngineError> {
        let lock = self.lock_for(workflow_id);
        let _guard = lock.lock().await;

        let mut workflow = self.load(workflow_id).await?;
        workflow.start()?;
        self.workflows
            .put(&workflow)
            .await
            .map_err(WorkflowEngineError::Store)?;

        info!(workflow_id = %workflow_id, "Workflow started");
        self.event_bus.publish_workflow_event(WorkflowEvent::WorkflowStarted {
            workflow_id,
            started_at: Utc::now(),
        });

        // Subscribe before the first evaluation so completions of tasks we
        // are about to start cannot slip past the observer.
        let members: BTreeSet<TaskId> = workflow.task_ids().collect();
        let receiver = self.event_bus.subscribe();
        tokio::spawn(Arc::clone(self).observe(workflow_id, members, receiver));

        self.evaluate_inner(&mut workflow).await?;
        Ok(workflow)
    }

    /// Re-evaluate a workflow: start every eligible node, then check for
    /// overall completion. Harmless to call on a terminal workflow.
    pub async fn evaluate(&self, workflow_id: WorkflowId) -> Result<(), WorkflowEngineError> {
        let lock = self.lock_for(workflow_id);
        let _guard = lock.lock().await;
        let mut workflow = self.load(workflow_id).await?;
        self.evaluate_inner(&mut workflow).await
    }

    pub async fn get_workflow(
        &self,
        workflow_id: WorkflowId,
    ) -> Result<Workflow, WorkflowEngineError> {
        self.load(workflow_id).await
    }

    /// All workflows, oldest first.
    pub async fn list_workflows(&self) -> Result<Vec<Workflow>, WorkflowEngineError> {
        let mut workflows = self
            .workflows
            .list()
            .await
            .map_err(WorkflowEngineError::Store)?;
        workflows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.0.cmp(&b.id.0)));
        Ok(workflows)
    }

    /// Follow one workflow's events as they happen.
    pub fn stream_events(&self, workflow_id: WorkflowId) -> WorkflowEventReceiver {
        self.event_bus.subscribe_workflow(workflow_id)
    }

    /// Event loop driving one running workflow, spawned by `start_workflow`.
    async fn observe(
        self: Arc<Self>,
        workflow_id: WorkflowId,
        members: BTreeSet<TaskId>,
        mut receiver: EventReceiver,
    ) {
        loop {
            match receiver.recv().await {
                Ok(ConcordEvent::Task(TaskEvent::TaskCompleted { task_id, .. }))
                    if members.contains(&task_id) =>
                {
                    if let Err(e) = self.evaluate(workflow_id).await {
                        warn!(workflow_id = %workflow_id, "Evaluation failed: {}", e);
                    }
                }
                Ok(ConcordEvent::Task(TaskEvent::TaskFailed { task_id, reason, .. }))
                    if members.contains(&task_id) =>
                {
                    if let Err(e) = self.handle_task_failed(workflow_id, task_id, reason).await {
                        warn!(workflow_id = %workflow_id, "Failure handling failed: {}", e);
                    }
                }
                Ok(ConcordEvent::Task(TaskEvent::TaskCancelled { task_id, .. }))
                    if members.contains(&task_id) =>
                {
                    // A cancelled member can never complete; same consequences
                    // as a failure for everything downstream of it.
                    let reason = Some("task cancelled".to_string());
                    if let Err(e) = self.handle_task_failed(workflow_id, task_id, reason).await {
                        warn!(workflow_id = %workflow_id, "Failure handling failed: {}", e);
                    }
                }
                Ok(_) => {}
                Err(EventBusError::Lagged(n)) => {
                    warn!(
                        workflow_id = %workflow_id,
                        missed = n,
                        "Observer lagged; resynchronizing from task state"
                    );
                    if let Err(e) = self.resync(workflow_id).await {
                        warn!(workflow_id = %workflow_id, "Resync failed: {}", e);
                    }
                }
                Err(_) => break,
            }

            match self.load(workflow_id).await {
                Ok(workflow) if workflow.is_terminal() => break,
                Ok(_) => {}
                Err(_) => break,
            }
        }
        debug!(workflow_id = %workflow_id, "Workflow observer stopped");
    }

    /// React to a member task that failed (or was cancelled).
    async fn handle_task_failed(
        &self,
        workflow_id: WorkflowId,
        task_id: TaskId,
        reason: Option<String>,
    ) -> Result<(), WorkflowEngineError> {
        let lock = self.lock_for(workflow_id);
        let _guard = lock.lock().await;

        let mut workflow = self.load(workflow_id).await?;
        if workflow.state != WorkflowState::Running {
            return Ok(());
        }

        self.event_bus.publish_workflow_event(WorkflowEvent::WorkflowTaskFailed {
            workflow_id,
            task_id,
            reason: reason.clone(),
            failed_at: Utc::now(),
        });
        self.apply_failure_policy(&mut workflow, task_id, reason).await
    }

    /// Recover after dropped events: replay failure consequences from task
    /// state, then evaluate. Effects already applied are not repeated.
    async fn resync(&self, workflow_id: WorkflowId) -> Result<(), WorkflowEngineError> {
        let lock = self.lock_for(workflow_id);
        let _guard = lock.lock().await;

        let mut workflow = self.load(workflow_id).await?;
        if workflow.state != WorkflowState::Running {
            return Ok(());
        }

        for task_id in workflow.task_ids().collect::<Vec<_>>() {
            let task = self.task_manager.get_task(task_id).await?;
            match task.state {
                TaskState::Failed | TaskState::Cancelled => {
                    let reason = task.failure_reason.clone();
                    self.apply_failure_policy(&mut workflow, task_id, reason).await?;
                    if workflow.state != WorkflowState::Running {
                        return Ok(());
                    }
                }
                _ => {}
            }
        }
        self.evaluate_inner(&mut workflow).await
    }

    /// Apply the workflow's failure policy for one settled-bad task.
    /// Caller holds the evaluation lock.
    async fn apply_failure_policy(
        &self,
        workflow: &mut Workflow,
        task_id: TaskId,
        reason: Option<String>,
    ) -> Result<(), WorkflowEngineError> {
        match workflow.failure_policy {
            FailurePolicy::Abort => {
                let summary = match reason {
                    Some(r) => format!("task {task_id} failed: {r}"),
                    None => format!("task {task_id} failed"),
                };
                workflow.fail(summary.clone())?;
                self.workflows
                    .put(workflow)
                    .await
                    .map_err(WorkflowEngineError::Store)?;

                warn!(workflow_id = %workflow.id, reason = %summary, "Workflow aborted");
                self.event_bus.publish_workflow_event(WorkflowEvent::WorkflowFailed {
                    workflow_id: workflow.id,
                    reason: summary,
                    failed_at: Utc::now(),
                });
                Ok(())
            }
            FailurePolicy::Continue => {
                for downstream in workflow.graph.downstream_of(task_id) {
                    if workflow.mark_skipped(downstream) {
                        debug!(
                            workflow_id = %workflow.id,
                            task_id = %downstream,
                            "Task skipped downstream of failure"
                        );
                        self.event_bus.publish_workflow_event(WorkflowEvent::WorkflowTaskSkipped {
                            workflow_id: workflow.id,
                            task_id: downstream,
                            skipped_at: Utc::now(),
                        });
                    }
                }
                self.workflows
                    .put(workflow)
                    .await
                    .map_err(WorkflowEngineError::Store)?;
                self.evaluate_inner(workflow).await
            }
        }
    }

    /// Start every eligible node, then check whether the workflow settled.
    /// Caller holds the evaluation lock.
    async fn evaluate_inner(&self, workflow: &mut Workflow) -> Result<(), WorkflowEngineError> {
        if workflow.state != WorkflowState::Running {
            return Ok(());
        }

        for node in workflow.graph.nodes.clone() {
            if workflow.skipped.contains(&node.task_id) {
                continue;
            }
            let task = self.task_manager.get_task(node.task_id).await?;
            if task.state != TaskState::Created {
                continue;
            }

            let deps = workflow.graph.dependencies_of(node.task_id);
            let dep_tasks =
                future::try_join_all(deps.into_iter().map(|dep| self.task_manager.get_task(dep)))
                    .await?;
            if dep_tasks.iter().any(|dep| dep.state != TaskState::Completed) {
                continue;
            }

            match self.start_node(workflow.id, &node, task.version).await {
                Ok(true) => {}
                Ok(false) => {
                    // Someone else claimed the task first; their transition
                    // stands and our evaluation simply moves on.
                    debug!(
                        workflow_id = %workflow.id,
                        task_id = %node.task_id,
                        "Lost claim race for workflow task"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        self.check_completion(workflow).await
    }

    /// Assign one node to its executor and move it to `in_progress`.
    /// Returns `Ok(false)` when an outside writer won the claim race.
    async fn start_node(
        &self,
        workflow_id: WorkflowId,
        node: &WorkflowTaskNode,
        task_version: u64,
    ) -> Result<bool, WorkflowEngineError> {
        let assigned = match self
            .task_manager
            .assign_task(node.task_id, node.executor, task_version)
            .await
        {
            Ok(task) => task,
            Err(TaskManagerError::Conflict { .. })
            | Err(TaskManagerError::DependencyNotSatisfied { .. }) => return Ok(false),
            Err(e) => return Err(e.into()),
        };

        match self
            .task_manager
            .update_state(node.task_id, TaskState::InProgress, assigned.version)
            .await
        {
            Ok(_) => {}
            Err(TaskManagerError::Conflict { .. }) => return Ok(false),
            Err(e) => return Err(e.into()),
        }

        info!(
            workflow_id = %workflow_id,
            task_id = %node.task_id,
            executor = %node.executor,
            "Workflow task started"
        );
        self.event_bus.publish_workflow_event(WorkflowEvent::WorkflowTaskStarted {
            workflow_id,
            task_id: node.task_id,
            executor: node.executor,
            started_at: Utc::now(),
        });
        Ok(true)
    }

    /// Once every node is settled (terminal task or skipped), conclude the
    /// workflow: completed iff all required nodes completed.
    async fn check_completion(&self, workflow: &mut Workflow) -> Result<(), WorkflowEngineError> {
        if workflow.state != WorkflowState::Running {
            return Ok(());
        }

        let mut unfinished_required: Option<TaskId> = None;
        for node in &workflow.graph.nodes {
            let skipped = workflow.skipped.contains(&node.task_id);
            let task = self.task_manager.get_task(node.task_id).await?;

            if !skipped && !task.state.is_terminal() {
                // Still work in flight; nothing to conclude yet.
                return Ok(());
            }
            if !node.skippable && task.state != TaskState::Completed {
                unfinished_required.get_or_insert(node.task_id);
            }
        }

        match unfinished_required {
            None => {
                workflow.complete()?;
                self.workflows
                    .put(workflow)
                    .await
                    .map_err(WorkflowEngineError::Store)?;

                info!(workflow_id = %workflow.id, "Workflow completed");
                self.event_bus.publish_workflow_event(WorkflowEvent::WorkflowCompleted {
                    workflow_id: workflow.id,
                    completed_at: Utc::now(),
                });
            }
            Some(task_id) => {
                let reason = format!("required task {task_id} did not complete");
                workflow.fail(reason.clone())?;
                self.workflows
                    .put(workflow)
                    .await
                    .map_err(WorkflowEngineError::Store)?;

                warn!(workflow_id = %workflow.id, reason = %reason, "Workflow failed");
                self.event_bus.publish_workflow_event(WorkflowEvent::WorkflowFailed {
                    workflow_id: workflow.id,
                    reason,
                    failed_at: Utc::now(),
                });
            }
        }
        Ok(())
    }

    async fn load(&self, workflow_id: WorkflowId) -> Result<Workflow, WorkflowEngineError> {
        self.workflows
            .get(workflow_id)
            .await
            .map_err(WorkflowEngineError::Store)?
            .ok_or(WorkflowEngineError::NotFound(workflow_id))
    }

    fn lock_for(&self, workflow_id: WorkflowId) -> Arc<Mutex<()>> {
        self.evaluation_locks
            .entry(workflow_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
