// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Store Implementations
//!
//! This module provides infrastructure implementations of the store
//! abstractions defined in the domain layer.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Persist and retrieve domain aggregates
//! - **Pattern:** Repository (DDD), Adapter (Hexagonal Architecture)
//!
//! # Available Implementations
//!
//! Thread-safe HashMap-backed storage, suitable for single-process
//! deployments and tests:
//! - **InMemoryCardStore** - Agent card records
//! - **InMemoryTaskStore** - Task records with compare-and-swap
//! - **InMemoryWorkflowStore** - Workflow records
//! - **InMemoryCredentialStore** - Agent credential records
//!
//! The task store's `compare_and_swap` holds the write lock across the
//! version check and the replacement, which is what makes concurrent
//! claimants resolve to exactly one winner.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::domain::agent::{AgentCard, AgentId};
use crate::domain::security::{CredentialRecord, CredentialStore, Permission};
use crate::domain::store::{CardStore, StoreError, TaskStore, WorkflowStore};
use crate::domain::task::{Task, TaskId};
use crate::domain::workflow::{Workflow, WorkflowId};

#[derive(Clone, Default)]
pub struct InMemoryCardStore {
    cards: Arc<RwLock<HashMap<AgentId, AgentCard>>>,
}

impl InMemoryCardStore {
    pub fn new() -> Self {
        Self {
            cards: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

#[async_trait]
impl CardStore for InMemoryCardStore {
    async fn put(&self, card: &AgentCard) -> Result<(), StoreError> {
        let mut cards = self.cards.write().unwrap();
        cards.insert(card.id, card.clone());
        Ok(())
    }

    async fn get(&self, id: AgentId) -> Result<Option<AgentCard>, StoreError> {
        let cards = self.cards.read().unwrap();
        Ok(cards.get(&id).cloned())
    }

    async fn remove(&self, id: AgentId) -> Result<(), StoreError> {
        let mut cards = self.cards.write().unwrap();
        cards.remove(&id);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<AgentCard>, StoreError> {
        let cards = self.cards.read().unwrap();
        Ok(cards.values().cloned().collect())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryTaskStore {
    tasks: Arc<RwLock<HashMap<TaskId, Task>>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self {
            tasks: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn insert(&self, task: &Task) -> Result<(), StoreError> {
        let mut tasks = self.tasks.write().unwrap();
        tasks.insert(task.id, task.clone());
        Ok(())
    }

    async fn get(&self, id: TaskId) -> Result<Option<Task>, StoreError> {
        let tasks = self.tasks.read().unwrap();
        Ok(tasks.get(&id).cloned())
    }

    async fn compare_and_swap(
        &self,
        expected_version: u64,
        task: &Task,
    ) -> Result<(), StoreError> {
        let mut tasks = self.tasks.write().unwrap();
        let current = tasks
            .get(&task.id)
            .ok_or_else(|| StoreError::NotFound(task.id.to_string()))?;

        if current.version != expected_version {
            return Err(StoreError::Conflict {
                expected: expected_version,
                actual: current.version,
            });
        }

        tasks.insert(task.id, task.clone());
        Ok(())
    }

    async fn remove(&self, id: TaskId) -> Result<(), StoreError> {
        let mut tasks = self.tasks.write().unwrap();
        tasks.remove(&id);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Task>, StoreError> {
        let tasks = self.tasks.read().unwrap();
        Ok(tasks.values().cloned().collect())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryWorkflowStore {
    workflows: Arc<RwLock<HashMap<WorkflowId, Workflow>>>,
}

impl InMemoryWorkflowStore {
    pub fn new() -> Self {
        Self {
            workflows: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

#[async_trait]
impl WorkflowStore for InMemoryWorkflowStore {
    async fn put(&self, workflow: &Workflow) -> Result<(), StoreError> {
        let mut workflows = self.workflows.write().unwrap();
        workflows.insert(workflow.id, workflow.clone());
        Ok(())
    }

    async fn get(&self, id: WorkflowId) -> Result<Option<Workflow>, StoreError> {
        let workflows = self.workflows.read().unwrap();
        Ok(workflows.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<Workflow>, StoreError> {
        let workflows = self.workflows.read().unwrap();
        Ok(workflows.values().cloned().collect())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryCredentialStore {
    credentials: Arc<RwLock<HashMap<AgentId, CredentialRecord>>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self {
            credentials: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Provision credentials for an agent. Only a hash of the secret is
    /// retained.
    pub fn insert(
        &self,
        agent_id: AgentId,
        secret: &str,
        permissions: impl IntoIterator<Item = Permission>,
    ) {
        let record = CredentialRecord::new(agent_id, secret, permissions.into_iter().collect());
        let mut credentials = self.credentials.write().unwrap();
        credentials.insert(agent_id, record);
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn lookup(&self, agent_id: AgentId) -> Result<Option<CredentialRecord>, StoreError> {
        let credentials = self.credentials.read().unwrap();
        Ok(credentials.get(&agent_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::task::TaskSpec;
    use crate::domain::workflow::{FailurePolicy, WorkflowGraph, WorkflowState, WorkflowTaskNode};
    use tokio_test::block_on;

    #[test]
    fn test_card_store_put_get_remove() {
        let store = InMemoryCardStore::new();
        let card = AgentCard::new("researcher", "1.0.0", "inproc://researcher");
        let id = card.id;

        block_on(store.put(&card)).unwrap();
        assert_eq!(block_on(store.get(id)).unwrap().unwrap().name, "researcher");
        assert_eq!(block_on(store.list()).unwrap().len(), 1);

        block_on(store.remove(id)).unwrap();
        assert!(block_on(store.get(id)).unwrap().is_none());

        // removing twice is a no-op
        block_on(store.remove(id)).unwrap();
    }

    #[test]
    fn test_task_store_cas_succeeds_on_matching_version() {
        let store = InMemoryTaskStore::new();
        let mut task = Task::new(TaskSpec::new("index"));
        block_on(store.insert(&task)).unwrap();

        let expected = task.version;
        task.assign(AgentId::new()).unwrap();
        block_on(store.compare_and_swap(expected, &task)).unwrap();

        let stored = block_on(store.get(task.id)).unwrap().unwrap();
        assert_eq!(stored.version, expected + 1);
    }

    #[test]
    fn test_task_store_cas_rejects_stale_version() {
        let store = InMemoryTaskStore::new();
        let mut task = Task::new(TaskSpec::new("index"));
        block_on(store.insert(&task)).unwrap();

        let stale = task.version;
        task.assign(AgentId::new()).unwrap();
        block_on(store.compare_and_swap(stale, &task)).unwrap();

        // A second writer still holding the original version must lose
        let mut rival = block_on(store.get(task.id)).unwrap().unwrap();
        rival.start().unwrap();
        let err = block_on(store.compare_and_swap(stale, &rival)).unwrap_err();
        match err {
            StoreError::Conflict { expected, actual } => {
                assert_eq!(expected, stale);
                assert_eq!(actual, stale + 1);
            }
            other => panic!("expected Conflict, got {other:?}"),
        }
    }

    #[test]
    fn test_task_store_cas_missing_record() {
        let store = InMemoryTaskStore::new();
        let task = Task::new(TaskSpec::new("orphan"));
        let err = block_on(store.compare_and_swap(1, &task)).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn test_workflow_store_put_overwrites() {
        let store = InMemoryWorkflowStore::new();
        let graph = WorkflowGraph::new()
            .with_node(WorkflowTaskNode::new(TaskId::new(), AgentId::new()));
        let mut workflow = Workflow::new("nightly", graph, FailurePolicy::Abort).unwrap();
        block_on(store.put(&workflow)).unwrap();

        workflow.start().unwrap();
        block_on(store.put(&workflow)).unwrap();

        let stored = block_on(store.get(workflow.id)).unwrap().unwrap();
        assert_eq!(stored.state, WorkflowState::Running);
        assert_eq!(block_on(store.list()).unwrap().len(), 1);
    }

    #[test]
    fn test_credential_store_lookup() {
        let store = InMemoryCredentialStore::new();
        let agent_id = AgentId::new();
        store.insert(agent_id, "s3cret", [Permission::from("tasks.read")]);

        let record = block_on(store.lookup(agent_id)).unwrap().unwrap();
        assert!(record.verify("s3cret"));
        assert!(!record.verify("wrong"));
        assert!(block_on(store.lookup(AgentId::new())).unwrap().is_none());
    }
}
