// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Record Store Contracts
//!
//! Persistence contracts for the coordination aggregates, one store per
//! aggregate root, interface defined here and implemented in
//! `crate::infrastructure::stores`.
//!
//! | Trait | Aggregate | Implementations |
//! |-------|-----------|----------------|
//! | `CardStore` | `AgentCard` | `InMemoryCardStore` |
//! | `TaskStore` | `Task` | `InMemoryTaskStore` |
//! | `WorkflowStore` | `Workflow` | `InMemoryWorkflowStore` |
//!
//! The durable production engine is injected at startup; the in-memory
//! implementations serve development and tests.
//!
//! ## Compare-and-swap
//!
//! `TaskStore::compare_and_swap` is the concurrency primitive behind the
//! task claim protocol: the store applies the write only if the stored
//! record still carries `expected_version`, otherwise it returns
//! [`StoreError::Conflict`] without mutating. Two racing writers with the
//! same expected version produce exactly one winner.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::agent::{AgentCard, AgentId};
use crate::domain::task::{Task, TaskId};
use crate::domain::workflow::{Workflow, WorkflowId};

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Version conflict: expected {expected}, found {actual}")]
    Conflict { expected: u64, actual: u64 },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Store interface for [`AgentCard`] records.
///
/// Cards are keyed by [`AgentId`]; `put` overwrites unconditionally, which is
/// what gives registration its idempotent re-registration semantics.
#[async_trait]
pub trait CardStore: Send + Sync {
    /// Save a card (create or overwrite).
    async fn put(&self, card: &AgentCard) -> Result<(), StoreError>;

    /// Find a card by agent id.
    async fn get(&self, id: AgentId) -> Result<Option<AgentCard>, StoreError>;

    /// Remove a card by agent id. Removing an absent card is a no-op.
    async fn remove(&self, id: AgentId) -> Result<(), StoreError>;

    /// List all cards, active and stale alike.
    async fn list(&self) -> Result<Vec<AgentCard>, StoreError>;
}

/// Store interface for [`Task`] records with optimistic concurrency.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert a freshly created task. Ids are fresh by construction, so this
    /// never races with another writer for the same key.
    async fn insert(&self, task: &Task) -> Result<(), StoreError>;

    /// Find a task by id.
    async fn get(&self, id: TaskId) -> Result<Option<Task>, StoreError>;

    /// Replace the stored record iff it still carries `expected_version`.
    ///
    /// # Errors
    ///
    /// - [`StoreError::NotFound`] — no record under `task.id`
    /// - [`StoreError::Conflict`] — stored version differs from
    ///   `expected_version`; the store is left untouched
    async fn compare_and_swap(&self, expected_version: u64, task: &Task) -> Result<(), StoreError>;

    /// Remove a task by id.
    async fn remove(&self, id: TaskId) -> Result<(), StoreError>;

    /// List all tasks.
    async fn list(&self) -> Result<Vec<Task>, StoreError>;
}

/// Store interface for [`Workflow`] records.
///
/// Workflow mutation is serialized per-workflow by the engine, so a plain
/// `put` suffices; the version protocol lives on tasks, not here.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Save a workflow (create or update).
    async fn put(&self, workflow: &Workflow) -> Result<(), StoreError>;

    /// Find a workflow by id.
    async fn get(&self, id: WorkflowId) -> Result<Option<Workflow>, StoreError>;

    /// List all workflows.
    async fn list(&self) -> Result<Vec<Workflow>, StoreError>;
}
