// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::domain::agent::AgentId;
use crate::domain::conversation::{ConversationId, MessageId, TurnMode};
use crate::domain::rpc::{RequestId, RpcErrorCode};
use crate::domain::task::TaskId;
use crate::domain::workflow::WorkflowId;

/// Registry lifecycle events.
///
/// Emitted on every mutation of the agent card registry, including the
/// liveness sweeps that mark and purge agents whose heartbeats lapsed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RegistryEvent {
    AgentRegistered {
        agent_id: AgentId,
        name: String,
        capabilities: Vec<String>,
        registered_at: DateTime<Utc>,
    },
    HeartbeatRecorded {
        agent_id: AgentId,
        recorded_at: DateTime<Utc>,
    },
    AgentMarkedStale {
        agent_id: AgentId,
        last_heartbeat: DateTime<Utc>,
        marked_at: DateTime<Utc>,
    },
    AgentPurged {
        agent_id: AgentId,
        purged_at: DateTime<Utc>,
    },
    AgentUnregistered {
        agent_id: AgentId,
        unregistered_at: DateTime<Utc>,
    },
}

impl RegistryEvent {
    pub fn agent_id(&self) -> AgentId {
        match self {
            RegistryEvent::AgentRegistered { agent_id, .. }
            | RegistryEvent::HeartbeatRecorded { agent_id, .. }
            | RegistryEvent::AgentMarkedStale { agent_id, .. }
            | RegistryEvent::AgentPurged { agent_id, .. }
            | RegistryEvent::AgentUnregistered { agent_id, .. } => *agent_id,
        }
    }
}

/// Task lifecycle events, one per state transition plus creation.
///
/// `version` is the task's version counter *after* the transition, so
/// consumers can order events for one task without inspecting timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TaskEvent {
    TaskCreated {
        task_id: TaskId,
        name: String,
        depends_on: Vec<TaskId>,
        created_at: DateTime<Utc>,
    },
    TaskAssigned {
        task_id: TaskId,
        agent_id: AgentId,
        version: u64,
        assigned_at: DateTime<Utc>,
    },
    TaskStarted {
        task_id: TaskId,
        version: u64,
        started_at: DateTime<Utc>,
    },
    TaskCompleted {
        task_id: TaskId,
        version: u64,
        completed_at: DateTime<Utc>,
    },
    TaskFailed {
        task_id: TaskId,
        reason: Option<String>,
        version: u64,
        failed_at: DateTime<Utc>,
    },
    TaskCancelled {
        task_id: TaskId,
        version: u64,
        cancelled_at: DateTime<Utc>,
    },
}

impl TaskEvent {
    pub fn task_id(&self) -> TaskId {
        match self {
            TaskEvent::TaskCreated { task_id, .. }
            | TaskEvent::TaskAssigned { task_id, .. }
            | TaskEvent::TaskStarted { task_id, .. }
            | TaskEvent::TaskCompleted { task_id, .. }
            | TaskEvent::TaskFailed { task_id, .. }
            | TaskEvent::TaskCancelled { task_id, .. } => *task_id,
        }
    }
}

/// Method dispatch audit events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RpcEvent {
    CallDispatched {
        request_id: RequestId,
        target_agent: AgentId,
        method: String,
        dispatched_at: DateTime<Utc>,
    },
    CallCompleted {
        request_id: RequestId,
        target_agent: AgentId,
        method: String,
        duration_ms: u64,
        completed_at: DateTime<Utc>,
    },
    CallFailed {
        request_id: RequestId,
        target_agent: AgentId,
        method: String,
        code: RpcErrorCode,
        duration_ms: u64,
        failed_at: DateTime<Utc>,
    },
}

impl RpcEvent {
    pub fn request_id(&self) -> RequestId {
        match self {
            RpcEvent::CallDispatched { request_id, .. }
            | RpcEvent::CallCompleted { request_id, .. }
            | RpcEvent::CallFailed { request_id, .. } => *request_id,
        }
    }
}

/// Workflow orchestration events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WorkflowEvent {
    WorkflowCreated {
        workflow_id: WorkflowId,
        name: String,
        task_count: usize,
        created_at: DateTime<Utc>,
    },
    WorkflowStarted {
        workflow_id: WorkflowId,
        started_at: DateTime<Utc>,
    },
    WorkflowTaskStarted {
        workflow_id: WorkflowId,
        task_id: TaskId,
        executor: AgentId,
        started_at: DateTime<Utc>,
    },
    WorkflowTaskCompleted {
        workflow_id: WorkflowId,
        task_id: TaskId,
        completed_at: DateTime<Utc>,
    },
    WorkflowTaskFailed {
        workflow_id: WorkflowId,
        task_id: TaskId,
        reason: Option<String>,
        failed_at: DateTime<Utc>,
    },
    WorkflowTaskSkipped {
        workflow_id: WorkflowId,
        task_id: TaskId,
        skipped_at: DateTime<Utc>,
    },
    WorkflowCompleted {
        workflow_id: WorkflowId,
        completed_at: DateTime<Utc>,
    },
    WorkflowFailed {
        workflow_id: WorkflowId,
        reason: String,
        failed_at: DateTime<Utc>,
    },
}

impl WorkflowEvent {
    pub fn workflow_id(&self) -> WorkflowId {
        match self {
            WorkflowEvent::WorkflowCreated { workflow_id, .. }
            | WorkflowEvent::WorkflowStarted { workflow_id, .. }
            | WorkflowEvent::WorkflowTaskStarted { workflow_id, .. }
            | WorkflowEvent::WorkflowTaskCompleted { workflow_id, .. }
            | WorkflowEvent::WorkflowTaskFailed { workflow_id, .. }
            | WorkflowEvent::WorkflowTaskSkipped { workflow_id, .. }
            | WorkflowEvent::WorkflowCompleted { workflow_id, .. }
            | WorkflowEvent::WorkflowFailed { workflow_id, .. } => *workflow_id,
        }
    }
}

/// Multi-party conversation events.
///
/// The conversation aggregate itself lives in `aegis-concord-conclave`; the
/// event type sits here so the shared bus can carry and filter it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ConversationEvent {
    ConversationCreated {
        conversation_id: ConversationId,
        topic: String,
        mode: TurnMode,
        created_at: DateTime<Utc>,
    },
    ParticipantJoined {
        conversation_id: ConversationId,
        agent_id: AgentId,
        joined_at: DateTime<Utc>,
    },
    ParticipantLeft {
        conversation_id: ConversationId,
        agent_id: AgentId,
        left_at: DateTime<Utc>,
    },
    MessagePosted {
        conversation_id: ConversationId,
        message_id: MessageId,
        sender: AgentId,
        sequence: u64,
        posted_at: DateTime<Utc>,
    },
    ConversationClosed {
        conversation_id: ConversationId,
        closed_at: DateTime<Utc>,
    },
}

impl ConversationEvent {
    pub fn conversation_id(&self) -> ConversationId {
        match self {
            ConversationEvent::ConversationCreated { conversation_id, .. }
            | ConversationEvent::ParticipantJoined { conversation_id, .. }
            | ConversationEvent::ParticipantLeft { conversation_id, .. }
            | ConversationEvent::MessagePosted { conversation_id, .. }
            | ConversationEvent::ConversationClosed { conversation_id, .. } => *conversation_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    // ── RegistryEvent serialization ───────────────────────────────────────────

    #[test]
    fn test_registry_event_registered_serialization() {
        let agent_id = AgentId::new();
        let event = RegistryEvent::AgentRegistered {
            agent_id,
            name: "planner".to_string(),
            capabilities: vec!["planning".to_string()],
            registered_at: Utc::now(),
        };
        let json = serde_json::to_string(&event).unwrap();
        let deserialized: RegistryEvent = serde_json::from_str(&json).unwrap();
        if let RegistryEvent::AgentRegistered { name, capabilities, .. } = deserialized {
            assert_eq!(name, "planner");
            assert_eq!(capabilities, vec!["planning".to_string()]);
        } else {
            panic!("unexpected variant");
        }
        assert_eq!(event.agent_id(), agent_id);
    }

    #[test]
    fn test_registry_event_marked_stale_serialization() {
        let event = RegistryEvent::AgentMarkedStale {
            agent_id: AgentId::new(),
            last_heartbeat: Utc::now(),
            marked_at: Utc::now(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("AgentMarkedStale"));
    }

    // ── TaskEvent serialization ───────────────────────────────────────────────

    #[test]
    fn test_task_event_assigned_serialization() {
        let task_id = TaskId::new();
        let event = TaskEvent::TaskAssigned {
            task_id,
            agent_id: AgentId::new(),
            version: 2,
            assigned_at: Utc::now(),
        };
        let json = serde_json::to_string(&event).unwrap();
        let deserialized: TaskEvent = serde_json::from_str(&json).unwrap();
        if let TaskEvent::TaskAssigned { version, .. } = deserialized {
            assert_eq!(version, 2);
        } else {
            panic!("unexpected variant");
        }
        assert_eq!(event.task_id(), task_id);
    }

    #[test]
    fn test_task_event_failed_serialization() {
        let event = TaskEvent::TaskFailed {
            task_id: TaskId::new(),
            reason: Some("executor crashed".to_string()),
            version: 4,
            failed_at: Utc::now(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("TaskFailed"));
        assert!(json.contains("executor crashed"));
    }

    // ── RpcEvent serialization ────────────────────────────────────────────────

    #[test]
    fn test_rpc_event_failed_serialization() {
        let event = RpcEvent::CallFailed {
            request_id: RequestId::new(),
            target_agent: AgentId::new(),
            method: "summarize".to_string(),
            code: RpcErrorCode::Timeout,
            duration_ms: 30_000,
            failed_at: Utc::now(),
        };
        let json = serde_json::to_string(&event).unwrap();
        let deserialized: RpcEvent = serde_json::from_str(&json).unwrap();
        if let RpcEvent::CallFailed { code, method, .. } = deserialized {
            assert_eq!(code, RpcErrorCode::Timeout);
            assert_eq!(method, "summarize");
        } else {
            panic!("unexpected variant");
        }
    }

    // ── WorkflowEvent serialization ───────────────────────────────────────────

    #[test]
    fn test_workflow_event_task_started_serialization() {
        let workflow_id = WorkflowId::new();
        let event = WorkflowEvent::WorkflowTaskStarted {
            workflow_id,
            task_id: TaskId::new(),
            executor: AgentId::new(),
            started_at: Utc::now(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("WorkflowTaskStarted"));
        assert_eq!(event.workflow_id(), workflow_id);
    }

    // ── ConversationEvent serialization ───────────────────────────────────────

    #[test]
    fn test_conversation_event_message_posted_serialization() {
        let conversation_id = ConversationId::new();
        let event = ConversationEvent::MessagePosted {
            conversation_id,
            message_id: MessageId::new(),
            sender: AgentId::new(),
            sequence: 1,
            posted_at: Utc::now(),
        };
        let json = serde_json::to_string(&event).unwrap();
        let deserialized: ConversationEvent = serde_json::from_str(&json).unwrap();
        if let ConversationEvent::MessagePosted { sequence, .. } = deserialized {
            assert_eq!(sequence, 1);
        } else {
            panic!("unexpected variant");
        }
        assert_eq!(event.conversation_id(), conversation_id);
    }

    #[test]
    fn test_conversation_event_created_serialization() {
        let event = ConversationEvent::ConversationCreated {
            conversation_id: ConversationId::new(),
            topic: "release planning".to_string(),
            mode: TurnMode::StrictRoundRobin,
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("ConversationCreated"));
        assert!(json.contains("strict-round-robin"));
    }
}
