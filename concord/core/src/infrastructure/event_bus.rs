// Event Bus Implementation - Pub/Sub for Coordination Events
//
// Provides in-memory event streaming using tokio broadcast channels.
// Enables real-time observation of registry, task, RPC, workflow and
// conversation activity without coupling services to their observers.
//
// In-memory only: events are lost on restart, and receivers that fall
// behind the channel capacity lose the oldest events (drop-oldest).

use crate::domain::conversation::ConversationId;
use crate::domain::events::{
    ConversationEvent, RegistryEvent, RpcEvent, TaskEvent, WorkflowEvent,
};
use crate::domain::task::TaskId;
use crate::domain::workflow::WorkflowId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Unified coordination event type for the event bus
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConcordEvent {
    Registry(RegistryEvent),
    Task(TaskEvent),
    Rpc(RpcEvent),
    Workflow(WorkflowEvent),
    Conversation(ConversationEvent),
}

/// Event bus for publishing and subscribing to coordination events
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<ConcordEvent>>,
}

impl EventBus {
    /// Create a new event bus with specified channel capacity
    /// Capacity determines how many events can be buffered before dropping old ones
    /// Default: 1000 events
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Create event bus with default capacity (1000)
    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    /// Publish a registry event
    pub fn publish_registry_event(&self, event: RegistryEvent) {
        self.publish(ConcordEvent::Registry(event));
    }

    /// Publish a task lifecycle event
    pub fn publish_task_event(&self, event: TaskEvent) {
        self.publish(ConcordEvent::Task(event));
    }

    /// Publish a method dispatch event
    pub fn publish_rpc_event(&self, event: RpcEvent) {
        self.publish(ConcordEvent::Rpc(event));
    }

    /// Publish a workflow event
    pub fn publish_workflow_event(&self, event: WorkflowEvent) {
        self.publish(ConcordEvent::Workflow(event));
    }

    /// Publish a conversation event
    pub fn publish_conversation_event(&self, event: ConversationEvent) {
        self.publish(ConcordEvent::Conversation(event));
    }

    /// Publish a coordination event to all subscribers
    fn publish(&self, event: ConcordEvent) {
        debug!("Publishing event: {:?}", event);

        // Send to all subscribers
        // Note: send() returns the number of receivers that received the message
        let receiver_count = self.sender.send(event).unwrap_or(0);

        if receiver_count == 0 {
            debug!("No subscribers listening to event");
        }
    }

    /// Subscribe to all coordination events
    /// Returns a receiver that can be used to listen for events
    pub fn subscribe(&self) -> EventReceiver {
        let receiver = self.sender.subscribe();
        EventReceiver { receiver }
    }

    /// Subscribe and filter for a specific task ID
    /// Useful for following a single task through its lifecycle
    pub fn subscribe_task(&self, task_id: TaskId) -> TaskEventReceiver {
        let receiver = self.sender.subscribe();
        TaskEventReceiver { receiver, task_id }
    }

    /// Subscribe and filter for a specific workflow ID
    pub fn subscribe_workflow(&self, workflow_id: WorkflowId) -> WorkflowEventReceiver {
        let receiver = self.sender.subscribe();
        WorkflowEventReceiver {
            receiver,
            workflow_id,
        }
    }

    /// Subscribe and filter for a specific conversation ID
    pub fn subscribe_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> ConversationEventReceiver {
        let receiver = self.sender.subscribe();
        ConversationEventReceiver {
            receiver,
            conversation_id,
        }
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

fn map_recv_error(e: broadcast::error::RecvError) -> EventBusError {
    match e {
        broadcast::error::RecvError::Closed => EventBusError::Closed,
        broadcast::error::RecvError::Lagged(n) => {
            warn!("Event receiver lagged by {} events", n);
            EventBusError::Lagged(n)
        }
    }
}

/// Receiver for all coordination events
pub struct EventReceiver {
    receiver: broadcast::Receiver<ConcordEvent>,
}

impl EventReceiver {
    /// Receive the next event (blocks until event is available)
    pub async fn recv(&mut self) -> Result<ConcordEvent, EventBusError> {
        self.receiver.recv().await.map_err(map_recv_error)
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Result<ConcordEvent, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }
}

/// Receiver for task-specific events (filtered)
pub struct TaskEventReceiver {
    receiver: broadcast::Receiver<ConcordEvent>,
    task_id: TaskId,
}

impl TaskEventReceiver {
    /// Receive the next event for the specified task ID
    /// Filters out events from other tasks
    pub async fn recv(&mut self) -> Result<TaskEvent, EventBusError> {
        loop {
            let event = self.receiver.recv().await.map_err(map_recv_error)?;

            if let ConcordEvent::Task(task_event) = event {
                if task_event.task_id() == self.task_id {
                    return Ok(task_event);
                }
            }
            // Continue loop if event doesn't match
        }
    }
}

/// Receiver for workflow-specific events (filtered)
pub struct WorkflowEventReceiver {
    receiver: broadcast::Receiver<ConcordEvent>,
    workflow_id: WorkflowId,
}

impl WorkflowEventReceiver {
    /// Receive the next event for the specified workflow ID
    pub async fn recv(&mut self) -> Result<WorkflowEvent, EventBusError> {
        loop {
            let event = self.receiver.recv().await.map_err(map_recv_error)?;

            if let ConcordEvent::Workflow(workflow_event) = event {
                if workflow_event.workflow_id() == self.workflow_id {
                    return Ok(workflow_event);
                }
            }
        }
    }
}

/// Receiver for conversation-specific events (filtered)
pub struct ConversationEventReceiver {
    receiver: broadcast::Receiver<ConcordEvent>,
    conversation_id: ConversationId,
}

impl ConversationEventReceiver {
    /// Receive the next event for the specified conversation ID
    pub async fn recv(&mut self) -> Result<ConversationEvent, EventBusError> {
        loop {
            let event = self.receiver.recv().await.map_err(map_recv_error)?;

            if let ConcordEvent::Conversation(conversation_event) = event {
                if conversation_event.conversation_id() == self.conversation_id {
                    return Ok(conversation_event);
                }
            }
        }
    }
}

/// Errors that can occur when receiving events
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}
