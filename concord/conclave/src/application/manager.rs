// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Conversation Manager
//!
//! Application service owning all conversation mutation. Loads the
//! aggregate, applies the change, persists it, and publishes the matching
//! event; domain rules (turn order, closed-conversation checks, reply
//! links) live in the aggregate itself.
//!
//! Appends for a single conversation are serialized through a
//! per-conversation mutex so the message log keeps one total order even
//! under concurrent senders. Different conversations share nothing and
//! proceed fully independently.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::Utc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

use concord_core::domain::agent::AgentId;
use concord_core::domain::conversation::{ConversationId, MessageId, TurnMode};
use concord_core::domain::events::ConversationEvent;
use concord_core::domain::store::StoreError;
use concord_core::infrastructure::event_bus::{ConversationEventReceiver, EventBus};

use crate::domain::conversation::{
    Conversation, ConversationError, ConversationStore, Message,
};

#[derive(Debug, Error)]
pub enum ConversationManagerError {
    #[error("Conversation not found: {0}")]
    NotFound(ConversationId),

    #[error(transparent)]
    Conversation(#[from] ConversationError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Drives multi-party conversations over a [`ConversationStore`].
pub struct ConversationManager {
    store: Arc<dyn ConversationStore>,
    event_bus: EventBus,
    /// One mutex per conversation; serializes the load-mutate-put cycle.
    locks: RwLock<HashMap<ConversationId, Arc<Mutex<()>>>>,
}

impl ConversationManager {
    pub fn new(store: Arc<dyn ConversationStore>, event_bus: EventBus) -> Self {
        Self {
            store,
            event_bus,
            locks: RwLock::new(HashMap::new()),
        }
    }

    /// Open a new conversation with no participants yet.
    pub async fn create_conversation(
        &self,
        topic: impl Into<String>,
        mode: TurnMode,
    ) -> Result<Conversation, ConversationManagerError> {
        let conversation = Conversation::new(topic, mode);
        self.store.put(&conversation).await?;

        info!(
            conversation_id = %conversation.id,
            topic = %conversation.topic,
            mode = %conversation.mode,
            "Conversation created"
        );
        self.event_bus
            .publish_conversation_event(ConversationEvent::ConversationCreated {
                conversation_id: conversation.id,
                topic: conversation.topic.clone(),
                mode: conversation.mode,
                created_at: conversation.created_at,
            });
        Ok(conversation)
    }

    /// Add a participant to the rotation. Joining twice is a no-op.
    pub async fn join(
        &self,
        conversation_id: ConversationId,
        agent_id: AgentId,
    ) -> Result<(), ConversationManagerError> {
        let lock = self.lock_for(conversation_id);
        let _guard = lock.lock().await;

        let mut conversation = self.load(conversation_id).await?;
        if !conversation.join(agent_id)? {
            return Ok(());
        }
        self.store.put(&conversation).await?;

        info!(conversation_id = %conversation_id, agent_id = %agent_id, "Participant joined");
        self.event_bus
            .publish_conversation_event(ConversationEvent::ParticipantJoined {
                conversation_id,
                agent_id,
                joined_at: Utc::now(),
            });
        Ok(())
    }

    /// Remove a participant from the rotation.
    pub async fn leave(
        &self,
        conversation_id: ConversationId,
        agent_id: AgentId,
    ) -> Result<(), ConversationManagerError> {
        let lock = self.lock_for(conversation_id);
        let _guard = lock.lock().await;

        let mut conversation = self.load(conversation_id).await?;
        conversation.leave(agent_id)?;
        self.store.put(&conversation).await?;

        info!(conversation_id = %conversation_id, agent_id = %agent_id, "Participant left");
        self.event_bus
            .publish_conversation_event(ConversationEvent::ParticipantLeft {
                conversation_id,
                agent_id,
                left_at: Utc::now(),
            });
        Ok(())
    }

    /// Append a message, enforcing membership and turn order. Accepted
    /// messages are broadcast to the conversation's event stream.
    pub async fn send_message(
        &self,
        conversation_id: ConversationId,
        sender: AgentId,
        body: impl Into<String>,
        reply_to: Option<MessageId>,
    ) -> Result<Message, ConversationManagerError> {
        let lock = self.lock_for(conversation_id);
        let _guard = lock.lock().await;

        let mut conversation = self.load(conversation_id).await?;
        let message = conversation.accept_message(sender, body, reply_to)?;
        self.store.put(&conversation).await?;

        debug!(
            conversation_id = %conversation_id,
            sender = %sender,
            sequence = message.sequence,
            "Message posted"
        );
        self.event_bus
            .publish_conversation_event(ConversationEvent::MessagePosted {
                conversation_id,
                message_id: message.id,
                sender,
                sequence: message.sequence,
                posted_at: message.posted_at,
            });
        Ok(message)
    }

    pub async fn get(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Conversation, ConversationManagerError> {
        self.load(conversation_id).await
    }

    /// The full message log, in append order.
    pub async fn history(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Vec<Message>, ConversationManagerError> {
        Ok(self.load(conversation_id).await?.messages)
    }

    /// Mark a conversation closed. Closing twice is a no-op; the record is
    /// kept (conversations are never deleted).
    pub async fn close(
        &self,
        conversation_id: ConversationId,
    ) -> Result<(), ConversationManagerError> {
        let lock = self.lock_for(conversation_id);
        let _guard = lock.lock().await;

        let mut conversation = self.load(conversation_id).await?;
        if !conversation.close() {
            return Ok(());
        }
        self.store.put(&conversation).await?;

        info!(conversation_id = %conversation_id, "Conversation closed");
        self.event_bus
            .publish_conversation_event(ConversationEvent::ConversationClosed {
                conversation_id,
                closed_at: Utc::now(),
            });
        Ok(())
    }

    /// Follow one conversation's events as they happen.
    pub fn stream_events(&self, conversation_id: ConversationId) -> ConversationEventReceiver {
        self.event_bus.subscribe_conversation(conversation_id)
    }

    async fn load(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Conversation, ConversationManagerError> {
        self.store
            .get(conversation_id)
            .await?
            .ok_or(ConversationManagerError::NotFound(conversation_id))
    }

    fn lock_for(&self, conversation_id: ConversationId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.write().unwrap();
        locks
            .entry(conversation_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
