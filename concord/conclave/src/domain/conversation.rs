// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Conversation Domain Aggregates
//!
//! Defines the core types for multi-party message exchange:
//!
//! - [`Conversation`] — aggregate root tracking participants, turn order,
//!   and the append-only message log.
//! - [`Message`] — immutable value object, totally ordered by sequence.
//! - [`ConversationStore`] — persistence port for conversations.
//!
//! Turn discipline is enforced here, not in the manager: a conversation
//! loaded from any store rejects out-of-turn sends the same way.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use concord_core::domain::agent::AgentId;
use concord_core::domain::conversation::{ConversationId, MessageId, TurnMode};
use concord_core::domain::store::StoreError;

/// Whether a conversation still accepts messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    Open,
    Closed,
}

/// One entry in a conversation's append-only log.
///
/// Immutable once appended. `sequence` starts at 1 and increases by one per
/// accepted message, with no gaps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender: AgentId,
    pub body: String,
    /// Causal link to an earlier message in the same conversation.
    pub reply_to: Option<MessageId>,
    pub sequence: u64,
    pub posted_at: DateTime<Utc>,
}

#[derive(Debug, Error, PartialEq)]
pub enum ConversationError {
    #[error("Conversation is closed")]
    Closed,

    #[error("Agent is not a participant: {0}")]
    NotParticipant(AgentId),

    #[error("Not {sender}'s turn; next speaker is {expected}")]
    NotYourTurn { sender: AgentId, expected: AgentId },

    #[error("reply_to references unknown message: {0}")]
    InvalidReference(MessageId),
}

/// Aggregate root for an ordered, multi-party message exchange.
///
/// # Invariants
///
/// - Messages are totally ordered by `sequence`; appends never reorder or
///   remove entries.
/// - `participants` preserves join order; in `strict-round-robin` mode the
///   turn rotates through it in that order.
/// - A closed conversation accepts no further messages or joins. It is
///   never deleted, only marked closed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub topic: String,
    pub description: Option<String>,
    pub mode: TurnMode,
    pub status: ConversationStatus,
    /// Participants in join order; the rotation follows this order.
    pub participants: Vec<AgentId>,
    /// Index into `participants` of the next eligible speaker.
    turn_cursor: usize,
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Conversation {
    pub fn new(topic: impl Into<String>, mode: TurnMode) -> Self {
        Self {
            id: ConversationId::new(),
            topic: topic.into(),
            description: None,
            mode,
            status: ConversationStatus::Open,
            participants: Vec::new(),
            turn_cursor: 0,
            messages: Vec::new(),
            created_at: Utc::now(),
            closed_at: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn is_closed(&self) -> bool {
        self.status == ConversationStatus::Closed
    }

    pub fn is_participant(&self, agent_id: AgentId) -> bool {
        self.participants.contains(&agent_id)
    }

    /// The participant whose turn it is, in `strict-round-robin` mode.
    /// `None` when nobody has joined yet.
    pub fn next_speaker(&self) -> Option<AgentId> {
        self.participants.get(self.turn_cursor).copied()
    }

    /// Add a participant at the end of the rotation. Returns `false` when
    /// the agent had already joined (joining twice is idempotent).
    pub fn join(&mut self, agent_id: AgentId) -> Result<bool, ConversationError> {
        if self.is_closed() {
            return Err(ConversationError::Closed);
        }
        if self.is_participant(agent_id) {
            return Ok(false);
        }
        self.participants.push(agent_id);
        Ok(true)
    }

    /// Remove a participant from the rotation without disturbing the
    /// relative order of the others. If the departing participant held the
    /// turn, the turn passes to the next remaining participant.
    ///
    /// Leaving remains possible after the conversation is closed.
    pub fn leave(&mut self, agent_id: AgentId) -> Result<(), ConversationError> {
        let idx = self
            .participants
            .iter()
            .position(|p| *p == agent_id)
            .ok_or(ConversationError::NotParticipant(agent_id))?;

        self.participants.remove(idx);
        if idx < self.turn_cursor {
            self.turn_cursor -= 1;
        } else if self.turn_cursor >= self.participants.len() {
            // Departing holder was last in the rotation; wrap to the front.
            self.turn_cursor = 0;
        }
        Ok(())
    }

    /// Validate and append a message, advancing the turn in
    /// `strict-round-robin` mode.
    ///
    /// Checks run in a fixed order: closed, membership, turn, reply link.
    /// A non-participant therefore sees [`ConversationError::NotParticipant`]
    /// even when it is also not their turn.
    pub fn accept_message(
        &mut self,
        sender: AgentId,
        body: impl Into<String>,
        reply_to: Option<MessageId>,
    ) -> Result<Message, ConversationError> {
        if self.is_closed() {
            return Err(ConversationError::Closed);
        }
        if !self.is_participant(sender) {
            return Err(ConversationError::NotParticipant(sender));
        }
        if self.mode == TurnMode::StrictRoundRobin {
            if let Some(expected) = self.next_speaker() {
                if expected != sender {
                    return Err(ConversationError::NotYourTurn { sender, expected });
                }
            }
        }
        if let Some(parent) = reply_to {
            if !self.messages.iter().any(|m| m.id == parent) {
                return Err(ConversationError::InvalidReference(parent));
            }
        }

        let message = Message {
            id: MessageId::new(),
            conversation_id: self.id,
            sender,
            body: body.into(),
            reply_to,
            sequence: self.messages.len() as u64 + 1,
            posted_at: Utc::now(),
        };
        self.messages.push(message.clone());

        if self.mode == TurnMode::StrictRoundRobin && !self.participants.is_empty() {
            self.turn_cursor = (self.turn_cursor + 1) % self.participants.len();
        }
        Ok(message)
    }

    /// Mark the conversation closed. Returns `false` when it already was
    /// (closing twice is idempotent).
    pub fn close(&mut self) -> bool {
        if self.is_closed() {
            return false;
        }
        self.status = ConversationStatus::Closed;
        self.closed_at = Some(Utc::now());
        true
    }
}

/// Persistence port for conversations.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn put(&self, conversation: &Conversation) -> Result<(), StoreError>;
    async fn get(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Option<Conversation>, StoreError>;
    async fn list(&self) -> Result<Vec<Conversation>, StoreError>;
}
