// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Integration tests for multi-party conversations
//!
//! These tests verify the conversation pipeline end to end:
//! 1. Create conversations in both turn modes
//! 2. Join participants and exchange messages
//! 3. Verify turn enforcement, threading, and rotation on leave
//! 4. Observe accepted messages on the event stream

use std::sync::Arc;
use std::time::Duration;

use concord_conclave::application::manager::{ConversationManager, ConversationManagerError};
use concord_conclave::domain::conversation::ConversationError;
use concord_conclave::infrastructure::stores::InMemoryConversationStore;
use concord_core::domain::agent::AgentId;
use concord_core::domain::conversation::{ConversationId, MessageId, TurnMode};
use concord_core::domain::events::ConversationEvent;
use concord_core::infrastructure::event_bus::EventBus;

const WAIT: Duration = Duration::from_secs(5);

fn manager() -> (Arc<ConversationManager>, EventBus) {
    let event_bus = EventBus::new(256);
    let manager = Arc::new(ConversationManager::new(
        Arc::new(InMemoryConversationStore::new()),
        event_bus.clone(),
    ));
    (manager, event_bus)
}

#[tokio::test]
async fn test_round_robin_enforces_join_order() {
    let (manager, _) = manager();
    let conv = manager
        .create_conversation("triage", TurnMode::StrictRoundRobin)
        .await
        .unwrap();
    let (a, b, c) = (AgentId::new(), AgentId::new(), AgentId::new());
    for agent in [a, b, c] {
        manager.join(conv.id, agent).await.unwrap();
    }

    let err = manager
        .send_message(conv.id, b, "jumping the queue", None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ConversationManagerError::Conversation(ConversationError::NotYourTurn { expected, .. })
            if expected == a
    ));

    manager.send_message(conv.id, a, "first", None).await.unwrap();
    manager.send_message(conv.id, b, "second", None).await.unwrap();
    manager.send_message(conv.id, c, "third", None).await.unwrap();
    // Rotation wraps back to the first joiner.
    manager.send_message(conv.id, a, "fourth", None).await.unwrap();

    let history = manager.history(conv.id).await.unwrap();
    let sequences: Vec<u64> = history.iter().map(|m| m.sequence).collect();
    let senders: Vec<AgentId> = history.iter().map(|m| m.sender).collect();
    assert_eq!(sequences, vec![1, 2, 3, 4]);
    assert_eq!(senders, vec![a, b, c, a]);
}

#[tokio::test]
async fn test_sender_must_join_first() {
    let (manager, _) = manager();
    let conv = manager
        .create_conversation("members only", TurnMode::FreeForm)
        .await
        .unwrap();
    manager.join(conv.id, AgentId::new()).await.unwrap();

    let stranger = AgentId::new();
    let err = manager
        .send_message(conv.id, stranger, "hello?", None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ConversationManagerError::Conversation(ConversationError::NotParticipant(id))
            if id == stranger
    ));

    let err = manager
        .send_message(ConversationId::new(), stranger, "anyone?", None)
        .await
        .unwrap_err();
    assert!(matches!(err, ConversationManagerError::NotFound(_)));
}

#[tokio::test]
async fn test_free_form_allows_any_order() {
    let (manager, _) = manager();
    let conv = manager
        .create_conversation("brainstorm", TurnMode::FreeForm)
        .await
        .unwrap();
    let (a, b) = (AgentId::new(), AgentId::new());
    manager.join(conv.id, a).await.unwrap();
    manager.join(conv.id, b).await.unwrap();

    manager.send_message(conv.id, b, "idea one", None).await.unwrap();
    manager.send_message(conv.id, b, "idea two", None).await.unwrap();
    manager.send_message(conv.id, a, "counterpoint", None).await.unwrap();

    assert_eq!(manager.history(conv.id).await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_reply_threading_links_messages() {
    let (manager, _) = manager();
    let conv = manager
        .create_conversation("review", TurnMode::FreeForm)
        .await
        .unwrap();
    let (author, reviewer) = (AgentId::new(), AgentId::new());
    manager.join(conv.id, author).await.unwrap();
    manager.join(conv.id, reviewer).await.unwrap();

    let root = manager
        .send_message(conv.id, author, "draft attached", None)
        .await
        .unwrap();
    let reply = manager
        .send_message(conv.id, reviewer, "typo in section 2", Some(root.id))
        .await
        .unwrap();
    assert_eq!(reply.reply_to, Some(root.id));

    let ghost = MessageId::new();
    let err = manager
        .send_message(conv.id, author, "replying to nothing", Some(ghost))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ConversationManagerError::Conversation(ConversationError::InvalidReference(id))
            if id == ghost
    ));
}

#[tokio::test]
async fn test_leave_passes_turn_to_next_participant() {
    let (manager, _) = manager();
    let conv = manager
        .create_conversation("standup", TurnMode::StrictRoundRobin)
        .await
        .unwrap();
    let (a, b, c) = (AgentId::new(), AgentId::new(), AgentId::new());
    for agent in [a, b, c] {
        manager.join(conv.id, agent).await.unwrap();
    }

    manager.send_message(conv.id, a, "done with mine", None).await.unwrap();
    manager.leave(conv.id, b).await.unwrap();

    // The departing holder's turn passes straight to the next in rotation.
    manager.send_message(conv.id, c, "covering for b", None).await.unwrap();
    manager.send_message(conv.id, a, "wrapping up", None).await.unwrap();

    let remaining = manager.get(conv.id).await.unwrap().participants;
    assert_eq!(remaining, vec![a, c]);
}

#[tokio::test]
async fn test_closed_conversation_rejects_sends_but_keeps_history() {
    let (manager, _) = manager();
    let conv = manager
        .create_conversation("postmortem", TurnMode::FreeForm)
        .await
        .unwrap();
    let agent = AgentId::new();
    manager.join(conv.id, agent).await.unwrap();
    manager.send_message(conv.id, agent, "final note", None).await.unwrap();

    manager.close(conv.id).await.unwrap();
    manager.close(conv.id).await.unwrap(); // idempotent

    let err = manager
        .send_message(conv.id, agent, "one more thing", None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ConversationManagerError::Conversation(ConversationError::Closed)
    ));
    let err = manager.join(conv.id, AgentId::new()).await.unwrap_err();
    assert!(matches!(
        err,
        ConversationManagerError::Conversation(ConversationError::Closed)
    ));

    // Closed, not deleted: the record and its log remain readable.
    let closed = manager.get(conv.id).await.unwrap();
    assert!(closed.is_closed());
    assert_eq!(manager.history(conv.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_event_stream_is_scoped_to_one_conversation() {
    let (manager, _) = manager();
    let watched = manager
        .create_conversation("watched", TurnMode::FreeForm)
        .await
        .unwrap();
    let noisy = manager
        .create_conversation("noisy neighbor", TurnMode::FreeForm)
        .await
        .unwrap();
    let agent = AgentId::new();
    manager.join(watched.id, agent).await.unwrap();
    manager.join(noisy.id, agent).await.unwrap();

    let mut events = manager.stream_events(watched.id);
    manager.send_message(noisy.id, agent, "off topic", None).await.unwrap();
    let message = manager
        .send_message(watched.id, agent, "on topic", None)
        .await
        .unwrap();
    manager.close(watched.id).await.unwrap();

    match tokio::time::timeout(WAIT, events.recv()).await.unwrap().unwrap() {
        ConversationEvent::MessagePosted { conversation_id, message_id, sequence, .. } => {
            assert_eq!(conversation_id, watched.id);
            assert_eq!(message_id, message.id);
            assert_eq!(sequence, 1);
        }
        other => panic!("expected message event, got {other:?}"),
    }
    assert!(matches!(
        tokio::time::timeout(WAIT, events.recv()).await.unwrap().unwrap(),
        ConversationEvent::ConversationClosed { .. }
    ));
}
