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
//! - **Purpose:** Persist and retrieve conversation aggregates
//! - **Pattern:** Repository (DDD), Adapter (Hexagonal Architecture)
//!
//! # Available Implementations
//!
//! Thread-safe HashMap-backed storage, suitable for single-process
//! deployments and tests:
//! - **InMemoryConversationStore** - Conversation records with their
//!   message logs

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use concord_core::domain::conversation::ConversationId;
use concord_core::domain::store::StoreError;

use crate::domain::conversation::{Conversation, ConversationStore};

#[derive(Clone, Default)]
pub struct InMemoryConversationStore {
    conversations: Arc<RwLock<HashMap<ConversationId, Conversation>>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self {
            conversations: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn put(&self, conversation: &Conversation) -> Result<(), StoreError> {
        let mut conversations = self.conversations.write().unwrap();
        conversations.insert(conversation.id, conversation.clone());
        Ok(())
    }

    async fn get(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Option<Conversation>, StoreError> {
        let conversations = self.conversations.read().unwrap();
        Ok(conversations.get(&conversation_id).cloned())
    }

    async fn list(&self) -> Result<Vec<Conversation>, StoreError> {
        let conversations = self.conversations.read().unwrap();
        Ok(conversations.values().cloned().collect())
    }
}
