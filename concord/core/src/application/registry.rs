// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Agent Registry
//!
//! Tracks which agents exist, what they can do, and whether they are alive.
//!
//! # Liveness model
//!
//! Agents announce themselves with [`register`](AgentRegistry::register) and
//! prove liveness with periodic [`heartbeat`](AgentRegistry::heartbeat)s.
//! A background sweep walks the registry on an interval:
//!
//! - active agents silent longer than `stale_after` are marked stale
//!   (hidden from discovery and dispatch, card retained),
//! - stale agents silent longer than `purge_after` are evicted.
//!
//! A heartbeat at any point before eviction revives the card to active.
//! Re-registration is idempotent: the existing card is overwritten and all
//! liveness timestamps reset.

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::RegistryConfig;
use crate::domain::agent::{AgentCard, AgentId, AgentStatus};
use crate::domain::events::RegistryEvent;
use crate::domain::store::{CardStore, StoreError};
use crate::infrastructure::event_bus::EventBus;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Agent not found: {0}")]
    NotFound(AgentId),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Counters reported by one liveness sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub marked_stale: usize,
    pub purged: usize,
}

/// Registry of agent cards with heartbeat-based liveness.
pub struct AgentRegistry {
    cards: Arc<dyn CardStore>,
    event_bus: EventBus,
    config: RegistryConfig,
}

impl AgentRegistry {
    pub fn new(cards: Arc<dyn CardStore>, event_bus: EventBus, config: RegistryConfig) -> Self {
        Self {
            cards,
            event_bus,
            config,
        }
    }

    /// Register (or re-register) an agent card.
    ///
    /// The card is stored active with fresh liveness timestamps; registering
    /// an id that already exists overwrites the previous card.
    pub async fn register(&self, mut card: AgentCard) -> Result<AgentCard, RegistryError> {
        let now = Utc::now();
        card.status = AgentStatus::Active;
        card.registered_at = now;
        card.last_heartbeat = now;

        self.cards.put(&card).await?;
        info!(agent_id = %card.id, name = %card.name, "Agent registered");

        self.event_bus.publish_registry_event(RegistryEvent::AgentRegistered {
            agent_id: card.id,
            name: card.name.clone(),
            capabilities: card.capabilities.iter().cloned().collect(),
            registered_at: now,
        });
        Ok(card)
    }

    /// Record a heartbeat. A stale agent that heartbeats is revived.
    pub async fn heartbeat(&self, id: AgentId) -> Result<(), RegistryError> {
        let mut card = self.cards.get(id).await?.ok_or(RegistryError::NotFound(id))?;

        let was_stale = card.status == AgentStatus::Stale;
        card.touch();
        self.cards.put(&card).await?;

        if was_stale {
            info!(agent_id = %id, "Stale agent revived by heartbeat");
        }
        self.event_bus.publish_registry_event(RegistryEvent::HeartbeatRecorded {
            agent_id: id,
            recorded_at: card.last_heartbeat,
        });
        Ok(())
    }

    /// Remove an agent's card explicitly.
    pub async fn unregister(&self, id: AgentId) -> Result<(), RegistryError> {
        if self.cards.get(id).await?.is_none() {
            return Err(RegistryError::NotFound(id));
        }
        self.cards.remove(id).await?;
        info!(agent_id = %id, "Agent unregistered");

        self.event_bus.publish_registry_event(RegistryEvent::AgentUnregistered {
            agent_id: id,
            unregistered_at: Utc::now(),
        });
        Ok(())
    }

    /// Look up a card regardless of its liveness status.
    pub async fn get(&self, id: AgentId) -> Result<Option<AgentCard>, RegistryError> {
        Ok(self.cards.get(id).await?)
    }

    /// Resolve an agent for dispatch. Stale and unknown agents both resolve
    /// to [`RegistryError::NotFound`].
    pub async fn resolve_active(&self, id: AgentId) -> Result<AgentCard, RegistryError> {
        match self.cards.get(id).await? {
            Some(card) if card.status == AgentStatus::Active => Ok(card),
            _ => Err(RegistryError::NotFound(id)),
        }
    }

    /// Discover active agents advertising a capability tag.
    ///
    /// Stale agents are excluded. Results are ordered by name so discovery
    /// output is stable across calls.
    pub async fn find_by_capability(&self, tag: &str) -> Result<Vec<AgentCard>, RegistryError> {
        let mut matches: Vec<AgentCard> = self
            .cards
            .list()
            .await?
            .into_iter()
            .filter(|c| c.status == AgentStatus::Active && c.capabilities.contains(tag))
            .collect();
        matches.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.0.cmp(&b.id.0)));
        Ok(matches)
    }

    /// List every card, active and stale alike.
    pub async fn list(&self) -> Result<Vec<AgentCard>, RegistryError> {
        Ok(self.cards.list().await?)
    }

    /// Number of registered cards, active and stale alike.
    pub async fn len(&self) -> Result<usize, RegistryError> {
        Ok(self.cards.list().await?.len())
    }

    /// Run one liveness sweep over the registry.
    ///
    /// An agent that outlived `stale_after` is marked stale this sweep and,
    /// if it stays silent past `purge_after`, evicted by a later one.
    pub async fn sweep_once(&self) -> Result<SweepStats, RegistryError> {
        let now = Utc::now();
        let mut stats = SweepStats::default();
        let stale_after =
            ChronoDuration::from_std(self.config.stale_after).unwrap_or(ChronoDuration::MAX);
        let purge_after =
            ChronoDuration::from_std(self.config.purge_after).unwrap_or(ChronoDuration::MAX);

        for mut card in self.cards.list().await? {
            match card.status {
                AgentStatus::Active if card.heartbeat_lapsed(stale_after, now) => {
                    let last_heartbeat = card.last_heartbeat;
                    card.mark_stale();
                    self.cards.put(&card).await?;
                    stats.marked_stale += 1;

                    warn!(
                        agent_id = %card.id,
                        last_heartbeat = %last_heartbeat,
                        "Agent marked stale"
                    );
                    self.event_bus.publish_registry_event(RegistryEvent::AgentMarkedStale {
                        agent_id: card.id,
                        last_heartbeat,
                        marked_at: now,
                    });
                }
                AgentStatus::Stale if card.heartbeat_lapsed(purge_after, now) => {
                    self.cards.remove(card.id).await?;
                    stats.purged += 1;

                    warn!(agent_id = %card.id, "Stale agent purged");
                    self.event_bus.publish_registry_event(RegistryEvent::AgentPurged {
                        agent_id: card.id,
                        purged_at: now,
                    });
                }
                _ => {}
            }
        }

        if stats != SweepStats::default() {
            debug!(
                marked_stale = stats.marked_stale,
                purged = stats.purged,
                "Liveness sweep finished"
            );
        }
        Ok(stats)
    }

    /// Spawn the background sweep loop. The task runs until aborted.
    pub fn spawn_sweeper(self: Arc<Self>) -> JoinHandle<()> {
        let interval = self.config.sweep_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if let Err(e) = self.sweep_once().await {
                    warn!("Liveness sweep failed: {}", e);
                }
            }
        })
    }
}
