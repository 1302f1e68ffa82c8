// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentId(pub Uuid);

impl AgentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for AgentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Presence state of a registered agent.
///
/// `Active` cards are visible to discovery; `Stale` cards are hidden but kept
/// around until the purge grace period elapses, so a late heartbeat can
/// revive them without a full re-registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Active,
    Stale,
}

/// Identity record for a registered agent.
///
/// Owned exclusively by the `AgentRegistry`; every other component refers to
/// agents by [`AgentId`] only. The liveness fields (`last_heartbeat`,
/// `status`) are registry-maintained: callers supply the identity half on
/// registration and the registry stamps the rest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCard {
    pub id: AgentId,
    /// Human-readable agent name (not unique; the id is the identity).
    pub name: String,
    /// Agent software version, advertised for operator diagnostics.
    pub version: String,
    /// Capability tags this agent advertises for discovery.
    pub capabilities: BTreeSet<String>,
    /// Method names this agent accepts via dispatch.
    pub methods: BTreeSet<String>,
    /// Network endpoint where the agent's transport can reach it.
    pub endpoint: String,
    pub status: AgentStatus,
    pub registered_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
}

impl AgentCard {
    pub fn new(name: impl Into<String>, version: impl Into<String>, endpoint: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: AgentId::new(),
            name: name.into(),
            version: version.into(),
            capabilities: BTreeSet::new(),
            methods: BTreeSet::new(),
            endpoint: endpoint.into(),
            status: AgentStatus::Active,
            registered_at: now,
            last_heartbeat: now,
        }
    }

    pub fn with_capability(mut self, tag: impl Into<String>) -> Self {
        self.capabilities.insert(tag.into());
        self
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.methods.insert(method.into());
        self
    }

    pub fn has_capability(&self, tag: &str) -> bool {
        self.capabilities.contains(tag)
    }

    pub fn supports_method(&self, method: &str) -> bool {
        self.methods.contains(method)
    }

    pub fn is_active(&self) -> bool {
        self.status == AgentStatus::Active
    }

    /// Record a heartbeat, reviving a stale card if it has not been purged yet.
    pub fn touch(&mut self) {
        self.last_heartbeat = Utc::now();
        self.status = AgentStatus::Active;
    }

    pub fn mark_stale(&mut self) {
        self.status = AgentStatus::Stale;
    }

    /// Whether the card's last heartbeat is older than `timeout`.
    pub fn heartbeat_lapsed(&self, timeout: Duration, now: DateTime<Utc>) -> bool {
        now - self.last_heartbeat > timeout
    }
}
