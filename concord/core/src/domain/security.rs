// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Security Context Aggregate
//!
//! Domain model for the access credential lifecycle. An agent logs in
//! through the `AuthService` and receives a [`SecurityContext`], which then
//! accompanies every dispatched method call.
//!
//! ## Lifecycle
//!
//! ```text
//! login(agent_id, credential)
//!   └─ AuthService verifies the secret against the CredentialStore
//!   └─ SecurityContext issued (access token + refresh token + permissions)
//!         └─ MethodDispatcher validates the token on every call
//!         └─ refresh(refresh_token) rotates both tokens before expiry
//!         └─ revoke(agent_id) invalidates everything immediately
//! ```
//!
//! ## Invariants
//!
//! - Tokens are opaque 128-bit random strings; nothing about an agent can be
//!   derived from a token.
//! - Validation is a pure function of stored token state and current time: an
//!   expired context is rejected, never silently downgraded to anonymous.
//! - A refresh rotates **both** tokens and invalidates the previous pair.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::agent::AgentId;
use crate::domain::store::StoreError;

/// Named permission an agent can hold and a method can require.
///
/// Permissions are an open set of dotted tags (`"tasks.write"`,
/// `"conversations.send"`), mirroring capability tags on the agent card.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Permission(String);

impl Permission {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Permission {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Opaque bearer token granting access until `expires_at`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccessToken(String);

impl AccessToken {
    /// Generate a fresh random token (128 bits, hex).
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Opaque token exchanged for a fresh [`AccessToken`] pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RefreshToken(String);

impl RefreshToken {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// The validated identity/permission envelope attached to a dispatched call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityContext {
    pub agent_id: AgentId,
    pub access_token: AccessToken,
    pub refresh_token: RefreshToken,
    /// Permissions granted at login; checked by the dispatcher per method.
    pub permissions: BTreeSet<Permission>,
    pub issued_at: DateTime<Utc>,
    /// Access token expiry. The refresh token outlives this; its own expiry
    /// is tracked by the `AuthService`.
    pub expires_at: DateTime<Utc>,
}

impl SecurityContext {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn has_permission(&self, permission: &Permission) -> bool {
        self.permissions.contains(permission)
    }
}

/// Errors surfaced by credential verification and token validation.
///
/// `Unauthorized` is deliberately unspecific: unknown agent, bad secret,
/// unknown token, expired token, and missing permission are
/// indistinguishable to the caller.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Stored credential material for one agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub agent_id: AgentId,
    /// SHA-256 hex digest of the shared secret; the secret itself is never
    /// stored.
    pub secret_hash: String,
    /// Permissions granted to contexts issued for this agent.
    pub permissions: BTreeSet<Permission>,
}

impl CredentialRecord {
    pub fn new(agent_id: AgentId, secret: &str, permissions: BTreeSet<Permission>) -> Self {
        Self {
            agent_id,
            secret_hash: hash_secret(secret),
            permissions,
        }
    }

    pub fn verify(&self, secret: &str) -> bool {
        self.secret_hash == hash_secret(secret)
    }
}

/// SHA-256 hex digest of a shared secret.
pub fn hash_secret(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Lookup interface for agent credentials, implemented in
/// `crate::infrastructure::stores`.
#[async_trait::async_trait]
pub trait CredentialStore: Send + Sync {
    /// Find the credential record for an agent, if one is provisioned.
    async fn lookup(&self, agent_id: AgentId) -> Result<Option<CredentialRecord>, StoreError>;
}
