// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Auth Service
//!
//! Issues, validates, refreshes and revokes the token pairs agents use to
//! authenticate dispatched method calls.
//!
//! # Token lifecycle
//!
//! ```text
//! login(agent_id, secret) ──> SecurityContext { access, refresh }
//!        access expires (1h default) ──> validate() fails
//!        refresh(refresh_token) ──> NEW pair, old pair dead immediately
//!        refresh expires (24h default) ──> re-login required
//! ```
//!
//! Every failure path collapses to [`AuthError::Unauthorized`]: a caller
//! cannot tell an unknown agent from a bad secret, nor an expired token
//! from one that never existed.

use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use tracing::{debug, info};

use crate::config::AuthConfig;
use crate::domain::agent::AgentId;
use crate::domain::security::{
    AccessToken, AuthError, CredentialStore, Permission, RefreshToken, SecurityContext,
};

struct SessionRecord {
    context: SecurityContext,
    /// Hard ceiling on the session; refreshing never extends it past this.
    refresh_expires_at: DateTime<Utc>,
}

/// Credential verification and token bookkeeping.
pub struct AuthService {
    credentials: Arc<dyn CredentialStore>,
    /// Access token -> live session.
    sessions: DashMap<String, SessionRecord>,
    /// Refresh token -> access token, for refresh lookups.
    refresh_index: DashMap<String, String>,
    config: AuthConfig,
}

impl AuthService {
    pub fn new(credentials: Arc<dyn CredentialStore>, config: AuthConfig) -> Self {
        Self {
            credentials,
            sessions: DashMap::new(),
            refresh_index: DashMap::new(),
            config,
        }
    }

    /// Verify an agent's secret and mint a fresh token pair.
    pub async fn login(
        &self,
        agent_id: AgentId,
        secret: &str,
    ) -> Result<SecurityContext, AuthError> {
        let record = self
            .credentials
            .lookup(agent_id)
            .await?
            .ok_or(AuthError::Unauthorized)?;

        if !record.verify(secret) {
            debug!(agent_id = %agent_id, "Login rejected");
            return Err(AuthError::Unauthorized);
        }

        let now = Utc::now();
        let context = SecurityContext {
            agent_id,
            access_token: AccessToken::generate(),
            refresh_token: RefreshToken::generate(),
            permissions: record.permissions,
            issued_at: now,
            expires_at: expiry(now, self.config.access_ttl),
        };
        self.store_session(&context, expiry(now, self.config.refresh_ttl));

        info!(agent_id = %agent_id, "Agent logged in");
        Ok(context)
    }

    /// Validate an access token, evicting it if it has expired.
    pub fn validate(&self, token: &str) -> Result<SecurityContext, AuthError> {
        let expired = {
            let session = self.sessions.get(token).ok_or(AuthError::Unauthorized)?;
            if session.context.is_expired(Utc::now()) {
                Some(session.context.refresh_token.as_str().to_string())
            } else {
                return Ok(session.context.clone());
            }
        };

        // Expired on observation: drop the session outside the map guard.
        if let Some(refresh_token) = expired {
            self.sessions.remove(token);
            self.refresh_index.remove(&refresh_token);
        }
        Err(AuthError::Unauthorized)
    }

    /// Validate an access token and require `permission` on the context.
    pub fn authorize(
        &self,
        token: &str,
        permission: &Permission,
    ) -> Result<SecurityContext, AuthError> {
        let context = self.validate(token)?;
        if !context.has_permission(permission) {
            debug!(
                agent_id = %context.agent_id,
                permission = %permission,
                "Permission denied"
            );
            return Err(AuthError::Unauthorized);
        }
        Ok(context)
    }

    /// Exchange a refresh token for a brand-new token pair.
    ///
    /// Rotation is strict: the old access and refresh tokens are dead the
    /// moment this returns, whether or not the caller keeps using them.
    pub fn refresh(&self, refresh_token: &str) -> Result<SecurityContext, AuthError> {
        let access_token = self
            .refresh_index
            .remove(refresh_token)
            .map(|(_, v)| v)
            .ok_or(AuthError::Unauthorized)?;

        let (_, session) = self
            .sessions
            .remove(&access_token)
            .ok_or(AuthError::Unauthorized)?;

        let now = Utc::now();
        if now > session.refresh_expires_at {
            debug!(agent_id = %session.context.agent_id, "Refresh token expired");
            return Err(AuthError::Unauthorized);
        }

        let context = SecurityContext {
            agent_id: session.context.agent_id,
            access_token: AccessToken::generate(),
            refresh_token: RefreshToken::generate(),
            permissions: session.context.permissions,
            issued_at: now,
            expires_at: expiry(now, self.config.access_ttl),
        };
        self.store_session(&context, expiry(now, self.config.refresh_ttl));

        debug!(agent_id = %context.agent_id, "Token pair rotated");
        Ok(context)
    }

    /// Invalidate every live session for `agent_id`. Returns how many were
    /// revoked.
    pub fn revoke(&self, agent_id: AgentId) -> usize {
        let doomed: Vec<(String, String)> = self
            .sessions
            .iter()
            .filter(|entry| entry.value().context.agent_id == agent_id)
            .map(|entry| {
                (
                    entry.key().clone(),
                    entry.value().context.refresh_token.as_str().to_string(),
                )
            })
            .collect();

        for (access_token, refresh_token) in &doomed {
            self.sessions.remove(access_token);
            self.refresh_index.remove(refresh_token);
        }

        if !doomed.is_empty() {
            info!(agent_id = %agent_id, count = doomed.len(), "Sessions revoked");
        }
        doomed.len()
    }

    fn store_session(&self, context: &SecurityContext, refresh_expires_at: DateTime<Utc>) {
        self.sessions.insert(
            context.access_token.as_str().to_string(),
            SessionRecord {
                context: context.clone(),
                refresh_expires_at,
            },
        );
        self.refresh_index.insert(
            context.refresh_token.as_str().to_string(),
            context.access_token.as_str().to_string(),
        );
    }
}

fn expiry(now: DateTime<Utc>, ttl: std::time::Duration) -> DateTime<Utc> {
    let ttl = ChronoDuration::from_std(ttl).unwrap_or(ChronoDuration::MAX);
    now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC)
}
