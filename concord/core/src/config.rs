// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Runtime Configuration
//!
//! All tunable timings and capacities, loadable from YAML. Every field has a
//! serde default so a partial (or empty) document yields a usable config;
//! durations use humantime strings (`"10s"`, `"1h"`, `"500ms"`).
//!
//! ```yaml
//! registry:
//!   heartbeat_interval: 10s
//!   stale_after: 25s
//! auth:
//!   access_ttl: 1h
//! dispatcher:
//!   default_deadline: 30s
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Agent registry liveness tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// How often agents are expected to heartbeat.
    #[serde(default = "default_heartbeat_interval")]
    #[serde(with = "humantime_serde")]
    pub heartbeat_interval: Duration,

    /// Silence after which an active agent is marked stale.
    /// Should comfortably exceed `heartbeat_interval`.
    #[serde(default = "default_stale_after")]
    #[serde(with = "humantime_serde")]
    pub stale_after: Duration,

    /// Silence after which a stale agent is purged from the registry.
    #[serde(default = "default_purge_after")]
    #[serde(with = "humantime_serde")]
    pub purge_after: Duration,

    /// Interval between background liveness sweeps.
    #[serde(default = "default_sweep_interval")]
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,
}

fn default_heartbeat_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_stale_after() -> Duration {
    Duration::from_secs(25)
}

fn default_purge_after() -> Duration {
    Duration::from_secs(120)
}

fn default_sweep_interval() -> Duration {
    Duration::from_secs(5)
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: default_heartbeat_interval(),
            stale_after: default_stale_after(),
            purge_after: default_purge_after(),
            sweep_interval: default_sweep_interval(),
        }
    }
}

/// Token lifetime tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Access token lifetime.
    #[serde(default = "default_access_ttl")]
    #[serde(with = "humantime_serde")]
    pub access_ttl: Duration,

    /// Refresh token lifetime. Refreshing rotates both tokens.
    #[serde(default = "default_refresh_ttl")]
    #[serde(with = "humantime_serde")]
    pub refresh_ttl: Duration,
}

fn default_access_ttl() -> Duration {
    Duration::from_secs(60 * 60)
}

fn default_refresh_ttl() -> Duration {
    Duration::from_secs(24 * 60 * 60)
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            access_ttl: default_access_ttl(),
            refresh_ttl: default_refresh_ttl(),
        }
    }
}

/// Method dispatch tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Deadline applied to calls that carry no explicit timeout.
    #[serde(default = "default_deadline")]
    #[serde(with = "humantime_serde")]
    pub default_deadline: Duration,
}

fn default_deadline() -> Duration {
    Duration::from_secs(30)
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self { default_deadline: default_deadline() }
    }
}

/// Event bus tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventBusConfig {
    /// Per-subscriber buffer; the oldest events are dropped for receivers
    /// that fall further behind than this.
    #[serde(default = "default_bus_capacity")]
    pub capacity: usize,
}

fn default_bus_capacity() -> usize {
    1000
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self { capacity: default_bus_capacity() }
    }
}

/// Top-level configuration for the coordination core.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConcordConfig {
    #[serde(default)]
    pub registry: RegistryConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub dispatcher: DispatcherConfig,

    #[serde(default)]
    pub event_bus: EventBusConfig,
}

impl ConcordConfig {
    /// Parse configuration from a YAML string.
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config at {:?}: {}", path, e))?;
        Self::from_yaml_str(&content)
    }

    /// Sanity-check the relationships between timings.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.registry.stale_after <= self.registry.heartbeat_interval {
            anyhow::bail!(
                "registry.stale_after ({:?}) must exceed heartbeat_interval ({:?})",
                self.registry.stale_after,
                self.registry.heartbeat_interval
            );
        }
        if self.registry.purge_after < self.registry.stale_after {
            anyhow::bail!(
                "registry.purge_after ({:?}) must be at least stale_after ({:?})",
                self.registry.purge_after,
                self.registry.stale_after
            );
        }
        if self.auth.refresh_ttl < self.auth.access_ttl {
            anyhow::bail!(
                "auth.refresh_ttl ({:?}) must be at least access_ttl ({:?})",
                self.auth.refresh_ttl,
                self.auth.access_ttl
            );
        }
        if self.event_bus.capacity == 0 {
            anyhow::bail!("event_bus.capacity must be non-zero");
        }
        Ok(())
    }
}
