// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Mod
//!
//! Provides mod functionality for the system.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Implements mod

pub mod agent;
pub mod conversation;
pub mod events;
pub mod rpc;
pub mod security;
pub mod store;
pub mod task;
pub mod workflow;
