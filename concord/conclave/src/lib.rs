// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # `aegis-concord-conclave` — Multi-Party Conversation Crate
//!
//! Manages ordered message exchange between registered agents: turn-taking,
//! participant rotation, reply threading, and an append-only log per
//! conversation (a **Conclave**).
//!
//! ## Crate Layout
//!
//! | Module | Layer | Contents |
//! |--------|-------|----------|
//! | [`domain`] | Domain | `Conversation` aggregate, `Message`, `ConversationStore` port |
//! | [`application`] | Application | `ConversationManager` service |
//! | [`infrastructure`] | Infrastructure | `InMemoryConversationStore` |
//!
//! ## Key Concepts
//!
//! - **Conversation**: an ordered, multi-party exchange with an enforced
//!   turn discipline. `strict-round-robin` cycles through participants in
//!   join order; `free-form` lets any participant send at any time.
//! - **Total ordering**: every accepted message gets the next sequence
//!   number; appends for one conversation are serialized, so the log is a
//!   single total order even under concurrent senders.
//! - **Reply threading**: a message may cite an earlier message in the
//!   same conversation via `reply_to`, forming a causal chain.
//!
//! Conversation identifiers, `TurnMode`, and the `conversation.*` event
//! variants live in `aegis-concord-core`, so any component can observe
//! conversation traffic on the shared event bus without depending on this
//! crate.
//!
//! ## Phase Notes
//!
//! ⚠️ Phase 1 — Conversations persist through the bundled in-memory store
//! only. Durable history and cross-node conversation federation are
//! deferred to a later phase.

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use domain::*;
