// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Conversation Domain Layer
//!
//! Pure domain types for multi-party messaging. No I/O dependencies.
//!
//! | Module | Key Types |
//! |--------|-----------|
//! | [`conversation`] | `Conversation`, `Message`, `ConversationStore` |

pub mod conversation;

pub use conversation::*;
