// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Call Transport
//!
//! Seam between callers and the dispatch pipeline. Callers hand a
//! [`MethodCall`] to a [`Transport`] and get a [`MethodResponse`] back;
//! how the call reaches the dispatcher is the transport's business.
//!
//! [`LoopbackTransport`] is the in-process implementation: it feeds the
//! call straight into the local [`MethodDispatcher`]. Remote transports
//! (sockets, queues) would implement the same trait and surface delivery
//! failures as [`TransportError`] rather than inventing RPC error codes.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::application::dispatcher::MethodDispatcher;
use crate::domain::rpc::{MethodCall, MethodResponse};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Endpoint unreachable: {0}")]
    Unreachable(String),
}

/// Delivers method calls to a dispatcher, local or remote.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn deliver(&self, call: MethodCall) -> Result<MethodResponse, TransportError>;
}

/// In-process transport backed by the local dispatcher.
#[derive(Clone)]
pub struct LoopbackTransport {
    dispatcher: Arc<MethodDispatcher>,
}

impl LoopbackTransport {
    pub fn new(dispatcher: Arc<MethodDispatcher>) -> Self {
        Self { dispatcher }
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn deliver(&self, call: MethodCall) -> Result<MethodResponse, TransportError> {
        // Local delivery cannot fail; pipeline errors ride in the response.
        Ok(self.dispatcher.dispatch(call).await)
    }
}
