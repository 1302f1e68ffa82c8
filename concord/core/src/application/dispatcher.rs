// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Method Dispatcher
//!
//! Routes authenticated method calls to registered handlers, enforcing a
//! fixed pipeline whose check order is part of the contract:
//!
//! 1. target resolves to an active agent, else `AgentNotFound`
//! 2. the agent's card advertises the method and a handler is registered,
//!    else `MethodNotFound`
//! 3. the bearer token is valid and carries the method's required
//!    permission, else `Unauthorized`
//! 4. params satisfy the method's declared contract, else `InvalidParams`
//! 5. the handler runs under a deadline; overruns yield `Timeout` and the
//!    handler's cancellation token is signalled
//!
//! Authorization precedes param validation, so probing a method's parameter
//! shape requires a valid token.
//!
//! # Failure containment
//!
//! Handlers run in a spawned task: a panicking handler produces an
//! `InternalError` response instead of unwinding the dispatcher. Timeouts
//! signal cancellation cooperatively; a handler that ignores its token is
//! left to finish in the background and its result is discarded.
//!
//! `dispatch` itself never fails: every outcome, error or not, is a
//! [`MethodResponse`] carrying the caller's request id.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::auth::AuthService;
use crate::application::registry::{AgentRegistry, RegistryError};
use crate::config::DispatcherConfig;
use crate::domain::events::RpcEvent;
use crate::domain::rpc::{MethodCall, MethodDescriptor, MethodResponse, RpcError};
use crate::domain::security::AuthError;
use crate::infrastructure::event_bus::EventBus;

/// A callable unit of agent behavior, invoked by the dispatcher.
///
/// Handlers receive the validated params and a cancellation token that is
/// signalled when the call's deadline passes. Long-running handlers should
/// poll the token and bail out early; the dispatcher never aborts them.
#[async_trait::async_trait]
pub trait MethodHandler: Send + Sync {
    async fn handle(&self, params: Value, cancel: CancellationToken) -> anyhow::Result<Value>;
}

/// Adapter so plain async closures can serve as handlers.
pub struct HandlerFn<F> {
    f: F,
}

impl<F> HandlerFn<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait::async_trait]
impl<F, Fut> MethodHandler for HandlerFn<F>
where
    F: Fn(Value, CancellationToken) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = anyhow::Result<Value>> + Send,
{
    async fn handle(&self, params: Value, cancel: CancellationToken) -> anyhow::Result<Value> {
        (self.f)(params, cancel).await
    }
}

struct RegisteredMethod {
    descriptor: MethodDescriptor,
    handler: Arc<dyn MethodHandler>,
}

/// Routes method calls through resolution, auth, validation and execution.
pub struct MethodDispatcher {
    registry: Arc<AgentRegistry>,
    auth: Arc<AuthService>,
    event_bus: EventBus,
    methods: DashMap<String, RegisteredMethod>,
    config: DispatcherConfig,
}

impl MethodDispatcher {
    pub fn new(
        registry: Arc<AgentRegistry>,
        auth: Arc<AuthService>,
        event_bus: EventBus,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            registry,
            auth,
            event_bus,
            methods: DashMap::new(),
            config,
        }
    }

    /// Register a handler under the descriptor's method name.
    /// Re-registering a name replaces the previous handler.
    pub fn register_method(&self, descriptor: MethodDescriptor, handler: Arc<dyn MethodHandler>) {
        info!(method = %descriptor.name, "Method registered");
        self.methods.insert(
            descriptor.name.clone(),
            RegisteredMethod {
                descriptor,
                handler,
            },
        );
    }

    /// Descriptors of every registered method, ordered by name.
    pub fn list_methods(&self) -> Vec<MethodDescriptor> {
        let mut descriptors: Vec<MethodDescriptor> = self
            .methods
            .iter()
            .map(|entry| entry.value().descriptor.clone())
            .collect();
        descriptors.sort_by(|a, b| a.name.cmp(&b.name));
        descriptors
    }

    /// Dispatch a call through the full pipeline.
    pub async fn dispatch(&self, call: MethodCall) -> MethodResponse {
        let started = Instant::now();
        self.event_bus.publish_rpc_event(RpcEvent::CallDispatched {
            request_id: call.request_id,
            target_agent: call.target_agent,
            method: call.method.clone(),
            dispatched_at: Utc::now(),
        });

        let outcome = self.dispatch_inner(&call).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(result) => {
                debug!(
                    request_id = %call.request_id,
                    method = %call.method,
                    duration_ms,
                    "Call completed"
                );
                self.event_bus.publish_rpc_event(RpcEvent::CallCompleted {
                    request_id: call.request_id,
                    target_agent: call.target_agent,
                    method: call.method.clone(),
                    duration_ms,
                    completed_at: Utc::now(),
                });
                MethodResponse::ok(call.request_id, result)
            }
            Err(error) => {
                warn!(
                    request_id = %call.request_id,
                    method = %call.method,
                    code = %error.code,
                    duration_ms,
                    "Call failed: {}",
                    error.message
                );
                self.event_bus.publish_rpc_event(RpcEvent::CallFailed {
                    request_id: call.request_id,
                    target_agent: call.target_agent,
                    method: call.method.clone(),
                    code: error.code,
                    duration_ms,
                    failed_at: Utc::now(),
                });
                MethodResponse::err(call.request_id, error)
            }
        }
    }

    async fn dispatch_inner(&self, call: &MethodCall) -> Result<Value, RpcError> {
        // 1. Resolve the target to a live agent
        let card = self
            .registry
            .resolve_active(call.target_agent)
            .await
            .map_err(|e| match e {
                RegistryError::NotFound(id) => RpcError::agent_not_found(id),
                RegistryError::Store(e) => RpcError::internal(e.to_string()),
            })?;

        // 2. The card must advertise the method, and a handler must exist
        if !card.methods.contains(&call.method) {
            return Err(RpcError::method_not_found(&call.method));
        }
        let (descriptor, handler) = {
            let entry = self
                .methods
                .get(&call.method)
                .ok_or_else(|| RpcError::method_not_found(&call.method))?;
            (entry.descriptor.clone(), entry.handler.clone())
        };

        // 3. Token and permission
        self.auth
            .authorize(&call.token, &descriptor.required_permission)
            .map_err(|e| match e {
                AuthError::Unauthorized => RpcError::unauthorized(),
                AuthError::Store(e) => RpcError::internal(e.to_string()),
            })?;

        // 4. Param contract
        descriptor.validate_params(&call.params)?;

        // 5. Invoke under the deadline
        let deadline = call.timeout.unwrap_or(self.config.default_deadline);
        let cancel = CancellationToken::new();
        let child = cancel.child_token();
        let params = call.params.clone();
        let invocation = tokio::spawn(async move { handler.handle(params, child).await });

        match tokio::time::timeout(deadline, invocation).await {
            Ok(Ok(Ok(result))) => Ok(result),
            Ok(Ok(Err(e))) => Err(RpcError::internal(e.to_string())),
            Ok(Err(join_err)) if join_err.is_panic() => {
                warn!(method = %call.method, "Handler panicked");
                Err(RpcError::internal("Handler panicked"))
            }
            Ok(Err(_)) => Err(RpcError::internal("Handler task aborted")),
            Err(_) => {
                // Deadline passed: signal the handler and give up on the result
                cancel.cancel();
                Err(RpcError::timeout(deadline))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthConfig;
    use crate::domain::agent::{AgentCard, AgentId};
    use crate::domain::rpc::{ParamType, RpcErrorCode};
    use crate::domain::security::Permission;
    use crate::infrastructure::stores::{InMemoryCardStore, InMemoryCredentialStore};
    use serde_json::json;

    struct Fixture {
        dispatcher: MethodDispatcher,
        registry: Arc<AgentRegistry>,
        credentials: InMemoryCredentialStore,
        auth: Arc<AuthService>,
    }

    fn fixture() -> Fixture {
        let event_bus = EventBus::new(64);
        let registry = Arc::new(AgentRegistry::new(
            Arc::new(InMemoryCardStore::new()),
            event_bus.clone(),
            crate::config::RegistryConfig::default(),
        ));
        let credentials = InMemoryCredentialStore::new();
        let auth = Arc::new(AuthService::new(
            Arc::new(credentials.clone()),
            AuthConfig::default(),
        ));
        let dispatcher = MethodDispatcher::new(
            registry.clone(),
            auth.clone(),
            event_bus,
            DispatcherConfig::default(),
        );
        Fixture {
            dispatcher,
            registry,
            credentials,
            auth,
        }
    }

    fn echo_descriptor() -> MethodDescriptor {
        MethodDescriptor::new("echo", Permission::from("rpc.echo"))
            .with_param("text", ParamType::String)
    }

    fn echo_handler() -> Arc<dyn MethodHandler> {
        Arc::new(HandlerFn::new(|params: Value, _cancel| async move {
            Ok(json!({ "echoed": params["text"] }))
        }))
    }

    async fn register_echo_target(fx: &Fixture) -> (AgentId, String) {
        let card = AgentCard::new("echoer", "1.0.0", "inproc://echoer").with_method("echo");
        let agent_id = card.id;
        fx.registry.register(card).await.unwrap();

        fx.credentials
            .insert(agent_id, "secret", [Permission::from("rpc.echo")]);
        let context = fx.auth.login(agent_id, "secret").await.unwrap();
        (agent_id, context.access_token.as_str().to_string())
    }

    #[tokio::test]
    async fn test_unknown_agent_fails_before_method_lookup() {
        let fx = fixture();
        // no agent, no handler, no token: resolution must fail first
        let call = MethodCall::new(AgentId::new(), "echo", json!({}), "bogus");
        let response = fx.dispatcher.dispatch(call).await;
        assert_eq!(response.error.unwrap().code, RpcErrorCode::AgentNotFound);
    }

    #[tokio::test]
    async fn test_unadvertised_method_fails_before_auth() {
        let fx = fixture();
        let (agent_id, _) = register_echo_target(&fx).await;
        fx.dispatcher.register_method(echo_descriptor(), echo_handler());

        // invalid token, but the card does not advertise "transcribe":
        // MethodNotFound must win over Unauthorized
        let call = MethodCall::new(agent_id, "transcribe", json!({}), "bogus");
        let response = fx.dispatcher.dispatch(call).await;
        assert_eq!(response.error.unwrap().code, RpcErrorCode::MethodNotFound);
    }

    #[tokio::test]
    async fn test_advertised_but_unregistered_method() {
        let fx = fixture();
        let (agent_id, token) = register_echo_target(&fx).await;
        // card advertises echo, but no handler was registered
        let call = MethodCall::new(agent_id, "echo", json!({"text": "hi"}), token);
        let response = fx.dispatcher.dispatch(call).await;
        assert_eq!(response.error.unwrap().code, RpcErrorCode::MethodNotFound);
    }

    #[tokio::test]
    async fn test_auth_precedes_param_validation() {
        let fx = fixture();
        let (agent_id, _) = register_echo_target(&fx).await;
        fx.dispatcher.register_method(echo_descriptor(), echo_handler());

        // params are malformed AND the token is bogus: Unauthorized must win
        let call = MethodCall::new(agent_id, "echo", json!({"wrong": 1}), "bogus");
        let response = fx.dispatcher.dispatch(call).await;
        assert_eq!(response.error.unwrap().code, RpcErrorCode::Unauthorized);
    }

    #[tokio::test]
    async fn test_list_methods_sorted() {
        let fx = fixture();
        fx.dispatcher.register_method(
            MethodDescriptor::new("zeta", Permission::from("p")),
            echo_handler(),
        );
        fx.dispatcher.register_method(
            MethodDescriptor::new("alpha", Permission::from("p")),
            echo_handler(),
        );

        let names: Vec<String> = fx
            .dispatcher
            .list_methods()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["alpha".to_string(), "zeta".to_string()]);
    }
}
