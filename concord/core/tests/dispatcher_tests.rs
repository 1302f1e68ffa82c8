// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Integration tests for the method dispatch pipeline
//!
//! These tests verify the full call path:
//! 1. Register agents, credentials, and method handlers
//! 2. Log in for a token pair
//! 3. Dispatch calls through resolution, auth, and validation
//! 4. Verify deadline enforcement and panic containment

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use concord_core::application::auth::AuthService;
use concord_core::application::dispatcher::{HandlerFn, MethodDispatcher, MethodHandler};
use concord_core::application::registry::AgentRegistry;
use concord_core::config::{AuthConfig, DispatcherConfig, RegistryConfig};
use concord_core::domain::agent::{AgentCard, AgentId};
use concord_core::domain::rpc::{MethodCall, MethodDescriptor, ParamType, RpcErrorCode};
use concord_core::domain::security::Permission;
use concord_core::infrastructure::event_bus::EventBus;
use concord_core::infrastructure::stores::{InMemoryCardStore, InMemoryCredentialStore};
use concord_core::infrastructure::transport::{LoopbackTransport, Transport};

struct Harness {
    dispatcher: Arc<MethodDispatcher>,
    registry: Arc<AgentRegistry>,
    credentials: InMemoryCredentialStore,
    auth: Arc<AuthService>,
}

fn harness_with_auth(auth_config: AuthConfig) -> Harness {
    let event_bus = EventBus::new(256);
    let registry = Arc::new(AgentRegistry::new(
        Arc::new(InMemoryCardStore::new()),
        event_bus.clone(),
        RegistryConfig::default(),
    ));
    let credentials = InMemoryCredentialStore::new();
    let auth = Arc::new(AuthService::new(
        Arc::new(credentials.clone()),
        auth_config,
    ));
    let dispatcher = Arc::new(MethodDispatcher::new(
        registry.clone(),
        auth.clone(),
        event_bus,
        DispatcherConfig::default(),
    ));
    Harness {
        dispatcher,
        registry,
        credentials,
        auth,
    }
}

fn harness() -> Harness {
    harness_with_auth(AuthConfig::default())
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

/// Register an agent card advertising `echo`, store its credential, and log
/// in. Returns the agent id and a live access token.
async fn seed_echo_agent(harness: &Harness, permissions: [&str; 1]) -> (AgentId, String) {
    let card = AgentCard::new("echoer", "1.0.0", "inproc://echoer").with_method("echo");
    let agent_id = card.id;
    harness.registry.register(card).await.unwrap();

    harness.credentials.insert(
        agent_id,
        "wordperfect",
        permissions.map(Permission::from),
    );
    let context = harness.auth.login(agent_id, "wordperfect").await.unwrap();
    (agent_id, context.access_token.as_str().to_string())
}

#[tokio::test]
async fn test_dispatch_happy_path() {
    let harness = harness();
    let (agent_id, token) = seed_echo_agent(&harness, ["rpc.echo"]).await;
    harness
        .dispatcher
        .register_method(echo_descriptor(), echo_handler());

    let call = MethodCall::new(agent_id, "echo", json!({ "text": "ping" }), token);
    let request_id = call.request_id;
    let response = harness.dispatcher.dispatch(call).await;

    assert_eq!(response.request_id, request_id);
    assert!(response.is_ok(), "unexpected error: {:?}", response.error);
    assert_eq!(response.result, Some(json!({ "echoed": "ping" })));
}

#[tokio::test]
async fn test_dispatch_rejects_expired_token() {
    let harness = harness_with_auth(AuthConfig {
        access_ttl: Duration::ZERO,
        refresh_ttl: Duration::from_secs(3600),
    });
    let (agent_id, token) = seed_echo_agent(&harness, ["rpc.echo"]).await;
    harness
        .dispatcher
        .register_method(echo_descriptor(), echo_handler());

    tokio::time::sleep(Duration::from_millis(5)).await;
    let call = MethodCall::new(agent_id, "echo", json!({ "text": "late" }), token);
    let response = harness.dispatcher.dispatch(call).await;
    assert_eq!(response.error.unwrap().code, RpcErrorCode::Unauthorized);
}

#[tokio::test]
async fn test_dispatch_rejects_missing_permission() {
    let harness = harness();
    // Credentialed and logged in, but without the permission echo demands.
    let (agent_id, token) = seed_echo_agent(&harness, ["rpc.transcribe"]).await;
    harness
        .dispatcher
        .register_method(echo_descriptor(), echo_handler());

    let call = MethodCall::new(agent_id, "echo", json!({ "text": "psst" }), token);
    let response = harness.dispatcher.dispatch(call).await;
    assert_eq!(response.error.unwrap().code, RpcErrorCode::Unauthorized);
}

#[tokio::test]
async fn test_dispatch_rejects_bad_params() {
    let harness = harness();
    let (agent_id, token) = seed_echo_agent(&harness, ["rpc.echo"]).await;
    harness
        .dispatcher
        .register_method(echo_descriptor(), echo_handler());

    let call = MethodCall::new(agent_id, "echo", json!({ "text": 7 }), token);
    let response = harness.dispatcher.dispatch(call).await;
    let error = response.error.unwrap();
    assert_eq!(error.code, RpcErrorCode::InvalidParams);
    assert!(error.message.contains("text"));
}

#[tokio::test]
async fn test_dispatch_deadline_cancels_handler() {
    let harness = harness();
    let (agent_id, token) = seed_echo_agent(&harness, ["rpc.echo"]).await;

    let cancelled = Arc::new(AtomicBool::new(false));
    let observer = cancelled.clone();
    harness.dispatcher.register_method(
        echo_descriptor(),
        Arc::new(HandlerFn::new(move |_params: Value, cancel: CancellationToken| {
            let observer = observer.clone();
            async move {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        observer.store(true, Ordering::SeqCst);
                        Err(anyhow::anyhow!("cancelled"))
                    }
                    _ = tokio::time::sleep(Duration::from_secs(30)) => {
                        Ok(json!({ "echoed": "too slow" }))
                    }
                }
            }
        })),
    );

    let call = MethodCall::new(agent_id, "echo", json!({ "text": "hurry" }), token)
        .with_timeout(Duration::from_millis(50));
    let response = harness.dispatcher.dispatch(call).await;
    assert_eq!(response.error.unwrap().code, RpcErrorCode::Timeout);

    // The handler observes the cancellation signal rather than being
    // aborted mid-write.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(cancelled.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_dispatch_contains_handler_panic() {
    let harness = harness();
    let (agent_id, token) = seed_echo_agent(&harness, ["rpc.echo"]).await;
    harness.dispatcher.register_method(
        echo_descriptor(),
        Arc::new(HandlerFn::new(|_params: Value, _cancel| async move {
            panic!("handler bug")
        })),
    );

    let call = MethodCall::new(agent_id, "echo", json!({ "text": "boom" }), token.clone());
    let response = harness.dispatcher.dispatch(call).await;
    let error = response.error.unwrap();
    assert_eq!(error.code, RpcErrorCode::InternalError);
    assert!(error.message.contains("panicked"));

    // The dispatcher itself survives and keeps serving calls.
    harness
        .dispatcher
        .register_method(echo_descriptor(), echo_handler());
    let retry = MethodCall::new(agent_id, "echo", json!({ "text": "again" }), token);
    assert!(harness.dispatcher.dispatch(retry).await.is_ok());
}

#[tokio::test]
async fn test_loopback_transport_delivers_responses() {
    let harness = harness();
    let (agent_id, token) = seed_echo_agent(&harness, ["rpc.echo"]).await;
    harness
        .dispatcher
        .register_method(echo_descriptor(), echo_handler());

    let transport = LoopbackTransport::new(harness.dispatcher.clone());
    let call = MethodCall::new(agent_id, "echo", json!({ "text": "direct" }), token);
    let response = transport.deliver(call).await.unwrap();
    assert_eq!(response.result, Some(json!({ "echoed": "direct" })));

    // Pipeline failures still arrive as responses, not transport errors.
    let bad = MethodCall::new(AgentId::new(), "echo", json!({}), "nope");
    let response = transport.deliver(bad).await.unwrap();
    assert_eq!(response.error.unwrap().code, RpcErrorCode::AgentNotFound);
}
