// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # RPC Envelope
//!
//! Wire-level types for inter-agent method invocation. A [`MethodCall`]
//! travels from caller to the target's dispatcher; a [`MethodResponse`]
//! echoes the request id and carries either a result payload or a structured
//! [`RpcError`]. The envelope is serde-serializable end to end so a real
//! transport can ship it as JSON; delivery itself is the `Transport`
//! collaborator's problem.
//!
//! [`MethodDescriptor`] is the declared contract for one dispatchable
//! method: its name, the permission a caller must hold, and the parameter
//! shape. Dynamic "call whatever attribute exists" dispatch is replaced by
//! this closed, validated set.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::domain::agent::AgentId;
use crate::domain::security::Permission;

/// Caller-supplied correlation id, echoed verbatim in the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Structured error codes every dispatch failure maps onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RpcErrorCode {
    AgentNotFound,
    MethodNotFound,
    InvalidParams,
    Unauthorized,
    InternalError,
    Timeout,
}

impl std::fmt::Display for RpcErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Structured error object carried in a [`MethodResponse`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: RpcErrorCode,
    pub message: String,
}

impl RpcError {
    pub fn new(code: RpcErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    pub fn agent_not_found(agent_id: AgentId) -> Self {
        Self::new(RpcErrorCode::AgentNotFound, format!("Agent not found or stale: {agent_id}"))
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(RpcErrorCode::MethodNotFound, format!("Unknown method: {method}"))
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::InvalidParams, message)
    }

    pub fn unauthorized() -> Self {
        Self::new(RpcErrorCode::Unauthorized, "Unauthorized")
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::InternalError, message)
    }

    pub fn timeout(deadline: Duration) -> Self {
        Self::new(
            RpcErrorCode::Timeout,
            format!("Handler did not complete within {deadline:?}"),
        )
    }
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for RpcError {}

/// Request half of the RPC envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodCall {
    pub request_id: RequestId,
    pub target_agent: AgentId,
    pub method: String,
    /// JSON parameters, validated against the method's declared contract.
    #[serde(default)]
    pub params: serde_json::Value,
    /// Raw access token issued by the auth service.
    pub token: String,
    /// Caller-specified deadline; the dispatcher default applies when unset.
    #[serde(default)]
    #[serde(with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

impl MethodCall {
    pub fn new(target_agent: AgentId, method: impl Into<String>, params: serde_json::Value, token: impl Into<String>) -> Self {
        Self {
            request_id: RequestId::new(),
            target_agent,
            method: method.into(),
            params,
            token: token.into(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Response half of the RPC envelope. Exactly one of `result` and `error`
/// is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodResponse {
    pub request_id: RequestId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl MethodResponse {
    pub fn ok(request_id: RequestId, result: serde_json::Value) -> Self {
        Self { request_id, result: Some(result), error: None }
    }

    pub fn err(request_id: RequestId, error: RpcError) -> Self {
        Self { request_id, result: None, error: Some(error) }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Expected JSON type of a declared parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Number,
    Boolean,
    Object,
    Array,
    /// Any JSON value, including null.
    Any,
}

impl ParamType {
    pub fn matches(&self, value: &serde_json::Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Number => value.is_number(),
            ParamType::Boolean => value.is_boolean(),
            ParamType::Object => value.is_object(),
            ParamType::Array => value.is_array(),
            ParamType::Any => true,
        }
    }
}

/// One declared parameter of a method contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ParamType,
    #[serde(default)]
    pub required: bool,
}

/// Declared contract for a dispatchable method.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodDescriptor {
    /// Dotted method name, e.g. `calc.add`.
    pub name: String,
    /// Permission a caller's context must hold for this method.
    pub required_permission: Permission,
    /// Declared parameters; anything outside this set is rejected.
    #[serde(default)]
    pub params: Vec<ParamSpec>,
}

impl MethodDescriptor {
    pub fn new(name: impl Into<String>, required_permission: Permission) -> Self {
        Self {
            name: name.into(),
            required_permission,
            params: Vec::new(),
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, ty: ParamType) -> Self {
        self.params.push(ParamSpec { name: name.into(), ty, required: true });
        self
    }

    pub fn with_optional_param(mut self, name: impl Into<String>, ty: ParamType) -> Self {
        self.params.push(ParamSpec { name: name.into(), ty, required: false });
        self
    }

    /// Validate call parameters against this contract.
    ///
    /// The contract is closed: missing required parameters, wrong types, and
    /// undeclared parameters all fail with the offending parameter named.
    pub fn validate_params(&self, params: &serde_json::Value) -> Result<(), RpcError> {
        let map = match params {
            serde_json::Value::Object(map) => map,
            serde_json::Value::Null if self.params.iter().all(|p| !p.required) => return Ok(()),
            serde_json::Value::Null => {
                return Err(RpcError::invalid_params("Missing parameter object"));
            }
            _ => {
                return Err(RpcError::invalid_params("Parameters must be a JSON object"));
            }
        };

        for spec in &self.params {
            match map.get(&spec.name) {
                Some(value) => {
                    if !spec.ty.matches(value) {
                        return Err(RpcError::invalid_params(format!(
                            "Parameter `{}` has the wrong type (expected {:?})",
                            spec.name, spec.ty
                        )));
                    }
                }
                None if spec.required => {
                    return Err(RpcError::invalid_params(format!(
                        "Missing required parameter `{}`",
                        spec.name
                    )));
                }
                None => {}
            }
        }

        for key in map.keys() {
            if !self.params.iter().any(|p| p.name == *key) {
                return Err(RpcError::invalid_params(format!("Unexpected parameter `{key}`")));
            }
        }

        Ok(())
    }
}
