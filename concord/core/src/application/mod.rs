// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod auth;
pub mod dispatcher;
pub mod registry;
pub mod task_manager;
pub mod workflow_engine;

// Re-export services for convenience
pub use auth::AuthService;
pub use dispatcher::{HandlerFn, MethodDispatcher, MethodHandler};
pub use registry::{AgentRegistry, SweepStats};
pub use task_manager::TaskManager;
pub use workflow_engine::WorkflowEngine;
