//! sparkmcp - Tool Execution Orchestration Core
//!
//! Turns requests into ordered plans of tool calls, authorizes every step,
//! runs parallel-safe steps concurrently and barrier steps alone, and
//! deduplicates identical work through a fingerprint-keyed result cache.
//!
//! # Architecture
//!
//! - **planning**: request → validated, dependency-ordered `Plan`
//! - **security**: default-deny RBAC gate and identity resolution
//! - **cache**: deterministic fingerprints + single-flight result cache
//! - **execution**: coordinator with worker pool, timeouts and failure policy
//! - **orchestrator**: the shared entry point used by transports

pub mod cache;
pub mod cli;
pub mod config;
pub mod errors;
pub mod execution;
pub mod orchestrator;
pub mod planning;
pub mod security;
pub mod telemetry;
pub mod tools;

// Re-export commonly used types
pub use config::Config;
pub use errors::{ExecutionError, OrchestratorError, PlanningError, Result, StepError, ToolError};
pub use execution::{ExecutionContext, ExecutionCoordinator, FailurePolicy, StepOutcome, StepResult};
pub use orchestrator::{Orchestrator, PlanOutput};
pub use security::{Role, User};
pub use tools::{ToolDefinition, ToolRegistry};
