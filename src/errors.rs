//! Error types for sparkmcp
//!
//! Planning errors abort before any step runs. Step errors are data recorded
//! against a single step; whether they abort the rest of a plan is decided by
//! the configured failure policy.

use crate::execution::types::StepResult;
use crate::security::rbac::Action;
use thiserror::Error;

/// Failure reported by a tool or resource implementation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    /// Tool ran and reported a failure
    #[error("{0}")]
    Failed(String),

    /// Tool rejected its input at runtime
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Errors raised while turning a request into a plan
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanningError {
    /// Request is not an object or does not name a tool
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Tool name is absent from the registry
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// Parameters do not match the tool's declared shape
    #[error("Invalid parameters for {tool}: {reason}")]
    InvalidParameters { tool: String, reason: String },

    /// Declared dependencies cannot be topologically ordered
    #[error("Cyclic dependency between tools: {}", tools.join(", "))]
    CyclicDependency { tools: Vec<String> },
}

/// Failure of a single plan step
///
/// `Clone` so that single-flight followers receive exactly the failure their
/// leader observed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StepError {
    #[error("Permission denied: {action} on tool {tool}")]
    PermissionDenied { tool: String, action: Action },

    #[error("Tool {tool} failed: {source}")]
    ToolFailed {
        tool: String,
        #[source]
        source: ToolError,
    },

    #[error("Tool {tool} timed out after {after_ms}ms")]
    Timeout { tool: String, after_ms: u64 },

    /// The leader for this fingerprint went away without publishing
    #[error("Execution of {tool} was abandoned before a result was published")]
    Abandoned { tool: String },
}

impl StepError {
    /// Tool name the failure belongs to
    pub fn tool(&self) -> &str {
        match self {
            StepError::PermissionDenied { tool, .. }
            | StepError::ToolFailed { tool, .. }
            | StepError::Timeout { tool, .. }
            | StepError::Abandoned { tool } => tool,
        }
    }

    /// Check if a retry may be attempted
    ///
    /// Only tools that declare themselves retry-safe are ever retried, and
    /// only for failures of the invocation itself. Rejected input never
    /// succeeds on a second attempt.
    pub fn is_retryable(&self, retry_safe: bool) -> bool {
        if !retry_safe {
            return false;
        }
        matches!(
            self,
            StepError::ToolFailed {
                source: ToolError::Failed(_),
                ..
            } | StepError::Timeout { .. }
        )
    }
}

/// Backing store failure; recovered locally as a permanent miss
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache store unavailable: {0}")]
    Unavailable(String),
}

/// Step that triggered a fail-fast abort
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepFailure {
    /// Position of the step in the plan
    pub index: usize,

    /// The step's failure
    pub error: StepError,
}

/// Errors raised while running a plan
///
/// Every variant carries one result per plan step, in plan order. Steps that
/// were never submitted appear as `StepOutcome::Skipped`.
#[derive(Error, Debug, Clone)]
pub enum ExecutionError {
    /// Fail-fast policy stopped the plan at the first hard failure
    #[error("Plan aborted at step {}: {}", failure.index, failure.error)]
    Aborted {
        failure: StepFailure,
        results: Vec<StepResult>,
    },

    /// Best-effort policy completed the plan but some steps failed
    #[error("{failed} step(s) failed")]
    PartialFailure {
        failed: usize,
        results: Vec<StepResult>,
    },

    /// Caller cancelled the run
    #[error("Plan run cancelled")]
    Cancelled { results: Vec<StepResult> },
}

impl ExecutionError {
    /// Per-step results collected before the run ended
    pub fn results(&self) -> &[StepResult] {
        match self {
            ExecutionError::Aborted { results, .. }
            | ExecutionError::PartialFailure { results, .. }
            | ExecutionError::Cancelled { results } => results,
        }
    }
}

/// Main error type for the orchestrator
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error(transparent)]
    Planning(#[from] PlanningError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    /// Registration or resource access refused by RBAC
    #[error("Permission denied: {action} on {target}")]
    PermissionDenied { action: Action, target: String },

    #[error("Unknown resource: {0}")]
    UnknownResource(String),

    #[error("Resource error: {0}")]
    Resource(#[from] ToolError),

    #[error("Registration error: {0}")]
    Registration(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl OrchestratorError {
    /// Whether the transport layer should answer with a client error
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            OrchestratorError::Planning(_)
                | OrchestratorError::PermissionDenied { .. }
                | OrchestratorError::UnknownResource(_)
        )
    }
}

/// Result type alias for orchestrator operations
pub type Result<T> = std::result::Result<T, OrchestratorError>;
