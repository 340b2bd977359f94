//! Plan execution
//!
//! - Coordinator with parallel segments and barrier steps
//! - Per-run context (user, active tools, completed results, cancellation)
//! - Step results and failure policy

pub mod context;
pub mod coordinator;
pub mod types;

// Re-export commonly used types
pub use context::ExecutionContext;
pub use coordinator::{CoordinatorConfig, ExecutionCoordinator, DEFAULT_STEP_TIMEOUT, DEFAULT_WORKER_LIMIT};
pub use types::{FailurePolicy, ResultSource, StepOutcome, StepResult};
