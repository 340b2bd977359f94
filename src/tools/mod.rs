//! Tool contract and registry
//!
//! - Tool / resource traits and declared definitions
//! - Injected registry with registration handles
//! - Retry manager for retry-safe tools
//! - Built-in tools (calculate, echo)

pub mod builtin;
pub mod registry;
pub mod retry;
pub mod types;

// Re-export commonly used types
pub use registry::{ResolvedTool, ToolHandle, ToolRegistry};
pub use retry::RetryManager;
pub use types::{
    resource_fn, tool_fn, InvocationContext, ParamKind, ParameterSpec, ResourceProvider, Tool,
    ToolDefinition,
};
