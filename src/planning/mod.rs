//! Planning: turns a request into an ordered, validated plan
//!
//! Parameters are checked against the registry's declared shapes, each
//! step's concurrency classification is copied from its tool definition,
//! and steps are ordered by declared dependencies.

pub mod builder;
pub mod types;

// Re-export commonly used types
pub use builder::PlanBuilder;
pub use types::{Plan, Request, Step, ToolCall};
