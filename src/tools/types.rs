//! Tool contract types
//!
//! Tool implementations are opaque callables. What the orchestrator knows
//! about them comes from the declared `ToolDefinition`: parameter shape,
//! concurrency safety, retry safety and ordering dependencies.

use crate::errors::ToolError;
use crate::security::identity::User;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;
use uuid::Uuid;

/// JSON type a parameter must have
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
    Any,
}

impl ParamKind {
    /// Check a value against this kind
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            ParamKind::String => value.is_string(),
            ParamKind::Number => value.is_number(),
            ParamKind::Integer => value.is_i64() || value.is_u64(),
            ParamKind::Boolean => value.is_boolean(),
            ParamKind::Array => value.is_array(),
            ParamKind::Object => value.is_object(),
            ParamKind::Any => true,
        }
    }
}

/// Declared parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    pub kind: ParamKind,
    pub required: bool,
}

/// Registry-declared description of a tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name
    pub name: String,

    /// Tool description
    pub description: String,

    /// Accepted parameters; anything else is rejected at planning time
    pub parameters: Vec<ParameterSpec>,

    /// Whether the tool may run concurrently with other steps
    pub parallel_safe: bool,

    /// Whether the tool is idempotent and may be retried
    pub retry_safe: bool,

    /// Tools that must run before this one when both appear in a request
    pub after: Vec<String>,
}

impl ToolDefinition {
    /// Create a parallel-safe, non-retryable definition without parameters
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
            parallel_safe: true,
            retry_safe: false,
            after: Vec::new(),
        }
    }

    /// Declare a required parameter
    pub fn param(mut self, name: impl Into<String>, kind: ParamKind) -> Self {
        self.parameters.push(ParameterSpec {
            name: name.into(),
            kind,
            required: true,
        });
        self
    }

    /// Declare an optional parameter
    pub fn optional_param(mut self, name: impl Into<String>, kind: ParamKind) -> Self {
        self.parameters.push(ParameterSpec {
            name: name.into(),
            kind,
            required: false,
        });
        self
    }

    pub fn parallel_safe(mut self, parallel_safe: bool) -> Self {
        self.parallel_safe = parallel_safe;
        self
    }

    pub fn retry_safe(mut self, retry_safe: bool) -> Self {
        self.retry_safe = retry_safe;
        self
    }

    /// Declare that this tool runs after `tool`
    pub fn after(mut self, tool: impl Into<String>) -> Self {
        self.after.push(tool.into());
        self
    }

    /// Validate a parameter mapping against the declared shape
    pub fn validate_parameters(&self, parameters: &Map<String, Value>) -> Result<(), String> {
        for key in parameters.keys() {
            if !self.parameters.iter().any(|spec| &spec.name == key) {
                return Err(format!("unknown parameter '{}'", key));
            }
        }

        for spec in &self.parameters {
            match parameters.get(&spec.name) {
                Some(value) if !spec.kind.accepts(value) => {
                    return Err(format!(
                        "parameter '{}' must be of type {:?}",
                        spec.name, spec.kind
                    ));
                }
                None if spec.required => {
                    return Err(format!("missing required parameter '{}'", spec.name));
                }
                _ => {}
            }
        }

        Ok(())
    }
}

/// Per-invocation information handed to a tool
#[derive(Debug, Clone)]
pub struct InvocationContext {
    /// Plan run the invocation belongs to
    pub run_id: Uuid,

    /// Caller on whose behalf the tool runs
    pub user: User,

    /// Position of the step in the plan
    pub step_index: usize,
}

/// Callable tool implementation
#[async_trait]
pub trait Tool: Send + Sync {
    async fn invoke(
        &self,
        parameters: &Map<String, Value>,
        context: &InvocationContext,
    ) -> Result<Value, ToolError>;
}

/// Readable resource exposed by the registry
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    async fn read(&self) -> Result<Value, ToolError>;
}

/// Adapter turning an async closure into a `Tool`
pub struct FnTool<F> {
    func: F,
}

#[async_trait]
impl<F, Fut> Tool for FnTool<F>
where
    F: Fn(Map<String, Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
{
    async fn invoke(
        &self,
        parameters: &Map<String, Value>,
        _context: &InvocationContext,
    ) -> Result<Value, ToolError> {
        (self.func)(parameters.clone()).await
    }
}

/// Wrap an async closure as a shareable tool
pub fn tool_fn<F, Fut>(func: F) -> Arc<dyn Tool>
where
    F: Fn(Map<String, Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
{
    Arc::new(FnTool { func })
}

/// Adapter turning an async closure into a `ResourceProvider`
pub struct FnResource<F> {
    func: F,
}

#[async_trait]
impl<F, Fut> ResourceProvider for FnResource<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
{
    async fn read(&self) -> Result<Value, ToolError> {
        (self.func)().await
    }
}

/// Wrap an async closure as a shareable resource
pub fn resource_fn<F, Fut>(func: F) -> Arc<dyn ResourceProvider>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
{
    Arc::new(FnResource { func })
}
