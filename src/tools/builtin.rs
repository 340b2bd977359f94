//! Built-in tools
//!
//! - calculate: binary arithmetic on two numbers
//! - echo: returns its message unchanged

use crate::errors::{Result, ToolError};
use crate::tools::registry::ToolRegistry;
use crate::tools::types::{InvocationContext, ParamKind, Tool, ToolDefinition};
use async_trait::async_trait;
use serde_json::{json, Map, Number, Value};
use std::sync::Arc;

/// Register every built-in tool
pub fn register_all(registry: &ToolRegistry) -> Result<()> {
    registry.register(Calculate::definition(), Arc::new(Calculate))?;
    registry.register(Echo::definition(), Arc::new(Echo))?;
    Ok(())
}

/// Binary arithmetic tool
pub struct Calculate;

impl Calculate {
    pub fn definition() -> ToolDefinition {
        ToolDefinition::new("calculate", "Apply +, -, * or / to two numbers")
            .param("a", ParamKind::Number)
            .param("op", ParamKind::String)
            .param("b", ParamKind::Number)
            .retry_safe(true)
    }

    fn number(parameters: &Map<String, Value>, name: &str) -> std::result::Result<f64, ToolError> {
        parameters
            .get(name)
            .and_then(Value::as_f64)
            .ok_or_else(|| ToolError::InvalidInput(format!("'{}' must be a number", name)))
    }

    fn to_value(result: f64) -> std::result::Result<Value, ToolError> {
        // Whole results are reported as integers so 1 + 2 yields 3, not 3.0
        if result.fract() == 0.0 && result.abs() < 9.0e15 {
            return Ok(json!(result as i64));
        }
        Number::from_f64(result)
            .map(Value::Number)
            .ok_or_else(|| ToolError::Failed("result is not a finite number".to_string()))
    }
}

#[async_trait]
impl Tool for Calculate {
    async fn invoke(
        &self,
        parameters: &Map<String, Value>,
        _context: &InvocationContext,
    ) -> std::result::Result<Value, ToolError> {
        let a = Self::number(parameters, "a")?;
        let b = Self::number(parameters, "b")?;
        let op = parameters.get("op").and_then(Value::as_str).unwrap_or("");

        let result = match op {
            "+" => a + b,
            "-" => a - b,
            "*" => a * b,
            "/" if b == 0.0 => {
                return Err(ToolError::InvalidInput("division by zero".to_string()))
            }
            "/" => a / b,
            other => {
                return Err(ToolError::InvalidInput(format!(
                    "unsupported operator '{}'",
                    other
                )))
            }
        };

        Self::to_value(result)
    }
}

/// Echo tool
pub struct Echo;

impl Echo {
    pub fn definition() -> ToolDefinition {
        ToolDefinition::new("echo", "Return the given message").param("message", ParamKind::String)
    }
}

#[async_trait]
impl Tool for Echo {
    async fn invoke(
        &self,
        parameters: &Map<String, Value>,
        _context: &InvocationContext,
    ) -> std::result::Result<Value, ToolError> {
        Ok(parameters.get("message").cloned().unwrap_or(Value::Null))
    }
}
