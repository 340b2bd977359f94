//! Request and plan data structures

use crate::cache::Fingerprint;
use crate::errors::PlanningError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One tool call named by a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool_name: String,

    #[serde(default)]
    pub parameters: Map<String, Value>,
}

impl ToolCall {
    pub fn new(tool_name: impl Into<String>, parameters: Map<String, Value>) -> Self {
        Self {
            tool_name: tool_name.into(),
            parameters,
        }
    }

    fn from_value(value: &Value) -> Result<Self, PlanningError> {
        let object = value
            .as_object()
            .ok_or_else(|| PlanningError::InvalidRequest("tool call must be an object".to_string()))?;

        let tool_name = object
            .get("tool_name")
            .or_else(|| object.get("tool"))
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| {
                PlanningError::InvalidRequest("missing tool identifier ('tool_name' or 'tool')".to_string())
            })?;

        let parameters = match object.get("parameters") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(parameters)) => parameters.clone(),
            Some(_) => {
                return Err(PlanningError::InvalidParameters {
                    tool: tool_name.to_string(),
                    reason: "parameters must be an object".to_string(),
                })
            }
        };

        Ok(Self::new(tool_name, parameters))
    }
}

/// Caller request, already mapped to tool names
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub calls: Vec<ToolCall>,
}

impl Request {
    /// Request for a single tool call
    pub fn single(tool_name: impl Into<String>, parameters: Map<String, Value>) -> Self {
        Self {
            calls: vec![ToolCall::new(tool_name, parameters)],
        }
    }

    pub fn batch(calls: Vec<ToolCall>) -> Self {
        Self { calls }
    }

    /// Parse `{"tool_name": .., "parameters": {..}}` or `{"calls": [..]}`
    pub fn from_value(value: &Value) -> Result<Self, PlanningError> {
        let object = value
            .as_object()
            .ok_or_else(|| PlanningError::InvalidRequest("request must be a JSON object".to_string()))?;

        match object.get("calls") {
            Some(Value::Array(calls)) => {
                if calls.is_empty() {
                    return Err(PlanningError::InvalidRequest(
                        "request contains no calls".to_string(),
                    ));
                }
                let calls = calls
                    .iter()
                    .map(ToolCall::from_value)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Self::batch(calls))
            }
            Some(_) => Err(PlanningError::InvalidRequest(
                "'calls' must be an array".to_string(),
            )),
            None => Ok(Self {
                calls: vec![ToolCall::from_value(value)?],
            }),
        }
    }
}

/// Planned invocation of one tool
///
/// Immutable once built; `parallel_safe` comes from the registry declaration
/// and the fingerprint is derived from the name and parameters at construction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Step {
    tool_name: String,
    parameters: Map<String, Value>,
    parallel_safe: bool,
    request_index: usize,
    fingerprint: Fingerprint,
    after: Vec<usize>,
}

impl Step {
    pub fn new(
        tool_name: impl Into<String>,
        parameters: Map<String, Value>,
        parallel_safe: bool,
        request_index: usize,
    ) -> Self {
        let tool_name = tool_name.into();
        let fingerprint = Fingerprint::of(&tool_name, &parameters);
        Self {
            tool_name,
            parameters,
            parallel_safe,
            request_index,
            fingerprint,
            after: Vec::new(),
        }
    }

    pub(crate) fn with_after(mut self, after: Vec<usize>) -> Self {
        self.after = after;
        self
    }

    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    pub fn parameters(&self) -> &Map<String, Value> {
        &self.parameters
    }

    pub fn parallel_safe(&self) -> bool {
        self.parallel_safe
    }

    /// Position of the originating call in the request
    pub fn request_index(&self) -> usize {
        self.request_index
    }

    /// Cache key of this invocation
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// Plan positions of steps that must finish before this one starts
    pub fn after(&self) -> &[usize] {
        &self.after
    }

    /// Whether the step must run with no other step active
    pub fn is_barrier(&self) -> bool {
        !self.parallel_safe
    }
}

/// Ordered sequence of steps
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Plan {
    steps: Vec<Step>,
}

impl Plan {
    pub fn new(steps: Vec<Step>) -> Self {
        Self { steps }
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn get(&self, index: usize) -> Option<&Step> {
        self.steps.get(index)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Step> {
        self.steps.iter()
    }

    /// Tool names in execution order
    pub fn tool_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.tool_name.as_str()).collect()
    }
}
