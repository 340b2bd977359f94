//! Step results and failure policy

use crate::cache::Fingerprint;
use crate::errors::StepError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// What to do after a step fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop submitting steps after the first hard failure
    #[default]
    FailFast,

    /// Run every step and report failures inline
    BestEffort,
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailurePolicy::FailFast => write!(f, "fail_fast"),
            FailurePolicy::BestEffort => write!(f, "best_effort"),
        }
    }
}

/// Where a completed step's value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultSource {
    /// Live cache entry
    Cache,

    /// Concurrent leader for the same fingerprint
    Shared,

    /// Tool was invoked for this step
    Dispatched,
}

/// Final state of a step
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Completed { value: Value, source: ResultSource },
    Failed(StepError),

    /// Never submitted because the run was halted
    Skipped,
}

/// Result of one plan step
#[derive(Debug, Clone, PartialEq)]
pub struct StepResult {
    /// Position of the step in the plan
    pub index: usize,
    pub tool_name: String,
    pub fingerprint: Fingerprint,
    pub outcome: StepOutcome,
    pub duration_ms: u64,
}

impl StepResult {
    pub fn skipped(index: usize, tool_name: impl Into<String>, fingerprint: Fingerprint) -> Self {
        Self {
            index,
            tool_name: tool_name.into(),
            fingerprint,
            outcome: StepOutcome::Skipped,
            duration_ms: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, StepOutcome::Completed { .. })
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, StepOutcome::Failed(_))
    }

    pub fn value(&self) -> Option<&Value> {
        match &self.outcome {
            StepOutcome::Completed { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&StepError> {
        match &self.outcome {
            StepOutcome::Failed(error) => Some(error),
            _ => None,
        }
    }

    pub fn source(&self) -> Option<ResultSource> {
        match &self.outcome {
            StepOutcome::Completed { source, .. } => Some(*source),
            _ => None,
        }
    }

    /// JSON view used by the transport layer
    pub fn to_json(&self) -> Value {
        let mut out = serde_json::json!({
            "index": self.index,
            "tool": self.tool_name,
            "fingerprint": self.fingerprint,
            "duration_ms": self.duration_ms,
        });
        match &self.outcome {
            StepOutcome::Completed { value, source } => {
                out["status"] = "completed".into();
                out["source"] = serde_json::to_value(source).unwrap_or(Value::Null);
                out["result"] = value.clone();
            }
            StepOutcome::Failed(error) => {
                out["status"] = "failed".into();
                out["error"] = error.to_string().into();
            }
            StepOutcome::Skipped => {
                out["status"] = "skipped".into();
            }
        }
        out
    }
}
