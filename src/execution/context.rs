//! Per-run execution state

use crate::execution::types::StepResult;
use crate::security::User;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Mutable state of a single plan run
///
/// Owned by one `run` call at a time; never shared between runs.
#[derive(Debug)]
pub struct ExecutionContext {
    run_id: Uuid,
    user: User,
    /// Tool name -> number of its steps currently running
    active: HashMap<String, usize>,
    completed: Vec<StepResult>,
    cancellation: CancellationToken,
}

impl ExecutionContext {
    pub fn new(user: User) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            user,
            active: HashMap::new(),
            completed: Vec::new(),
            cancellation: CancellationToken::new(),
        }
    }

    /// Use a caller-owned token to stop submission of further steps
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Names of tools with at least one running step, sorted
    pub fn active_tools(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.active.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn is_active(&self, tool_name: &str) -> bool {
        self.active.contains_key(tool_name)
    }

    /// Results recorded so far, in completion order
    pub fn completed(&self) -> &[StepResult] {
        &self.completed
    }

    pub(crate) fn mark_active(&mut self, tool_name: &str) {
        *self.active.entry(tool_name.to_string()).or_insert(0) += 1;
    }

    pub(crate) fn mark_finished(&mut self, tool_name: &str) {
        if let Some(count) = self.active.get_mut(tool_name) {
            *count -= 1;
            if *count == 0 {
                self.active.remove(tool_name);
            }
        }
    }

    pub(crate) fn record(&mut self, result: StepResult) {
        self.completed.push(result);
    }
}
