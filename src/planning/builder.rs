//! Request to plan conversion
//!
//! Ordering is a Kahn topological sort over declared `after` dependencies
//! between the requested calls. Among steps that are ready at the same time
//! the one named first in the request goes first.

use crate::errors::PlanningError;
use crate::planning::types::{Plan, Request, Step};
use crate::tools::registry::ToolRegistry;
use crate::tools::types::ToolDefinition;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Arc;
use tracing::debug;

/// Builds validated, ordered plans from requests
#[derive(Clone)]
pub struct PlanBuilder {
    registry: Arc<ToolRegistry>,
}

impl PlanBuilder {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    /// Resolve, validate and order every call of a request
    pub fn build(&self, request: &Request) -> Result<Plan, PlanningError> {
        if request.calls.is_empty() {
            return Err(PlanningError::InvalidRequest(
                "request contains no calls".to_string(),
            ));
        }

        let mut steps = Vec::with_capacity(request.calls.len());
        let mut definitions: Vec<Arc<ToolDefinition>> = Vec::with_capacity(request.calls.len());

        for (index, call) in request.calls.iter().enumerate() {
            let definition = self
                .registry
                .get(&call.tool_name)
                .ok_or_else(|| PlanningError::UnknownTool(call.tool_name.clone()))?;

            definition
                .validate_parameters(&call.parameters)
                .map_err(|reason| PlanningError::InvalidParameters {
                    tool: call.tool_name.clone(),
                    reason,
                })?;

            steps.push(Step::new(
                call.tool_name.clone(),
                call.parameters.clone(),
                definition.parallel_safe,
                index,
            ));
            definitions.push(definition);
        }

        let predecessors = Self::predecessors(&steps, &definitions);
        let order = Self::topological_order(&steps, &predecessors)?;

        let mut position = vec![0usize; order.len()];
        for (pos, &index) in order.iter().enumerate() {
            position[index] = pos;
        }

        let mut slots: Vec<Option<Step>> = steps.into_iter().map(Some).collect();
        let ordered: Vec<Step> = order
            .into_iter()
            .filter_map(|index| {
                let mut after: Vec<usize> =
                    predecessors[index].iter().map(|&p| position[p]).collect();
                after.sort_unstable();
                slots[index].take().map(|step| step.with_after(after))
            })
            .collect();

        let plan = Plan::new(ordered);
        debug!(steps = plan.len(), tools = ?plan.tool_names(), "plan built");
        Ok(plan)
    }

    /// For each request index, the request indices it must follow
    fn predecessors(steps: &[Step], definitions: &[Arc<ToolDefinition>]) -> Vec<Vec<usize>> {
        definitions
            .iter()
            .enumerate()
            .map(|(i, definition)| {
                steps
                    .iter()
                    .enumerate()
                    .filter(|(j, other)| {
                        *j != i && definition.after.iter().any(|dep| dep == other.tool_name())
                    })
                    .map(|(j, _)| j)
                    .collect()
            })
            .collect()
    }

    fn topological_order(
        steps: &[Step],
        predecessors: &[Vec<usize>],
    ) -> Result<Vec<usize>, PlanningError> {
        let n = steps.len();
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut in_degree = vec![0usize; n];

        for (i, preds) in predecessors.iter().enumerate() {
            for &j in preds {
                dependents[j].push(i);
                in_degree[i] += 1;
            }
        }

        let mut ready: BinaryHeap<Reverse<usize>> = (0..n)
            .filter(|&i| in_degree[i] == 0)
            .map(Reverse)
            .collect();
        let mut order = Vec::with_capacity(n);

        while let Some(Reverse(i)) = ready.pop() {
            order.push(i);
            for &dependent in &dependents[i] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    ready.push(Reverse(dependent));
                }
            }
        }

        if order.len() < n {
            let mut tools: Vec<String> = Vec::new();
            for (i, step) in steps.iter().enumerate() {
                if in_degree[i] > 0 && !tools.iter().any(|t| t == step.tool_name()) {
                    tools.push(step.tool_name().to_string());
                }
            }
            return Err(PlanningError::CyclicDependency { tools });
        }

        Ok(order)
    }
}
