//! Execution coordinator
//!
//! Walks a plan segment by segment. A segment is either a maximal run of
//! consecutive parallel-safe steps, whose members are dispatched concurrently,
//! or a single barrier step that runs with nothing else of the plan active.
//! A parallel run is also cut before any step that depends on a member of
//! the run. A segment is fully drained before the next one starts.
//!
//! Per step: authorize, claim the fingerprint in the result cache, and only
//! the single-flight leader invokes the tool. Dispatches are bounded by a
//! worker pool shared by every run of this coordinator.

use crate::cache::{Claim, ResultCache};
use crate::errors::{ExecutionError, StepError, StepFailure, ToolError};
use crate::execution::context::ExecutionContext;
use crate::execution::types::{FailurePolicy, ResultSource, StepOutcome, StepResult};
use crate::planning::{Plan, Step};
use crate::security::{Action, AuthorizationGate, User};
use crate::telemetry::{self, IsolatedSink, MetricsSink};
use crate::tools::registry::ToolRegistry;
use crate::tools::retry::RetryManager;
use crate::tools::types::InvocationContext;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Default maximum number of concurrent dispatches
pub const DEFAULT_WORKER_LIMIT: usize = 8;

/// Default per-step timeout
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(30);

/// Coordinator settings
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Maximum concurrent dispatches across all runs
    pub worker_limit: usize,

    /// Limit for a single tool invocation
    pub step_timeout: Duration,

    pub failure_policy: FailurePolicy,

    /// Backoff for retry-safe tools
    pub retry: RetryManager,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            worker_limit: DEFAULT_WORKER_LIMIT,
            step_timeout: DEFAULT_STEP_TIMEOUT,
            failure_policy: FailurePolicy::default(),
            retry: RetryManager::new(),
        }
    }
}

/// Consecutive steps that are scheduled together
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Parallel(Vec<usize>),
    Barrier(usize),
}

impl Segment {
    fn indices(self) -> Vec<usize> {
        match self {
            Segment::Parallel(indices) => indices,
            Segment::Barrier(index) => vec![index],
        }
    }
}

fn segments(plan: &Plan) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut run: Vec<usize> = Vec::new();

    for (index, step) in plan.iter().enumerate() {
        if step.parallel_safe() {
            if step.after().iter().any(|dep| run.contains(dep)) {
                segments.push(Segment::Parallel(std::mem::take(&mut run)));
            }
            run.push(index);
        } else {
            if !run.is_empty() {
                segments.push(Segment::Parallel(std::mem::take(&mut run)));
            }
            segments.push(Segment::Barrier(index));
        }
    }
    if !run.is_empty() {
        segments.push(Segment::Parallel(run));
    }

    segments
}

/// Runs plans against the registry, gate and cache
#[derive(Clone)]
pub struct ExecutionCoordinator {
    registry: Arc<ToolRegistry>,
    gate: AuthorizationGate,
    cache: Arc<ResultCache>,
    metrics: Arc<dyn MetricsSink>,
    config: Arc<CoordinatorConfig>,
    workers: Arc<Semaphore>,
}

impl ExecutionCoordinator {
    pub fn new(
        registry: Arc<ToolRegistry>,
        gate: AuthorizationGate,
        cache: Arc<ResultCache>,
        metrics: Arc<dyn MetricsSink>,
        config: CoordinatorConfig,
    ) -> Self {
        let workers = Arc::new(Semaphore::new(config.worker_limit.max(1)));
        Self {
            registry,
            gate,
            cache,
            metrics: Arc::new(IsolatedSink::new(metrics)),
            config: Arc::new(config),
            workers,
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    /// Execute a plan, returning one result per step in plan order
    ///
    /// Under `FailFast` the first failed step stops submission of later
    /// steps and the run ends with `ExecutionError::Aborted`. Under
    /// `BestEffort` every step runs and failures are reported inline.
    /// Cancelling the context's token also stops submission; steps that are
    /// already running finish either way.
    pub async fn run(
        &self,
        plan: &Plan,
        ctx: &mut ExecutionContext,
    ) -> Result<Vec<StepResult>, ExecutionError> {
        let span = info_span!("plan_run", run_id = %ctx.run_id(), user = %ctx.user().id);
        self.run_plan(plan, ctx).instrument(span).await
    }

    async fn run_plan(
        &self,
        plan: &Plan,
        ctx: &mut ExecutionContext,
    ) -> Result<Vec<StepResult>, ExecutionError> {
        let started = Instant::now();
        let halt = ctx.cancellation().child_token();
        let mut slots: Vec<Option<StepResult>> = vec![None; plan.len()];
        let mut first_failure: Option<StepFailure> = None;

        for segment in segments(plan) {
            if halt.is_cancelled() {
                break;
            }

            let indices = segment.indices();
            let mut tasks = JoinSet::new();
            for &index in &indices {
                let step = plan.steps()[index].clone();
                ctx.mark_active(step.tool_name());

                let this = self.clone();
                let user = ctx.user().clone();
                let run_id = ctx.run_id();
                let halt = halt.clone();
                tasks.spawn(
                    async move { this.execute_step(index, step, user, run_id, halt).await }
                        .in_current_span(),
                );
            }

            let mut pending: HashSet<usize> = indices.iter().copied().collect();
            while let Some(joined) = tasks.join_next().await {
                let result = match joined {
                    Ok(result) => result,
                    Err(e) => {
                        warn!(error = %e, "step task did not complete");
                        continue;
                    }
                };
                pending.remove(&result.index);
                self.absorb(result, ctx, &halt, &mut slots, &mut first_failure);
            }

            // Tasks that panicked never reported back
            let mut lost: Vec<usize> = pending.into_iter().collect();
            lost.sort_unstable();
            for index in lost {
                let step = &plan.steps()[index];
                let result = StepResult {
                    index,
                    tool_name: step.tool_name().to_string(),
                    fingerprint: step.fingerprint().clone(),
                    outcome: StepOutcome::Failed(StepError::Abandoned {
                        tool: step.tool_name().to_string(),
                    }),
                    duration_ms: 0,
                };
                self.metrics.record_count(telemetry::STEP_FAILURE);
                self.absorb(result, ctx, &halt, &mut slots, &mut first_failure);
            }
        }

        let results: Vec<StepResult> = slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.unwrap_or_else(|| {
                    let step = &plan.steps()[index];
                    self.metrics.record_count(telemetry::STEP_SKIPPED);
                    StepResult::skipped(index, step.tool_name().to_string(), step.fingerprint().clone())
                })
            })
            .collect();

        let failed = results.iter().filter(|r| r.is_failure()).count();
        let skipped = results
            .iter()
            .filter(|r| matches!(r.outcome, StepOutcome::Skipped))
            .count();
        info!(
            steps = results.len(),
            failed,
            skipped,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "plan run finished"
        );

        if ctx.is_cancelled() && skipped > 0 {
            return Err(ExecutionError::Cancelled { results });
        }

        match (self.config.failure_policy, first_failure) {
            (FailurePolicy::FailFast, Some(failure)) => {
                Err(ExecutionError::Aborted { failure, results })
            }
            _ => Ok(results),
        }
    }

    /// Record a finished step against the run
    fn absorb(
        &self,
        result: StepResult,
        ctx: &mut ExecutionContext,
        halt: &CancellationToken,
        slots: &mut [Option<StepResult>],
        first_failure: &mut Option<StepFailure>,
    ) {
        ctx.mark_finished(&result.tool_name);

        if let Some(error) = result.error() {
            if first_failure.is_none() {
                *first_failure = Some(StepFailure {
                    index: result.index,
                    error: error.clone(),
                });
            }
            if self.config.failure_policy == FailurePolicy::FailFast {
                debug!(step = result.index, tool = %result.tool_name, "halting submission after failure");
                halt.cancel();
            }
        }

        ctx.record(result.clone());
        let index = result.index;
        slots[index] = Some(result);
    }

    async fn execute_step(
        self,
        index: usize,
        step: Step,
        user: User,
        run_id: Uuid,
        halt: CancellationToken,
    ) -> StepResult {
        let started = Instant::now();
        let finish = |outcome: StepOutcome| StepResult {
            index,
            tool_name: step.tool_name().to_string(),
            fingerprint: step.fingerprint().clone(),
            outcome,
            duration_ms: started.elapsed().as_millis() as u64,
        };

        if halt.is_cancelled() {
            self.metrics.record_count(telemetry::STEP_SKIPPED);
            return finish(StepOutcome::Skipped);
        }

        if !self.gate.authorize_tool(&user, step.tool_name(), Action::Execute) {
            debug!(step = index, tool = %step.tool_name(), "step denied");
            self.metrics.record_count(telemetry::PERMISSION_DENIED);
            self.metrics.record_count(telemetry::STEP_FAILURE);
            return finish(StepOutcome::Failed(StepError::PermissionDenied {
                tool: step.tool_name().to_string(),
                action: Action::Execute,
            }));
        }

        let (outcome, source) = loop {
            match self
                .cache
                .try_begin_or_await(step.fingerprint(), step.tool_name())
                .await
            {
                Claim::AlreadyCached(value) => break (Ok(value), ResultSource::Cache),
                Claim::Follower(Err(StepError::Abandoned { .. })) => {
                    // Leader went away; claim again unless this run is halting
                    if halt.is_cancelled() {
                        self.metrics.record_count(telemetry::STEP_SKIPPED);
                        return finish(StepOutcome::Skipped);
                    }
                }
                Claim::Follower(outcome) => break (outcome, ResultSource::Shared),
                Claim::Leader(leader) => {
                    match self.dispatch(index, &step, &user, run_id, &halt).await {
                        Some((outcome, elapsed)) => {
                            leader.publish(outcome.clone()).await;
                            self.metrics
                                .record_duration(telemetry::DISPATCH_DURATION, elapsed);
                            break (outcome, ResultSource::Dispatched);
                        }
                        None => {
                            drop(leader);
                            self.metrics.record_count(telemetry::STEP_SKIPPED);
                            return finish(StepOutcome::Skipped);
                        }
                    }
                }
            }
        };

        match source {
            ResultSource::Cache => self.metrics.record_count(telemetry::CACHE_HIT),
            ResultSource::Shared => {
                self.metrics.record_count(telemetry::CACHE_MISS);
                self.metrics.record_count(telemetry::SHARED_RESULT);
            }
            ResultSource::Dispatched => self.metrics.record_count(telemetry::CACHE_MISS),
        }

        match outcome {
            Ok(value) => {
                self.metrics.record_count(telemetry::STEP_SUCCESS);
                debug!(step = index, tool = %step.tool_name(), ?source, "step completed");
                finish(StepOutcome::Completed { value, source })
            }
            Err(error) => {
                if matches!(error, StepError::Timeout { .. }) {
                    self.metrics.record_count(telemetry::STEP_TIMEOUT);
                }
                self.metrics.record_count(telemetry::STEP_FAILURE);
                debug!(step = index, tool = %step.tool_name(), error = %error, "step failed");
                finish(StepOutcome::Failed(error))
            }
        }
    }

    /// Invoke the tool for a leader, returning the outcome and its wall time
    ///
    /// `None` if the run halted before a worker was free.
    async fn dispatch(
        &self,
        index: usize,
        step: &Step,
        user: &User,
        run_id: Uuid,
        halt: &CancellationToken,
    ) -> Option<(Result<Value, StepError>, Duration)> {
        let Some(resolved) = self.registry.resolve(step.tool_name()) else {
            return Some((
                Err(StepError::ToolFailed {
                    tool: step.tool_name().to_string(),
                    source: ToolError::Failed("tool is no longer registered".to_string()),
                }),
                Duration::ZERO,
            ));
        };

        let _permit = tokio::select! {
            biased;
            _ = halt.cancelled() => return None,
            permit = self.workers.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => {
                    return Some((
                        Err(StepError::ToolFailed {
                            tool: step.tool_name().to_string(),
                            source: ToolError::Failed("worker pool closed".to_string()),
                        }),
                        Duration::ZERO,
                    ))
                }
            },
        };

        let invocation = InvocationContext {
            run_id,
            user: user.clone(),
            step_index: index,
        };
        let tool = &resolved.tool;
        let parameters = step.parameters();
        let context = &invocation;
        let name = step.tool_name();
        let step_timeout = self.config.step_timeout;

        let dispatched = Instant::now();
        let outcome = self
            .config
            .retry
            .execute_with_retry(resolved.definition.retry_safe, move || async move {
                match tokio::time::timeout(step_timeout, tool.invoke(parameters, context)).await {
                    Ok(Ok(value)) => Ok(value),
                    Ok(Err(source)) => Err(StepError::ToolFailed {
                        tool: name.to_string(),
                        source,
                    }),
                    Err(_) => Err(StepError::Timeout {
                        tool: name.to_string(),
                        after_ms: step_timeout.as_millis() as u64,
                    }),
                }
            })
            .await;

        Some((outcome, dispatched.elapsed()))
    }
}
