//! Orchestrator facade
//!
//! Constructed once at process start and shared by reference, so that the
//! result cache and its single-flight state are shared by every request.

use crate::cache::{MemoryStore, ResultCache};
use crate::config::Config;
use crate::errors::{ExecutionError, OrchestratorError, Result};
use crate::execution::{
    CoordinatorConfig, ExecutionContext, ExecutionCoordinator, FailurePolicy, StepResult,
};
use crate::planning::{Plan, PlanBuilder, Request};
use crate::security::{AccessTarget, Action, AuthorizationGate, User};
use crate::telemetry::TelemetryCollector;
use crate::tools::{Tool, ToolDefinition, ToolHandle, ToolRegistry};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Successful plan run
#[derive(Debug, Clone)]
pub struct PlanOutput {
    /// One value per step, in plan order
    pub results: Vec<Value>,

    /// Detailed per-step results
    pub steps: Vec<StepResult>,
}

/// Single entry point for planning and executing requests
pub struct Orchestrator {
    registry: Arc<ToolRegistry>,
    builder: PlanBuilder,
    coordinator: ExecutionCoordinator,
    gate: AuthorizationGate,
    cache: Arc<ResultCache>,
    telemetry: TelemetryCollector,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<ToolRegistry>,
        gate: AuthorizationGate,
        cache: Arc<ResultCache>,
        config: CoordinatorConfig,
    ) -> Self {
        let telemetry = TelemetryCollector::new();
        let coordinator = ExecutionCoordinator::new(
            registry.clone(),
            gate.clone(),
            cache.clone(),
            Arc::new(telemetry.clone()),
            config,
        );

        Self {
            builder: PlanBuilder::new(registry.clone()),
            registry,
            coordinator,
            gate,
            cache,
            telemetry,
        }
    }

    /// Build an orchestrator with an in-process cache store
    pub fn from_config(config: &Config, registry: Arc<ToolRegistry>) -> Self {
        let cache = ResultCache::new(Arc::new(MemoryStore::new()), config.cache_ttl())
            .with_persistence(config.cache.enabled);

        Self::new(
            registry,
            AuthorizationGate::new(config.permission_table()),
            Arc::new(cache),
            config.coordinator_config(),
        )
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    pub fn telemetry(&self) -> &TelemetryCollector {
        &self.telemetry
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        self.coordinator.config().failure_policy
    }

    /// Start the background expiry sweep
    pub fn spawn_cache_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        self.cache.spawn_sweeper(interval)
    }

    /// Plan a request without executing it
    pub fn plan(&self, request: &Value) -> Result<Plan> {
        let request = Request::from_value(request)?;
        Ok(self.builder.build(&request)?)
    }

    /// Plan and run a request on behalf of `user`
    pub async fn plan_and_execute(&self, request: Value, user: &User) -> Result<PlanOutput> {
        self.plan_and_execute_with_cancellation(request, user, CancellationToken::new())
            .await
    }

    /// Same as `plan_and_execute`, stopping submission once `token` is cancelled
    pub async fn plan_and_execute_with_cancellation(
        &self,
        request: Value,
        user: &User,
        token: CancellationToken,
    ) -> Result<PlanOutput> {
        let plan = self.plan(&request)?;
        let mut ctx = ExecutionContext::new(user.clone()).with_cancellation(token);

        let steps = self.coordinator.run(&plan, &mut ctx).await?;

        let failed = steps.iter().filter(|step| step.is_failure()).count();
        if failed > 0 {
            return Err(ExecutionError::PartialFailure {
                failed,
                results: steps,
            }
            .into());
        }

        let results = steps
            .iter()
            .map(|step| step.value().cloned().unwrap_or(Value::Null))
            .collect();

        Ok(PlanOutput { results, steps })
    }

    /// Register a tool after checking the caller's register permission
    pub fn register_tool(
        &self,
        user: &User,
        definition: ToolDefinition,
        tool: Arc<dyn Tool>,
    ) -> Result<ToolHandle> {
        let target = AccessTarget::Tool(definition.name.clone());
        self.require(user, &target, Action::Register)?;

        let handle = self.registry.register(definition, tool)?;
        info!(user = %user.id, tool = %handle.name(), "tool registered");
        Ok(handle)
    }

    /// Remove a tool registered earlier; stale handles are ignored
    pub fn unregister_tool(&self, user: &User, handle: &ToolHandle) -> Result<bool> {
        let target = AccessTarget::Tool(handle.name().to_string());
        self.require(user, &target, Action::Register)?;
        Ok(self.registry.unregister(handle))
    }

    /// Read a registered resource after checking the caller's read permission
    pub async fn read_resource(&self, user: &User, id: &str) -> Result<Value> {
        self.require(user, &AccessTarget::Resource(id.to_string()), Action::Read)?;

        let provider = self
            .registry
            .get_resource(id)
            .ok_or_else(|| OrchestratorError::UnknownResource(id.to_string()))?;
        debug!(user = %user.id, resource = id, "reading resource");
        Ok(provider.read().await?)
    }

    fn require(&self, user: &User, target: &AccessTarget, action: Action) -> Result<()> {
        if self.gate.authorize(user, target, action) {
            Ok(())
        } else {
            Err(OrchestratorError::PermissionDenied {
                action,
                target: target.to_string(),
            })
        }
    }
}
