//! Shared helpers for integration tests
//!
//! `ProbeTool`s report into a shared `Probe` that tracks how many
//! invocations are running at once and whether anything overlapped a
//! barrier tool.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use sparkmcp::config::Config;
use sparkmcp::orchestrator::Orchestrator;
use sparkmcp::tools::{InvocationContext, ParamKind, Tool, ToolDefinition, ToolRegistry};
use sparkmcp::ToolError;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Default)]
pub struct Probe {
    active: AtomicUsize,
    max_active: AtomicUsize,
    barrier_active: AtomicBool,
    violations: AtomicUsize,
    log: Mutex<Vec<String>>,
}

impl Probe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    /// Times a barrier tool overlapped another invocation
    pub fn violations(&self) -> usize {
        self.violations.load(Ordering::SeqCst)
    }

    /// "start:<tool>" / "end:<tool>" events in order
    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn push(&self, event: String) {
        self.log.lock().unwrap().push(event);
    }
}

/// Tool that sleeps, records concurrency and echoes its input
pub struct ProbeTool {
    name: String,
    probe: Arc<Probe>,
    delay: Duration,
    barrier: bool,
    fail: bool,
    invocations: AtomicUsize,
}

impl ProbeTool {
    pub fn new(name: &str, probe: &Arc<Probe>, delay_ms: u64) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            probe: probe.clone(),
            delay: Duration::from_millis(delay_ms),
            barrier: false,
            fail: false,
            invocations: AtomicUsize::new(0),
        })
    }

    pub fn barrier(name: &str, probe: &Arc<Probe>, delay_ms: u64) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            probe: probe.clone(),
            delay: Duration::from_millis(delay_ms),
            barrier: true,
            fail: false,
            invocations: AtomicUsize::new(0),
        })
    }

    pub fn failing(name: &str, probe: &Arc<Probe>, delay_ms: u64) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            probe: probe.clone(),
            delay: Duration::from_millis(delay_ms),
            barrier: false,
            fail: true,
            invocations: AtomicUsize::new(0),
        })
    }

    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }

    /// Definition accepting optional `x` and `ms` (delay override)
    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(self.name.clone(), "test probe")
            .optional_param("x", ParamKind::Any)
            .optional_param("ms", ParamKind::Integer)
            .parallel_safe(!self.barrier)
    }
}

#[async_trait]
impl Tool for ProbeTool {
    async fn invoke(
        &self,
        parameters: &Map<String, Value>,
        _context: &InvocationContext,
    ) -> Result<Value, ToolError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        let probe = &self.probe;

        let now = probe.active.fetch_add(1, Ordering::SeqCst) + 1;
        probe.max_active.fetch_max(now, Ordering::SeqCst);
        if self.barrier {
            if now > 1 {
                probe.violations.fetch_add(1, Ordering::SeqCst);
            }
            probe.barrier_active.store(true, Ordering::SeqCst);
        } else if probe.barrier_active.load(Ordering::SeqCst) {
            probe.violations.fetch_add(1, Ordering::SeqCst);
        }
        probe.push(format!("start:{}", self.name));

        let delay = parameters
            .get("ms")
            .and_then(Value::as_u64)
            .map(Duration::from_millis)
            .unwrap_or(self.delay);
        tokio::time::sleep(delay).await;

        if self.barrier {
            if probe.active.load(Ordering::SeqCst) > 1 {
                probe.violations.fetch_add(1, Ordering::SeqCst);
            }
            probe.barrier_active.store(false, Ordering::SeqCst);
        } else if probe.barrier_active.load(Ordering::SeqCst) {
            probe.violations.fetch_add(1, Ordering::SeqCst);
        }
        probe.push(format!("end:{}", self.name));
        probe.active.fetch_sub(1, Ordering::SeqCst);

        if self.fail {
            Err(ToolError::Failed(format!("{} failed", self.name)))
        } else {
            Ok(json!({ "tool": self.name, "params": parameters }))
        }
    }
}

/// Registry holding the built-ins plus the given probe tools
pub fn registry(tools: &[Arc<ProbeTool>]) -> Arc<ToolRegistry> {
    let registry = ToolRegistry::with_builtins().unwrap();
    for tool in tools {
        registry.register(tool.definition(), tool.clone()).unwrap();
    }
    Arc::new(registry)
}

pub fn orchestrator(tools: &[Arc<ProbeTool>], config: &Config) -> Arc<Orchestrator> {
    Arc::new(Orchestrator::from_config(config, registry(tools)))
}

pub fn params(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
}
