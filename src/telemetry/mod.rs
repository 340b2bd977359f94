//! Telemetry for the execution coordinator
//!
//! The coordinator only ever writes to a `MetricsSink`. Sinks are
//! fire-and-forget: recording cannot fail a step. The coordinator wraps
//! whatever sink it is given in an `IsolatedSink`, so even a panicking
//! sink only costs the observation.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::warn;

/// Step answered from a live cache entry
pub const CACHE_HIT: &str = "step.cache_hit";
/// Step found no live cache entry
pub const CACHE_MISS: &str = "step.cache_miss";
/// Step received the result of another caller's in-flight execution
pub const SHARED_RESULT: &str = "step.shared_result";
pub const STEP_SUCCESS: &str = "step.success";
pub const STEP_FAILURE: &str = "step.failure";
pub const PERMISSION_DENIED: &str = "step.permission_denied";
pub const STEP_TIMEOUT: &str = "step.timeout";
pub const STEP_SKIPPED: &str = "step.skipped";
/// Wall time of a dispatched (non-cached) step
pub const DISPATCH_DURATION: &str = "step.dispatch_duration";

/// Write-only metrics interface
pub trait MetricsSink: Send + Sync {
    fn record_count(&self, name: &str);

    fn record_duration(&self, name: &str, elapsed: Duration);
}

/// Sink that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl MetricsSink for NoopSink {
    fn record_count(&self, _name: &str) {}

    fn record_duration(&self, _name: &str, _elapsed: Duration) {}
}

/// Sink wrapper that contains panics raised by the inner sink
pub struct IsolatedSink {
    inner: Arc<dyn MetricsSink>,
}

impl IsolatedSink {
    pub fn new(inner: Arc<dyn MetricsSink>) -> Self {
        Self { inner }
    }

    fn guarded(&self, name: &str, record: impl FnOnce(&dyn MetricsSink)) {
        if catch_unwind(AssertUnwindSafe(|| record(self.inner.as_ref()))).is_err() {
            warn!(metric = name, "metrics sink panicked, observation dropped");
        }
    }
}

impl MetricsSink for IsolatedSink {
    fn record_count(&self, name: &str) {
        self.guarded(name, |sink| sink.record_count(name));
    }

    fn record_duration(&self, name: &str, elapsed: Duration) {
        self.guarded(name, |sink| sink.record_duration(name, elapsed));
    }
}

/// Summary of one duration series
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DurationSummary {
    pub count: u64,
    pub total: Duration,
    pub max: Duration,
}

impl DurationSummary {
    fn observe(&mut self, elapsed: Duration) {
        self.count += 1;
        self.total = self.total.saturating_add(elapsed);
        self.max = self.max.max(elapsed);
    }

    /// Mean observation, zero when empty
    pub fn mean(&self) -> Duration {
        if self.count == 0 {
            Duration::ZERO
        } else {
            let nanos = self.total.as_nanos() / u128::from(self.count);
            Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
        }
    }
}

/// Point-in-time copy of collected metrics
#[derive(Debug, Clone, Default)]
pub struct TelemetrySnapshot {
    pub counters: HashMap<String, u64>,
    pub durations: HashMap<String, DurationSummary>,
    pub elapsed: Duration,
}

impl TelemetrySnapshot {
    /// Counter value, zero if never recorded
    pub fn count(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }

    pub fn duration(&self, name: &str) -> Option<&DurationSummary> {
        self.durations.get(name)
    }

    /// Fraction of finished steps that succeeded
    pub fn success_rate(&self) -> f64 {
        let succeeded = self.count(STEP_SUCCESS);
        let total = succeeded + self.count(STEP_FAILURE);
        if total == 0 {
            1.0
        } else {
            succeeded as f64 / total as f64
        }
    }

    /// Print a summary table to stdout
    pub fn display_summary(&self) {
        let mut names: Vec<&String> = self.counters.keys().collect();
        names.sort();

        println!("\nExecution Summary");
        println!("-------------------------------------");
        println!("Uptime:            {:?}", self.elapsed);
        for name in names {
            println!("{:<26} {}", name, self.counters[name]);
        }
        if let Some(dispatch) = self.duration(DISPATCH_DURATION) {
            println!(
                "{:<26} n={} mean={:?} max={:?}",
                DISPATCH_DURATION,
                dispatch.count,
                dispatch.mean(),
                dispatch.max
            );
        }
        println!("Success rate:      {:.1}%", self.success_rate() * 100.0);
        println!();
    }
}

#[derive(Debug, Default)]
struct TelemetryState {
    counters: HashMap<String, u64>,
    durations: HashMap<String, DurationSummary>,
}

/// In-process metrics collector
#[derive(Debug, Clone)]
pub struct TelemetryCollector {
    state: Arc<Mutex<TelemetryState>>,
    start_time: Arc<Mutex<Instant>>,
}

impl TelemetryCollector {
    /// Create a new telemetry collector
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(TelemetryState::default())),
            start_time: Arc::new(Mutex::new(Instant::now())),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, TelemetryState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            warn!("telemetry state poisoned, continuing with recovered data");
            PoisonError::into_inner(poisoned)
        })
    }

    /// Copy the current counters and duration summaries
    pub fn snapshot(&self) -> TelemetrySnapshot {
        let state = self.lock_state();
        TelemetrySnapshot {
            counters: state.counters.clone(),
            durations: state.durations.clone(),
            elapsed: self.elapsed(),
        }
    }

    /// Clear all metrics and restart the uptime clock
    pub fn reset(&self) {
        let mut state = self.lock_state();
        *state = TelemetryState::default();
        *self
            .start_time
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    /// Get elapsed time since start or last reset
    pub fn elapsed(&self) -> Duration {
        self.start_time
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed()
    }
}

impl Default for TelemetryCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSink for TelemetryCollector {
    fn record_count(&self, name: &str) {
        *self.lock_state().counters.entry(name.to_string()).or_insert(0) += 1;
    }

    fn record_duration(&self, name: &str, elapsed: Duration) {
        self.lock_state()
            .durations
            .entry(name.to_string())
            .or_default()
            .observe(elapsed);
    }
}
