//! Concurrency tests
//!
//! Single-flight deduplication, worker bounds, barrier exclusivity and
//! cancellation under concurrent load.

mod common;

use async_trait::async_trait;
use common::{orchestrator, Probe, ProbeTool};
use futures_util::future::join_all;
use serde_json::json;
use sparkmcp::cache::{CacheEntry, CacheStore, Fingerprint, MemoryStore, ResultCache};
use sparkmcp::config::Config;
use sparkmcp::errors::CacheError;
use sparkmcp::execution::{CoordinatorConfig, ResultSource, StepOutcome};
use sparkmcp::security::AuthorizationGate;
use sparkmcp::telemetry;
use sparkmcp::{ExecutionError, Orchestrator, OrchestratorError, Role, StepError, User};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn user() -> User {
    User::new("alice", Role::User)
}

/// Store that is never reachable
struct DownStore;

#[async_trait]
impl CacheStore for DownStore {
    async fn get(&self, _fingerprint: &Fingerprint) -> Result<Option<CacheEntry>, CacheError> {
        Err(CacheError::Unavailable("connection refused".to_string()))
    }

    async fn set(&self, _entry: CacheEntry) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("connection refused".to_string()))
    }

    async fn remove(&self, _fingerprint: &Fingerprint) -> Result<bool, CacheError> {
        Err(CacheError::Unavailable("connection refused".to_string()))
    }

    async fn sweep_expired(&self) -> Result<usize, CacheError> {
        Err(CacheError::Unavailable("connection refused".to_string()))
    }
}

fn orchestrator_with_cache(tools: &[Arc<ProbeTool>], cache: ResultCache) -> Orchestrator {
    Orchestrator::new(
        common::registry(tools),
        AuthorizationGate::default(),
        Arc::new(cache),
        CoordinatorConfig::default(),
    )
}

#[tokio::test]
async fn test_concurrent_identical_requests_invoke_once() {
    let probe = Probe::new();
    let tool = ProbeTool::new("slow_tool", &probe, 100);
    let orchestrator = orchestrator(&[tool.clone()], &Config::default());
    let request = json!({"tool": "slow_tool", "parameters": {"x": 5}});

    let user = user();
    let outputs = join_all((0..5).map(|_| orchestrator.plan_and_execute(request.clone(), &user))).await;

    assert_eq!(tool.invocations(), 1);
    let values: Vec<_> = outputs
        .into_iter()
        .map(|output| output.unwrap().results[0].clone())
        .collect();
    assert!(values.iter().all(|value| value == &values[0]));
    assert_eq!(values[0]["params"]["x"], json!(5));

    let snapshot = orchestrator.telemetry().snapshot();
    assert_eq!(snapshot.count(telemetry::CACHE_MISS), 5);
    assert_eq!(snapshot.count(telemetry::SHARED_RESULT), 4);
    assert_eq!(orchestrator.cache().in_flight_count(), 0);
}

#[tokio::test]
async fn test_duplicate_call_within_plan_shares_result() {
    let probe = Probe::new();
    let tool = ProbeTool::new("lookup", &probe, 50);
    let orchestrator = orchestrator(&[tool.clone()], &Config::default());

    let output = orchestrator
        .plan_and_execute(
            json!({"calls": [
                {"tool": "lookup", "parameters": {"x": 1}},
                {"tool": "lookup", "parameters": {"x": 1}}
            ]}),
            &user(),
        )
        .await
        .unwrap();

    assert_eq!(tool.invocations(), 1);
    assert_eq!(output.results[0], output.results[1]);
    let mut sources: Vec<_> = output.steps.iter().filter_map(|s| s.source()).collect();
    sources.sort_by_key(|source| format!("{:?}", source));
    assert_eq!(sources, vec![ResultSource::Dispatched, ResultSource::Shared]);
}

#[tokio::test]
async fn test_failure_is_shared_but_not_cached() {
    let probe = Probe::new();
    let tool = ProbeTool::failing("flaky", &probe, 100);
    let orchestrator = orchestrator(&[tool.clone()], &Config::default());
    let request = json!({"tool": "flaky"});

    let user = user();
    let outputs = join_all((0..3).map(|_| orchestrator.plan_and_execute(request.clone(), &user))).await;

    assert_eq!(tool.invocations(), 1);
    for output in outputs {
        let err = output.unwrap_err();
        let OrchestratorError::Execution(ExecutionError::Aborted { failure, .. }) = err else {
            panic!("expected abort");
        };
        assert!(matches!(failure.error, StepError::ToolFailed { .. }));
    }

    let _ = orchestrator.plan_and_execute(request, &user).await;
    assert_eq!(tool.invocations(), 2);
}

#[tokio::test]
async fn test_worker_limit_bounds_concurrency() {
    let probe = Probe::new();
    let tool = ProbeTool::new("work", &probe, 50);
    let mut config = Config::default();
    config.execution.worker_limit = 2;
    let orchestrator = orchestrator(&[tool.clone()], &config);

    let calls: Vec<_> = (0..6)
        .map(|x| json!({"tool": "work", "parameters": {"x": x}}))
        .collect();
    let output = orchestrator
        .plan_and_execute(json!({ "calls": calls }), &user())
        .await
        .unwrap();

    assert_eq!(output.results.len(), 6);
    assert_eq!(tool.invocations(), 6);
    assert!(probe.max_active() <= 2, "max active was {}", probe.max_active());
    assert_eq!(probe.max_active(), 2);
}

#[tokio::test]
async fn test_results_follow_plan_order_not_completion_order() {
    let probe = Probe::new();
    let tool = ProbeTool::new("work", &probe, 0);
    let orchestrator = orchestrator(&[tool], &Config::default());

    let delays = [80, 10, 40, 0];
    let calls: Vec<_> = delays
        .iter()
        .enumerate()
        .map(|(x, ms)| json!({"tool": "work", "parameters": {"x": x, "ms": ms}}))
        .collect();

    let output = orchestrator
        .plan_and_execute(json!({ "calls": calls }), &user())
        .await
        .unwrap();

    for (index, value) in output.results.iter().enumerate() {
        assert_eq!(value["params"]["x"], json!(index));
        assert_eq!(output.steps[index].index, index);
    }
    assert_eq!(probe.log().first().map(String::as_str), Some("start:work"));
}

#[tokio::test]
async fn test_barriers_never_overlap_other_steps() {
    let probe = Probe::new();
    let a = ProbeTool::new("a", &probe, 30);
    let b = ProbeTool::new("b", &probe, 30);
    let first = ProbeTool::barrier("migrate", &probe, 30);
    let second = ProbeTool::barrier("rotate", &probe, 30);
    let orchestrator = orchestrator(&[a, b, first, second], &Config::default());

    let output = orchestrator
        .plan_and_execute(
            json!({"calls": [
                {"tool": "a", "parameters": {"x": 1}},
                {"tool": "b", "parameters": {"x": 1}},
                {"tool": "migrate"},
                {"tool": "a", "parameters": {"x": 2}},
                {"tool": "b", "parameters": {"x": 2}},
                {"tool": "rotate"},
                {"tool": "a", "parameters": {"x": 3}}
            ]}),
            &user(),
        )
        .await
        .unwrap();

    assert_eq!(output.results.len(), 7);
    assert_eq!(probe.violations(), 0);
    assert!(probe.max_active() >= 2);

    let log = probe.log();
    let position = |event: &str| log.iter().position(|e| e == event).unwrap();
    assert_eq!(position("end:migrate"), position("start:migrate") + 1);
    assert_eq!(position("end:rotate"), position("start:rotate") + 1);
}

#[tokio::test]
async fn test_fail_fast_keeps_partial_results() {
    let probe = Probe::new();
    let a = ProbeTool::new("a", &probe, 10);
    let boom = ProbeTool::failing("boom", &probe, 20);
    let seal = ProbeTool::barrier("seal", &probe, 0);
    let c = ProbeTool::new("c", &probe, 0);
    let orchestrator = orchestrator(&[a, boom, seal.clone(), c.clone()], &Config::default());

    let err = orchestrator
        .plan_and_execute(
            json!({"calls": [{"tool": "a"}, {"tool": "boom"}, {"tool": "seal"}, {"tool": "c"}]}),
            &user(),
        )
        .await
        .unwrap_err();

    let OrchestratorError::Execution(ExecutionError::Aborted { failure, results }) = err else {
        panic!("expected fail-fast abort");
    };
    assert_eq!(failure.index, 1);
    assert!(results[0].is_success());
    assert!(results[1].is_failure());
    assert!(matches!(results[2].outcome, StepOutcome::Skipped));
    assert!(matches!(results[3].outcome, StepOutcome::Skipped));
    assert_eq!(seal.invocations() + c.invocations(), 0);
}

#[tokio::test]
async fn test_cancellation_stops_later_segments() {
    let probe = Probe::new();
    let a = ProbeTool::new("a", &probe, 10);
    let hold = ProbeTool::barrier("hold", &probe, 200);
    let b = ProbeTool::new("b", &probe, 0);
    let orchestrator = orchestrator(&[a, hold, b.clone()], &Config::default());

    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        canceller.cancel();
    });

    let err = orchestrator
        .plan_and_execute_with_cancellation(
            json!({"calls": [{"tool": "a"}, {"tool": "hold"}, {"tool": "b"}]}),
            &user(),
            token,
        )
        .await
        .unwrap_err();

    let OrchestratorError::Execution(ExecutionError::Cancelled { results }) = err else {
        panic!("expected cancellation");
    };
    assert!(results[0].is_success());
    assert!(results[1].is_success());
    assert!(matches!(results[2].outcome, StepOutcome::Skipped));
    assert_eq!(b.invocations(), 0);
}

#[tokio::test]
async fn test_unavailable_store_still_deduplicates_in_flight() {
    let probe = Probe::new();
    let tool = ProbeTool::new("lookup", &probe, 80);
    let orchestrator = orchestrator_with_cache(
        &[tool.clone()],
        ResultCache::new(Arc::new(DownStore), Duration::from_secs(60)),
    );
    let request = json!({"tool": "lookup", "parameters": {"x": 1}});
    let user = user();

    orchestrator.plan_and_execute(request.clone(), &user).await.unwrap();
    orchestrator.plan_and_execute(request.clone(), &user).await.unwrap();
    assert_eq!(tool.invocations(), 2);

    let outputs = join_all((0..4).map(|_| orchestrator.plan_and_execute(request.clone(), &user))).await;
    assert!(outputs.iter().all(|output| output.is_ok()));
    assert_eq!(tool.invocations(), 3);
}

#[tokio::test]
async fn test_expired_entry_is_recomputed() {
    let probe = Probe::new();
    let tool = ProbeTool::new("lookup", &probe, 0);
    let orchestrator = orchestrator_with_cache(
        &[tool.clone()],
        ResultCache::new(Arc::new(MemoryStore::new()), Duration::from_millis(100)),
    );
    let request = json!({"tool": "lookup", "parameters": {"x": 1}});

    orchestrator.plan_and_execute(request.clone(), &user()).await.unwrap();
    let cached = orchestrator.plan_and_execute(request.clone(), &user()).await.unwrap();
    assert_eq!(cached.steps[0].source(), Some(ResultSource::Cache));
    assert_eq!(tool.invocations(), 1);

    tokio::time::sleep(Duration::from_millis(200)).await;
    let fresh = orchestrator.plan_and_execute(request, &user()).await.unwrap();
    assert_eq!(fresh.steps[0].source(), Some(ResultSource::Dispatched));
    assert_eq!(tool.invocations(), 2);
}
