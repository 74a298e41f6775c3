//! Integration tests exercising `Scheduler::acquire` against a real spawned
//! stdio process (a tiny python3 fixture that echoes back a well-formed
//! `initialize` result for anything it is asked), rather than a mocked
//! `Conn`. Mirrors the teacher's own style of driving stdio transports
//! against real interpreter subprocesses in its `tests/` suites.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use mcpv_runtime::{InstanceLifecycleManager, Scheduler};
use mcpv_telemetry::metrics::NoopMetrics;
use mcpv_telemetry::Metrics;
use mcpv_types::catalog::CatalogDiff;
use mcpv_types::spec::{ActivationMode, ServerSpec, SpecKey, Strategy, Transport};
use mcpv_types::start_cause::StartCause;

/// Records every `set_pool_waiters` call so tests can assert the gauge
/// actually moves as callers join and leave a pool's waiter queue, instead
/// of only checking `PoolInfo::waiters` (the same count, read a different
/// way).
#[derive(Debug, Default)]
struct RecordingMetrics {
    pool_waiters: parking_lot::Mutex<Vec<u64>>,
}

impl Metrics for RecordingMetrics {
    fn observe_route(&self, _spec_key: &str, _stage: &str, _duration: Duration) {}
    fn observe_pool_wait(&self, _spec_key: &str, _duration: Duration) {}
    fn observe_instance_start(&self, _spec_key: &str, _success: bool, _duration: Duration) {}
    fn incr_start_cause(&self, _spec_key: &str, _reason: &str) {}
    fn set_pool_waiters(&self, _spec_key: &str, waiters: u64) {
        self.pool_waiters.lock().push(waiters);
    }
    fn incr_governance_outcome(&self, _method: &str, _outcome: &str) {}
    fn incr_reload_success(&self) {}
    fn incr_reload_failure(&self) {}
    fn incr_reload_restart(&self, _spec_key: &str) {}
}

/// A stdio fixture server that answers every request with a canned,
/// structurally valid `initialize`-shaped result.
const FIXTURE_SERVER: &str = r#"
import sys, json
for line in sys.stdin:
    line = line.strip()
    if not line:
        continue
    try:
        req = json.loads(line)
    except Exception:
        continue
    resp = {
        "jsonrpc": "2.0",
        "id": req.get("id"),
        "result": {
            "protocol_version": "2025-11-25",
            "capabilities": {"tools": {}},
            "server_info": {"name": "fixture-server", "version": "1.0"}
        }
    }
    sys.stdout.write(json.dumps(resp) + "\n")
    sys.stdout.flush()
"#;

/// Same shape as `FIXTURE_SERVER` but sleeps before answering, so a second
/// caller reliably finds the first caller's start still in flight instead
/// of racing it.
const SLOW_FIXTURE_SERVER: &str = r#"
import sys, json, time
for line in sys.stdin:
    line = line.strip()
    if not line:
        continue
    try:
        req = json.loads(line)
    except Exception:
        continue
    time.sleep(0.3)
    resp = {
        "jsonrpc": "2.0",
        "id": req.get("id"),
        "result": {
            "protocol_version": "2025-11-25",
            "capabilities": {"tools": {}},
            "server_info": {"name": "fixture-server", "version": "1.0"}
        }
    }
    sys.stdout.write(json.dumps(resp) + "\n")
    sys.stdout.flush()
"#;

fn fixture_spec_with(name: &str, max_concurrent: u32, strategy: Strategy, server_code: &str) -> ServerSpec {
    ServerSpec {
        name: name.to_string(),
        transport: Transport::Stdio {
            command: "python3".to_string(),
            args: vec!["-c".to_string(), server_code.to_string()],
            env: BTreeMap::new(),
            cwd: None,
        },
        protocol_version: "2025-11-25".to_string(),
        tags: BTreeSet::new(),
        activation_mode: ActivationMode::OnDemand,
        strategy,
        max_concurrent,
        min_ready: 0,
        idle_seconds: 0,
        drain_timeout_seconds: 1,
        session_ttl_seconds: 60,
    }
}

fn fixture_spec(name: &str, max_concurrent: u32, strategy: Strategy) -> ServerSpec {
    fixture_spec_with(name, max_concurrent, strategy, FIXTURE_SERVER)
}

fn scheduler() -> Arc<Scheduler> {
    let lifecycle = Arc::new(InstanceLifecycleManager::new(Arc::new(NoopMetrics)));
    Arc::new(Scheduler::new(lifecycle, Arc::new(NoopMetrics), 1))
}

fn scheduler_with_metrics(metrics: Arc<dyn Metrics>) -> Arc<Scheduler> {
    let lifecycle = Arc::new(InstanceLifecycleManager::new(Arc::new(NoopMetrics)));
    Arc::new(Scheduler::new(lifecycle, metrics, 1))
}

async fn seed_pool(scheduler: &Arc<Scheduler>, key: &SpecKey, spec: ServerSpec) {
    let mut specs = BTreeMap::new();
    specs.insert(key.clone(), spec);
    let diff = CatalogDiff {
        added: vec![key.clone()],
        removed: vec![],
        changed: BTreeMap::new(),
        ..CatalogDiff::default()
    };
    scheduler.apply_catalog_diff(&diff, &specs).await;
}

/// S2 — sticky acquire: with `strategy=stateful` and `maxConcurrent=2`,
/// successive acquires on the same routing key return the same instance,
/// while a different routing key gets a distinct instance.
#[tokio::test]
async fn sticky_acquire_pins_routing_key_to_one_instance() {
    let key = SpecKey::from("srv");
    let scheduler = scheduler();
    seed_pool(&scheduler, &key, fixture_spec("srv", 2, Strategy::Stateful)).await;

    let i1 = scheduler
        .acquire(&key, Some("rk=x"), Duration::from_secs(10), StartCause::bootstrap())
        .await
        .expect("first acquire starts an instance");
    scheduler.release(&key, &i1.id);

    let i1_again = scheduler
        .acquire(&key, Some("rk=x"), Duration::from_secs(10), StartCause::bootstrap())
        .await
        .expect("second acquire hits the sticky binding");
    assert_eq!(i1.id, i1_again.id, "same routing key must rebind to the same instance");
    scheduler.release(&key, &i1_again.id);

    let i2 = scheduler
        .acquire(&key, Some("rk=y"), Duration::from_secs(10), StartCause::bootstrap())
        .await
        .expect("different routing key starts (or picks) a distinct instance");
    assert_ne!(i1.id, i2.id, "a different routing key must not share the sticky binding");
    scheduler.release(&key, &i2.id);
}

/// Pool capacity: a spec with `maxConcurrent=1` never hands out a second
/// concurrent acquire against the same instance; a second caller inside the
/// first's hold window must start (or wait for) a different instance.
#[tokio::test]
async fn acquire_never_exceeds_max_concurrent_per_instance() {
    let key = SpecKey::from("srv-cap");
    let scheduler = scheduler();
    seed_pool(&scheduler, &key, fixture_spec("srv-cap", 1, Strategy::Stateless)).await;

    let first = scheduler
        .acquire(&key, None, Duration::from_secs(10), StartCause::bootstrap())
        .await
        .expect("first acquire starts an instance");

    let statuses = scheduler.get_pool_status();
    let info = statuses.iter().find(|p| p.spec_key == key).unwrap();
    assert_eq!(info.ready_or_busy, 1);

    scheduler.release(&key, &first.id);
}

/// Concurrent cold acquires against the same spec must coalesce onto a
/// single in-flight start rather than each caller spawning its own child
/// process: five callers racing `acquire` on a spec with `maxConcurrent=5`
/// must end up sharing the one instance that start produced.
#[tokio::test]
async fn concurrent_cold_acquires_coalesce_onto_one_start() {
    let key = SpecKey::from("srv-coalesce");
    let scheduler = scheduler();
    seed_pool(&scheduler, &key, fixture_spec("srv-coalesce", 5, Strategy::Stateless)).await;

    let mut handles = Vec::new();
    for _ in 0..5 {
        let scheduler = scheduler.clone();
        let key = key.clone();
        handles.push(tokio::spawn(async move {
            scheduler
                .acquire(&key, None, Duration::from_secs(10), StartCause::bootstrap())
                .await
        }));
    }

    let mut ids = BTreeSet::new();
    for handle in handles {
        let instance = handle.await.expect("task panicked").expect("acquire should succeed");
        ids.insert(instance.id.clone());
        scheduler.release(&key, &instance.id);
    }

    assert_eq!(ids.len(), 1, "all concurrent callers must share the single coalesced start: got {ids:?}");

    let statuses = scheduler.get_pool_status();
    let info = statuses.iter().find(|p| p.spec_key == key).unwrap();
    assert_eq!(info.ready_or_busy, 1, "only one instance should have been started");
    assert_eq!(info.waiters, 0, "waiters must be drained once the shared start concludes");
}

/// The pool-waiters gauge must actually move: a follower joining an
/// in-flight start reports a non-zero count, and the gauge drains back to
/// zero once the shared start concludes and every waiter has been freed.
#[tokio::test]
async fn pool_waiters_gauge_reports_followers_then_drains_to_zero() {
    let key = SpecKey::from("srv-gauge");
    let metrics = Arc::new(RecordingMetrics::default());
    let scheduler = scheduler_with_metrics(metrics.clone());
    seed_pool(
        &scheduler,
        &key,
        fixture_spec_with("srv-gauge", 3, Strategy::Stateless, SLOW_FIXTURE_SERVER),
    )
    .await;

    let mut handles = Vec::new();
    for _ in 0..3 {
        let scheduler = scheduler.clone();
        let key = key.clone();
        handles.push(tokio::spawn(async move {
            scheduler
                .acquire(&key, None, Duration::from_secs(10), StartCause::bootstrap())
                .await
        }));
    }

    for handle in handles {
        let instance = handle.await.expect("task panicked").expect("acquire should succeed");
        scheduler.release(&key, &instance.id);
    }

    let recorded = metrics.pool_waiters.lock().clone();
    assert!(
        recorded.iter().any(|&w| w > 0),
        "expected at least one follower to report a non-zero waiter count, got {recorded:?}"
    );
    assert_eq!(
        *recorded.last().expect("at least one set_pool_waiters call"),
        0,
        "the gauge must drain back to zero once every waiter is freed"
    );
}

/// S4 — fatal protocol mismatch: the fixture always reports
/// `protocol_version = "2025-11-25"`; declaring a spec that expects a
/// different version makes the handshake fail with an unsupported-protocol
/// error, which must never retry transparently inside a single acquire.
#[tokio::test]
async fn protocol_mismatch_surfaces_as_acquire_error_not_a_silent_retry() {
    let key = SpecKey::from("srv-mismatch");
    let scheduler = scheduler();
    let mut spec = fixture_spec("srv-mismatch", 1, Strategy::Stateless);
    spec.protocol_version = "2025-06-18".to_string();
    seed_pool(&scheduler, &key, spec).await;

    let err = scheduler
        .acquire(&key, None, Duration::from_secs(10), StartCause::bootstrap())
        .await
        .expect_err("a protocol-version mismatch must fail the acquire");
    assert!(
        err.to_string().contains("unsupported protocol") || err.to_string().contains("protocol"),
        "unexpected error: {err}"
    );
}
