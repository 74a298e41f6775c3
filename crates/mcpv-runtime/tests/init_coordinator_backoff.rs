//! S3 — init backoff: a spec whose instances never come up (a stdio
//! command that exits immediately, so every handshake attempt fails
//! transiently) must walk `nextRetryAt` through the exponential schedule
//! and land on `Suspended` once the retry ceiling is hit, with `lastError`
//! naming the attempt count.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use mcpv_runtime::{InitCoordinator, InstanceLifecycleManager, Scheduler};
use mcpv_telemetry::metrics::NoopMetrics;
use mcpv_types::catalog::CatalogDiff;
use mcpv_types::spec::{ActivationMode, ServerSpec, SpecKey, Strategy, Transport};
use mcpv_types::status::InitState;
use mcpv_types::RuntimeConfig;

fn dead_on_arrival_spec() -> ServerSpec {
    ServerSpec {
        name: "dead-on-arrival".to_string(),
        transport: Transport::Stdio {
            // Exits immediately; every `initialize` round trip against it
            // fails transiently (broken pipe / closed connection), never
            // fatally.
            command: "python3".to_string(),
            args: vec!["-c".to_string(), "pass".to_string()],
            env: BTreeMap::new(),
            cwd: None,
        },
        protocol_version: "2025-11-25".to_string(),
        tags: BTreeSet::new(),
        activation_mode: ActivationMode::OnDemand,
        strategy: Strategy::Stateless,
        max_concurrent: 1,
        min_ready: 1,
        idle_seconds: 0,
        drain_timeout_seconds: 1,
        session_ttl_seconds: 0,
    }
}

#[tokio::test]
async fn retry_ceiling_suspends_with_attempt_count_in_last_error() {
    let key = SpecKey::from("doa");
    let lifecycle = Arc::new(InstanceLifecycleManager::new(Arc::new(NoopMetrics)));
    let scheduler = Arc::new(Scheduler::new(lifecycle, Arc::new(NoopMetrics), 0));
    let coordinator = Arc::new(InitCoordinator::new(scheduler.clone()));

    let mut specs = BTreeMap::new();
    specs.insert(key.clone(), dead_on_arrival_spec());
    let diff = CatalogDiff {
        added: vec![key.clone()],
        removed: vec![],
        changed: BTreeMap::new(),
        ..CatalogDiff::default()
    };
    scheduler.apply_catalog_diff(&diff, &specs).await;

    let runtime = RuntimeConfig {
        max_retries: 3,
        retry_base_seconds: 1,
        retry_max_seconds: 8,
        ..RuntimeConfig::default()
    };
    coordinator.apply_catalog_state(&specs, &runtime);

    // 3 failures with 1s + 2s backoff sleeps between them; give generous
    // headroom above the ~3s of real sleeping the worker does.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(20);
    loop {
        let statuses = coordinator.statuses();
        if let Some(status) = statuses.iter().find(|s| s.spec_key == key) {
            if status.state == InitState::Suspended {
                assert_eq!(status.retry_count, 3);
                assert!(
                    status.last_error.as_deref().unwrap_or_default().contains("retry limit reached (3)"),
                    "unexpected lastError: {:?}",
                    status.last_error
                );
                return;
            }
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("spec never reached Suspended within the test deadline: {statuses:?}");
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}
