//! The server-init coordinator: one worker per spec, driving `ready` toward
//! `minReady`.

use std::collections::BTreeMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::Utc;
use dashmap::DashMap;
use mcpv_protocol::FailureClass;
use mcpv_types::spec::{ServerSpec, SpecKey};
use mcpv_types::status::{AttemptRecord, InitState, ServerInitStatus};
use mcpv_types::RuntimeConfig;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::backoff::delay_for_attempt;
use crate::error::RuntimeError;
use crate::scheduler::Scheduler;

#[derive(Debug, Clone, Copy)]
struct RetryConfig {
    max_retries: u32,
    retry_base_seconds: u64,
    retry_max_seconds: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let defaults = RuntimeConfig::default();
        Self {
            max_retries: defaults.max_retries,
            retry_base_seconds: defaults.retry_base_seconds,
            retry_max_seconds: defaults.retry_max_seconds,
        }
    }
}

/// Owns one worker task per spec, reconciling `ready` toward the spec's
/// `minReady` target.
pub struct InitCoordinator {
    scheduler: Arc<Scheduler>,
    statuses: DashMap<SpecKey, ServerInitStatus>,
    targets: Arc<DashMap<SpecKey, u32>>,
    workers: DashMap<SpecKey, JoinHandle<()>>,
    retry_config: ArcSwap<RetryConfig>,
}

impl InitCoordinator {
    /// Construct a coordinator driving pools through `scheduler`.
    #[must_use]
    pub fn new(scheduler: Arc<Scheduler>) -> Self {
        Self {
            scheduler,
            statuses: DashMap::new(),
            targets: Arc::new(DashMap::new()),
            workers: DashMap::new(),
            retry_config: ArcSwap::from_pointee(RetryConfig::default()),
        }
    }

    /// Reconcile workers against a freshly applied catalog: ensure workers
    /// for added specs and specs whose target transitioned `0 -> positive`,
    /// tear down workers and status for removed specs.
    pub fn apply_catalog_state(self: &Arc<Self>, specs: &BTreeMap<SpecKey, ServerSpec>, runtime: &RuntimeConfig) {
        self.retry_config.store(Arc::new(RetryConfig {
            max_retries: runtime.max_retries,
            retry_base_seconds: runtime.retry_base_seconds,
            retry_max_seconds: runtime.retry_max_seconds,
        }));

        for (key, spec) in specs {
            let new_target = spec.effective_min_ready();
            let prev_target = self.targets.insert(key.clone(), new_target);
            let transitioned_up = prev_target.map(|t| t == 0).unwrap_or(true) && new_target > 0;
            if transitioned_up && !self.workers.contains_key(key) {
                self.ensure_worker(key.clone(), spec.name.clone());
            }
        }

        let known: Vec<SpecKey> = self.targets.iter().map(|e| e.key().clone()).collect();
        for key in known {
            if !specs.contains_key(&key) {
                self.targets.remove(&key);
                self.statuses.remove(&key);
                if let Some((_, handle)) = self.workers.remove(&key) {
                    handle.abort();
                }
            }
        }
    }

    fn ensure_worker(self: &Arc<Self>, spec_key: SpecKey, server_name: String) {
        let coordinator = self.clone();
        let worker_key = spec_key.clone();
        let handle = tokio::spawn(async move {
            coordinator.run_worker(spec_key, server_name).await;
        });
        self.workers.insert(worker_key, handle);
    }

    async fn run_worker(self: Arc<Self>, spec_key: SpecKey, server_name: String) {
        loop {
            let target = self.targets.get(&spec_key).map(|t| *t).unwrap_or(0);
            if target == 0 {
                self.write_status(&spec_key, &server_name, InitState::Pending, 0, 0, None, 0, None);
                self.workers.remove(&spec_key);
                return;
            }

            let mut attempt = AttemptRecord {
                started_at: Some(Utc::now()),
                step: Some("set_min_ready".to_string()),
                target,
                ..Default::default()
            };

            let set_result = self.scheduler.set_desired_min_ready(&spec_key, target).await;
            let err = set_result.err();

            attempt.step = Some("snapshot_done".to_string());
            let (ready, failed) = self.scheduler.pool_counts(&spec_key).unwrap_or((0, 0));
            attempt.ready = ready;
            attempt.failed = failed;
            attempt.error = err.as_ref().map(ToString::to_string);
            attempt.ended_at = Some(Utc::now());

            let state = classify(target, err.as_ref(), ready, failed);

            let prev_retry_count = self.statuses.get(&spec_key).map(|s| s.retry_count).unwrap_or(0);
            let prev_failed = self.statuses.get(&spec_key).map(|s| s.failed).unwrap_or(0);

            if state == InitState::Ready {
                self.write_status_full(&spec_key, &server_name, InitState::Ready, ready, failed, None, 0, None, attempt);
                self.workers.remove(&spec_key);
                return;
            }

            if let Some(e) = &err {
                if e.failure_class() == FailureClass::Fatal {
                    warn!(%spec_key, error = %e, "init coordinator suspended: fatal error");
                    self.write_status_full(
                        &spec_key,
                        &server_name,
                        InitState::Suspended,
                        ready,
                        failed,
                        Some(e.to_string()),
                        prev_retry_count,
                        None,
                        attempt,
                    );
                    self.workers.remove(&spec_key);
                    return;
                }
            }

            let increased = err.is_some() || failed > prev_failed;
            let retry_count = prev_retry_count + u32::from(increased);

            let cfg = *self.retry_config.load_full();
            if retry_count >= cfg.max_retries {
                warn!(%spec_key, retry_count, "init coordinator suspended: retry ceiling reached");
                let exhausted = RuntimeError::RetryExhausted { attempts: retry_count }.to_string();
                self.write_status_full(
                    &spec_key,
                    &server_name,
                    InitState::Suspended,
                    ready,
                    failed,
                    Some(exhausted),
                    retry_count,
                    None,
                    attempt,
                );
                self.workers.remove(&spec_key);
                return;
            }

            let delay = delay_for_attempt(
                std::time::Duration::from_secs(cfg.retry_base_seconds),
                std::time::Duration::from_secs(cfg.retry_max_seconds),
                retry_count,
            );
            let next_retry_at = Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default();
            info!(%spec_key, ?state, retry_count, delay_secs = delay.as_secs(), "init coordinator retrying");
            self.write_status_full(
                &spec_key,
                &server_name,
                state,
                ready,
                failed,
                attempt.error.clone(),
                retry_count,
                Some(next_retry_at),
                attempt,
            );

            tokio::time::sleep(delay).await;
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn write_status(
        &self,
        spec_key: &SpecKey,
        server_name: &str,
        state: InitState,
        ready: u32,
        failed: u32,
        last_error: Option<String>,
        retry_count: u32,
        next_retry_at: Option<chrono::DateTime<Utc>>,
    ) {
        self.write_status_full(
            spec_key,
            server_name,
            state,
            ready,
            failed,
            last_error,
            retry_count,
            next_retry_at,
            AttemptRecord::default(),
        );
    }

    #[allow(clippy::too_many_arguments)]
    fn write_status_full(
        &self,
        spec_key: &SpecKey,
        server_name: &str,
        state: InitState,
        ready: u32,
        failed: u32,
        last_error: Option<String>,
        retry_count: u32,
        next_retry_at: Option<chrono::DateTime<Utc>>,
        attempt: AttemptRecord,
    ) {
        let min_ready = self.targets.get(spec_key).map(|t| *t).unwrap_or(0);
        self.statuses.insert(
            spec_key.clone(),
            ServerInitStatus {
                spec_key: spec_key.clone(),
                server_name: server_name.to_string(),
                min_ready,
                ready,
                failed,
                state,
                retry_count,
                next_retry_at,
                last_error,
                attempt,
                updated_at: Utc::now(),
            },
        );
    }

    /// Reset a spec's status to `Pending` with `retryCount == 0` and
    /// re-ensure its worker.
    pub fn retry_spec(self: &Arc<Self>, spec_key: &SpecKey, server_name: &str) {
        if let Some((_, handle)) = self.workers.remove(spec_key) {
            handle.abort();
        }
        self.write_status(spec_key, server_name, InitState::Pending, 0, 0, None, 0, None);
        let target = self.targets.get(spec_key).map(|t| *t).unwrap_or(0);
        if target > 0 {
            self.ensure_worker(spec_key.clone(), server_name.to_string());
        }
    }

    /// Current status snapshots, with live pool counts overlaid onto the
    /// stored status to keep the returned snapshot fresh.
    #[must_use]
    pub fn statuses(&self) -> Vec<ServerInitStatus> {
        self.statuses
            .iter()
            .map(|entry| {
                let mut status = entry.value().clone();
                if let Some((ready, failed)) = self.scheduler.pool_counts(entry.key()) {
                    status.ready = ready;
                    status.failed = failed;
                }
                status
            })
            .collect()
    }
}

fn classify(target: u32, err: Option<&RuntimeError>, ready: u32, failed: u32) -> InitState {
    if target == 0 && err.is_none() && failed == 0 {
        return InitState::Ready;
    }
    if ready >= target {
        InitState::Ready
    } else if ready > 0 {
        InitState::Degraded
    } else if err.is_some() || failed > 0 {
        InitState::Failed
    } else {
        InitState::Starting
    }
}
