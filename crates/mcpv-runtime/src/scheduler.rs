//! The scheduler: per-spec pools, acquire/release, warming, draining.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use mcpv_protocol::AllowedMethods;
use mcpv_telemetry::Metrics;
use mcpv_types::catalog::CatalogDiff;
use mcpv_types::instance::Instance;
use mcpv_types::spec::{ServerSpec, SpecKey, Strategy};
use mcpv_types::start_cause::StartCause;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::error::{RuntimeError, RuntimeResult};
use crate::lifecycle::InstanceLifecycleManager;
use crate::pool::{Pick, PoolState, StartLead, StartOutcome};

/// Observability snapshot of one pool.
#[derive(Debug, Clone, Serialize)]
pub struct PoolInfo {
    /// The spec this pool serves.
    pub spec_key: SpecKey,
    /// Desired min-ready target.
    pub min_ready: u32,
    /// Instances currently `Ready`.
    pub ready: usize,
    /// Instances currently `Ready` or `Busy`.
    pub ready_or_busy: usize,
    /// Instances currently `Failed`.
    pub failed: usize,
    /// Start attempts currently in flight.
    pub starting: u32,
    /// Callers currently waiting on this pool.
    pub waiters: u32,
}

/// Concludes a pool's single in-flight start when dropped, broadcasting an
/// outcome to every caller that joined it as a waiter. If the leader's
/// future is dropped before calling [`StartGuard::conclude`] (the caller's
/// `acquire` was cancelled, or its deadline elapsed), `drop` broadcasts
/// [`RuntimeError::AcquireCancelled`] so waiters are freed rather than left
/// hanging — the RAII form of testable property #8.
struct StartGuard<'a> {
    pool: &'a Mutex<PoolState>,
    spec_key: SpecKey,
    outcome: Option<StartOutcome>,
}

impl StartGuard<'_> {
    fn conclude(mut self, outcome: StartOutcome) {
        self.outcome = Some(outcome);
    }
}

impl Drop for StartGuard<'_> {
    fn drop(&mut self) {
        let outcome = self
            .outcome
            .take()
            .unwrap_or_else(|| Err(RuntimeError::AcquireCancelled(self.spec_key.to_string())));
        self.pool.lock().conclude_start(outcome);
    }
}

/// Removes a caller from a pool's waiter count when dropped, whether it
/// resolved normally or was cancelled mid-wait.
struct WaiterGuard<'a> {
    pool: &'a Mutex<PoolState>,
    metrics: &'a Arc<dyn Metrics>,
    spec_key: &'a SpecKey,
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        let mut pool = self.pool.lock();
        pool.decr_waiters();
        self.metrics.set_pool_waiters(self.spec_key.as_str(), u64::from(pool.waiter_count()));
    }
}

/// Invoked once a freshly started instance has been registered in its pool,
/// so callers outside the scheduler (the router's capability cache, the
/// discovery indexes) can learn what a spec's most recent handshake
/// produced without the scheduler depending on either of them directly.
pub type ReadyHook = Arc<dyn Fn(SpecKey, AllowedMethods, Instance) + Send + Sync>;

/// Per-spec pools of MCP server instances.
pub struct Scheduler {
    specs: DashMap<SpecKey, ServerSpec>,
    pools: DashMap<SpecKey, Arc<Mutex<PoolState>>>,
    lifecycle: Arc<InstanceLifecycleManager>,
    metrics: Arc<dyn Metrics>,
    initialize_retry_count: u32,
    ready_hook: Mutex<Option<ReadyHook>>,
}

impl Scheduler {
    /// Construct an empty scheduler.
    #[must_use]
    pub fn new(
        lifecycle: Arc<InstanceLifecycleManager>,
        metrics: Arc<dyn Metrics>,
        initialize_retry_count: u32,
    ) -> Self {
        Self {
            specs: DashMap::new(),
            pools: DashMap::new(),
            ready_hook: Mutex::new(None),
            lifecycle,
            metrics,
            initialize_retry_count,
        }
    }

    /// Register the callback invoked after each successful instance start.
    /// Replaces any previously registered hook; intended to be set once at
    /// wiring time.
    pub fn set_ready_hook(&self, hook: ReadyHook) {
        *self.ready_hook.lock() = Some(hook);
    }

    fn pool_for(&self, spec_key: &SpecKey) -> RuntimeResult<Arc<Mutex<PoolState>>> {
        self.pools
            .get(spec_key)
            .map(|p| p.clone())
            .ok_or_else(|| RuntimeError::UnknownSpec(spec_key.to_string()))
    }

    fn spec_for(&self, spec_key: &SpecKey) -> RuntimeResult<ServerSpec> {
        self.specs
            .get(spec_key)
            .map(|s| s.clone())
            .ok_or_else(|| RuntimeError::UnknownSpec(spec_key.to_string()))
    }

    /// Acquire an instance, starting a new one if none is warm and the
    /// caller allows it.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::UnknownSpec`], [`RuntimeError::AcquireTimeout`],
    /// or the [`RuntimeError`] that made the last start attempt fail.
    pub async fn acquire(
        &self,
        spec_key: &SpecKey,
        routing_key: Option<&str>,
        deadline: Duration,
        cause: StartCause,
    ) -> RuntimeResult<Instance> {
        self.acquire_internal(spec_key, routing_key, true, deadline, cause)
            .await
    }

    /// Acquire only if a warm instance is already available.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::NoReadyInstance`] if no instance is warm.
    pub async fn acquire_ready(
        &self,
        spec_key: &SpecKey,
        routing_key: Option<&str>,
    ) -> RuntimeResult<Instance> {
        self.acquire_internal(spec_key, routing_key, false, Duration::ZERO, StartCause::policy())
            .await
    }

    async fn acquire_internal(
        &self,
        spec_key: &SpecKey,
        routing_key: Option<&str>,
        allow_start: bool,
        deadline: Duration,
        cause: StartCause,
    ) -> RuntimeResult<Instance> {
        let wait_start = std::time::Instant::now();
        let spec = self.spec_for(spec_key)?;
        let pool_arc = self.pool_for(spec_key)?;
        let stateful = spec.strategy == Strategy::Stateful;
        let session_ttl = Duration::from_secs(spec.session_ttl_seconds);

        let try_pick = |pool_arc: &Arc<Mutex<PoolState>>| -> Option<Instance> {
            let mut pool = pool_arc.lock();
            match pool.pick(routing_key, stateful, spec.max_concurrent, session_ttl) {
                Pick::Ready(id) => pool.get(&id).cloned(),
                Pick::NeedsStart => None,
            }
        };

        loop {
            if let Some(instance) = try_pick(&pool_arc) {
                self.metrics.observe_pool_wait(spec_key.as_str(), wait_start.elapsed());
                return Ok(instance);
            }

            if !allow_start {
                return Err(RuntimeError::NoReadyInstance(spec_key.to_string()));
            }

            let remaining = deadline.saturating_sub(wait_start.elapsed());
            if remaining.is_zero() {
                return Err(RuntimeError::AcquireTimeout {
                    spec_key: spec_key.to_string(),
                    cold_start: pool_arc.lock().starting_count() > 0,
                });
            }

            // At most one in-flight start per spec: a caller that finds one
            // already running joins it as a waiter instead of spawning a
            // second child process/HTTP session for the same cold spec.
            let lead = pool_arc.lock().start_or_wait();
            if let StartLead::Follower(_) = &lead {
                self.metrics
                    .set_pool_waiters(spec_key.as_str(), u64::from(pool_arc.lock().waiter_count()));
            }
            let joined = timeout(
                remaining,
                self.run_start(spec_key, &pool_arc, &spec, cause.clone(), remaining, lead),
            );

            match joined.await {
                Ok(Ok(())) => {
                    // The instance that was just started (or the one we
                    // waited on) may already have been claimed by a faster
                    // concurrent picker; loop and re-check rather than
                    // assuming it is still ours.
                    continue;
                }
                Ok(Err(err)) => return Err(err),
                Err(_) => {
                    return Err(RuntimeError::AcquireTimeout {
                        spec_key: spec_key.to_string(),
                        cold_start: true,
                    })
                }
            }
        }
    }

    /// Either perform the single in-flight start (leader) or await its
    /// outcome (follower). Returns `Ok(())` once an instance has landed in
    /// the pool (by this call or another caller's), leaving the actual pick
    /// to the caller's loop.
    async fn run_start(
        &self,
        spec_key: &SpecKey,
        pool_arc: &Arc<Mutex<PoolState>>,
        spec: &ServerSpec,
        cause: StartCause,
        remaining: Duration,
        lead: StartLead,
    ) -> RuntimeResult<()> {
        match lead {
            StartLead::Follower(mut rx) => {
                // Removes this waiter on every exit path, including a
                // caller's deadline firing and dropping this future mid-wait
                // before the `decr_waiters` call below is ever reached.
                let _waiter_guard = WaiterGuard { pool: pool_arc, metrics: &self.metrics, spec_key };
                match rx.recv().await {
                    Ok(outcome) => outcome.map(|_instance| ()),
                    // The channel closed without delivering: the leader's
                    // guard dropped before sending. Stop waiting and let the
                    // caller's loop re-check the pool and possibly lead its
                    // own start.
                    Err(_) => Ok(()),
                }
            }
            StartLead::Leader => {
                self.metrics.incr_start_cause(spec_key.as_str(), cause_tag(&cause));
                let guard = StartGuard {
                    pool: pool_arc,
                    spec_key: spec_key.clone(),
                    outcome: None,
                };
                let start_result = self
                    .lifecycle
                    .start_instance(spec_key, spec, cause, self.initialize_retry_count, remaining)
                    .await;

                let outcome: StartOutcome = match start_result {
                    Ok((instance, allowed_methods)) => {
                        pool_arc.lock().insert(instance.clone());
                        if let Some(hook) = self.ready_hook.lock().clone() {
                            hook(spec_key.clone(), allowed_methods, instance.clone());
                        }
                        Ok(instance)
                    }
                    Err(err) => Err(err),
                };
                guard.conclude(outcome.clone());
                outcome.map(|_instance| ())
            }
        }
    }

    /// Release a previously acquired instance.
    pub fn release(&self, spec_key: &SpecKey, instance_id: &str) {
        let Some(pool_arc) = self.pools.get(spec_key) else {
            warn!(spec_key = %spec_key, "release for unknown spec ignored");
            return;
        };
        let Some(spec) = self.specs.get(spec_key) else {
            return;
        };
        let should_drain = pool_arc.lock().release(instance_id, spec.idle_seconds);
        if should_drain {
            self.drain_instance(spec_key, instance_id, spec.drain_timeout_seconds);
        }
    }

    fn drain_instance(&self, spec_key: &SpecKey, instance_id: &str, drain_timeout_seconds: u64) {
        let pool_arc = self.pool_for(spec_key).ok();
        let Some(pool_arc) = pool_arc else { return };
        pool_arc.lock().begin_drain(instance_id);
        let lifecycle = self.lifecycle.clone();
        let instance_id = instance_id.to_string();
        let spec_key = spec_key.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(drain_timeout_seconds)).await;
            if let Err(err) = lifecycle.stop_instance(&instance_id).await {
                warn!(%spec_key, error = %err, "drain stop failed");
            }
        });
    }

    /// Set the min-ready target for a spec and synchronously grow its pool
    /// toward that target, one start at a time, stopping at the first
    /// start failure so the caller (the init coordinator's worker) can
    /// classify and back off on it rather than this call silently
    /// swallowing it.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::UnknownSpec`] if the spec has no pool, or
    /// the error from the first failed start attempt made while growing
    /// toward `target`.
    pub async fn set_desired_min_ready(&self, spec_key: &SpecKey, target: u32) -> RuntimeResult<()> {
        let pool_arc = self.pool_for(spec_key)?;
        pool_arc.lock().set_min_ready(target);
        self.grow_to_target(spec_key, &pool_arc).await
    }

    /// Start instances one at a time until the pool's `ready_or_busy`
    /// count reaches its current `minReady` target, or a start fails. Shares
    /// the same single-in-flight-start coalescing as `acquire`: if a caller
    /// is already starting an instance for this spec, this joins it as a
    /// waiter instead of racing it with a second start.
    async fn grow_to_target(&self, spec_key: &SpecKey, pool_arc: &Arc<Mutex<PoolState>>) -> RuntimeResult<()> {
        let spec = self.spec_for(spec_key)?;
        loop {
            let need_more = {
                let pool = pool_arc.lock();
                (pool.ready_or_busy_count() as u32) < pool.min_ready()
            };
            if !need_more {
                return Ok(());
            }

            let lead = pool_arc.lock().start_or_wait();
            if let Err(err) = self
                .run_start(
                    spec_key,
                    pool_arc,
                    &spec,
                    StartCause::bootstrap(),
                    Duration::from_secs(30),
                    lead,
                )
                .await
            {
                warn!(%spec_key, error = %err, "min-ready warmup start failed");
                return Err(err);
            }
        }
    }

    /// Drain and stop every instance of a spec.
    pub async fn stop_spec(&self, spec_key: &SpecKey) {
        let Some(pool_arc) = self.pools.get(spec_key) else {
            return;
        };
        let ids: Vec<String> = pool_arc.lock().instances().map(|i| i.id.clone()).collect();
        for id in ids {
            if let Err(err) = self.lifecycle.stop_instance(&id).await {
                warn!(%spec_key, instance_id = %id, error = %err, "stop_spec failed to stop instance");
            }
            pool_arc.lock().remove(&id);
        }
    }

    /// Drain and stop every instance across every spec (graceful
    /// shutdown).
    pub async fn stop_all(&self) {
        let keys: Vec<SpecKey> = self.pools.iter().map(|e| e.key().clone()).collect();
        for key in keys {
            self.stop_spec(&key).await;
        }
    }

    /// Apply a catalog diff: create pools for added specs, drain+remove
    /// pools for removed specs, and update stored specs for changed ones.
    pub async fn apply_catalog_diff(&self, diff: &CatalogDiff, specs: &BTreeMap<SpecKey, ServerSpec>) {
        for key in &diff.added {
            if let Some(spec) = specs.get(key) {
                self.specs.insert(key.clone(), spec.clone());
                self.pools
                    .insert(key.clone(), Arc::new(Mutex::new(PoolState::new(key.clone()))));
                info!(spec_key = %key, "pool created for added spec");
            }
        }
        for key in &diff.removed {
            self.stop_spec(key).await;
            self.pools.remove(key);
            self.specs.remove(key);
            info!(spec_key = %key, "pool removed for removed spec");
        }
        for (key, fields) in &diff.changed {
            let Some(spec) = specs.get(key) else { continue };
            self.specs.insert(key.clone(), spec.clone());
            if let Some(pool_arc) = self.pools.get(key) {
                pool_arc.lock().set_min_ready(spec.min_ready);
            }
            if fields.requires_restart {
                info!(spec_key = %key, "spec field change requires restart, draining existing instances");
                self.metrics.incr_reload_restart(key.as_str());
                self.stop_spec(key).await;
            }
        }
    }

    /// Snapshot every pool's status.
    #[must_use]
    pub fn get_pool_status(&self) -> Vec<PoolInfo> {
        self.pools
            .iter()
            .map(|entry| {
                let pool = entry.value().lock();
                PoolInfo {
                    spec_key: pool.spec_key().clone(),
                    min_ready: pool.min_ready(),
                    ready: pool.ready_count(),
                    ready_or_busy: pool.ready_or_busy_count(),
                    failed: pool.failed_count(),
                    starting: pool.starting_count(),
                    waiters: pool.waiter_count(),
                }
            })
            .collect()
    }

    /// Ready/failed counts for one spec, used by the init coordinator's
    /// `poolCounts`.
    #[must_use]
    pub fn pool_counts(&self, spec_key: &SpecKey) -> Option<(u32, u32)> {
        let pool_arc = self.pools.get(spec_key)?;
        let pool = pool_arc.lock();
        Some((pool.ready_count() as u32, pool.failed_count() as u32))
    }

    /// Run the idle sweep ticker forever. Intended to be spawned as a
    /// background task.
    pub async fn run_idle_manager(self: Arc<Self>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            self.idle_sweep_once().await;
        }
    }

    async fn idle_sweep_once(&self) {
        let snapshot: Vec<(SpecKey, Arc<Mutex<PoolState>>, ServerSpec)> = self
            .pools
            .iter()
            .filter_map(|e| {
                let key = e.key().clone();
                self.specs.get(&key).map(|spec| (key, e.value().clone(), spec.clone()))
            })
            .collect();

        for (spec_key, pool_arc, spec) in snapshot {
            let always_on = matches!(spec.activation_mode, mcpv_types::spec::ActivationMode::AlwaysOn);
            let candidates = pool_arc.lock().idle_sweep_candidates(spec.idle_seconds, always_on);
            for instance_id in candidates {
                self.drain_instance(&spec_key, &instance_id, spec.drain_timeout_seconds);
            }
        }
    }

    /// Run the ping sweep ticker forever. Intended to be spawned as a
    /// background task.
    pub async fn run_ping_manager(self: Arc<Self>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            self.ping_sweep_once().await;
        }
    }

    async fn ping_sweep_once(&self) {
        let snapshot: Vec<(SpecKey, Arc<Mutex<PoolState>>)> =
            self.pools.iter().map(|e| (e.key().clone(), e.value().clone())).collect();

        for (spec_key, pool_arc) in snapshot {
            let ready_ids: Vec<String> = pool_arc.lock().ready_instance_ids();
            for instance_id in ready_ids {
                let Some(conn) = self.lifecycle.conn_for(&instance_id) else {
                    continue;
                };
                let ping = serde_json::json!({"jsonrpc": "2.0", "id": "ping", "method": "ping"});
                let payload = serde_json::to_vec(&ping).unwrap_or_default();
                if conn.call(payload, Duration::from_secs(5)).await.is_err() {
                    warn!(%spec_key, %instance_id, "ping failed, marking instance failed");
                    pool_arc.lock().mark_failed(&instance_id);
                }
            }
        }
    }
}

fn cause_tag(cause: &StartCause) -> &'static str {
    match cause.reason {
        mcpv_types::start_cause::StartReason::Bootstrap => "bootstrap",
        mcpv_types::start_cause::StartReason::Policy => "policy",
        mcpv_types::start_cause::StartReason::ToolCall => "tool_call",
        mcpv_types::start_cause::StartReason::Handshake => "handshake",
        mcpv_types::start_cause::StartReason::Manual => "manual",
    }
}
