//! Per-spec instance pools.
//!
//! [`PoolState`] is plain, lock-free data; the scheduler wraps one in a
//! `parking_lot::Mutex` per spec and only ever holds the lock to mutate
//! state maps, never across I/O.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use mcpv_types::instance::{Instance, InstanceState};
use mcpv_types::spec::SpecKey;
use tokio::sync::broadcast;

use crate::error::{RuntimeError, RuntimeResult};

/// Outcome of a single in-flight start attempt, broadcast to every caller
/// that joined it as a waiter rather than starting a duplicate.
pub type StartOutcome = RuntimeResult<Instance>;

/// Whether a caller that found no ready instance should perform the start
/// itself, or wait on one already in flight.
pub enum StartLead {
    /// No start is in flight for this pool; the caller must perform one and
    /// call [`PoolState::conclude_start`] when it finishes.
    Leader,
    /// A start is already in flight; await this receiver for its outcome
    /// instead of starting a second instance.
    Follower(broadcast::Receiver<StartOutcome>),
}

/// A stateful-strategy sticky binding: which instance a routing key is
/// currently pinned to, and when it was last used. Kept in a small arena
/// per pool so TTL sweeps stay cheap.
#[derive(Debug, Clone)]
pub struct StickyBinding {
    /// Instance this routing key is pinned to.
    pub instance_id: String,
    /// Last time this binding served a call.
    pub last_used: DateTime<Utc>,
}

/// Whether picking an instance requires starting a new one.
pub enum Pick {
    /// An existing instance can serve the call immediately.
    Ready(String),
    /// No ready instance; caller should start one and wait.
    NeedsStart,
}

/// Per-spec collection of instances plus sticky bindings.
pub struct PoolState {
    spec_key: SpecKey,
    instances: HashMap<String, Instance>,
    sticky: HashMap<String, StickyBinding>,
    min_ready: u32,
    /// Number of start attempts currently in flight, tracked so `Acquire`
    /// can classify a timeout as cold-start vs acquire-failed.
    starting: u32,
    /// Callers currently waiting on this pool.
    waiters: u32,
    /// Broadcast sender for the single in-flight start, if one is running.
    /// `Some` iff `starting > 0`.
    start_tx: Option<broadcast::Sender<StartOutcome>>,
}

impl PoolState {
    /// An empty pool for `spec_key` with no desired minimum yet.
    #[must_use]
    pub fn new(spec_key: SpecKey) -> Self {
        Self {
            spec_key,
            instances: HashMap::new(),
            sticky: HashMap::new(),
            min_ready: 0,
            starting: 0,
            waiters: 0,
            start_tx: None,
        }
    }

    /// The spec this pool serves.
    #[must_use]
    pub fn spec_key(&self) -> &SpecKey {
        &self.spec_key
    }

    /// Current min-ready target.
    #[must_use]
    pub fn min_ready(&self) -> u32 {
        self.min_ready
    }

    /// Update the min-ready target.
    pub fn set_min_ready(&mut self, target: u32) {
        self.min_ready = target;
    }

    /// Count of instances currently `Ready` or `Busy`.
    #[must_use]
    pub fn ready_or_busy_count(&self) -> usize {
        self.instances
            .values()
            .filter(|i| i.state.is_ready_or_busy())
            .count()
    }

    /// Count of instances currently exactly `Ready` (idle, acquirable).
    #[must_use]
    pub fn ready_count(&self) -> usize {
        self.instances
            .values()
            .filter(|i| i.state == InstanceState::Ready)
            .count()
    }

    /// Count of instances currently `Failed`.
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.instances
            .values()
            .filter(|i| i.state == InstanceState::Failed)
            .count()
    }

    /// Number of in-flight start attempts.
    #[must_use]
    pub fn starting_count(&self) -> u32 {
        self.starting
    }

    /// Claim leadership of a start attempt, or join the one already in
    /// flight as a waiter. At most one start is ever in flight per pool: a
    /// caller that gets [`StartLead::Follower`] must not start an instance
    /// itself, only await the returned receiver.
    pub fn start_or_wait(&mut self) -> StartLead {
        if self.starting > 0 {
            self.waiters += 1;
            let rx = self
                .start_tx
                .as_ref()
                .expect("starting > 0 implies start_tx is set")
                .subscribe();
            StartLead::Follower(rx)
        } else {
            self.starting = 1;
            let (tx, _rx) = broadcast::channel(1);
            self.start_tx = Some(tx);
            StartLead::Leader
        }
    }

    /// Record a waiter leaving the waiter queue after its wait resolves,
    /// whether by outcome, lag, or cancellation — a cancelled acquire always
    /// removes its waiter.
    pub fn decr_waiters(&mut self) {
        self.waiters = self.waiters.saturating_sub(1);
    }

    /// Conclude the in-flight start and broadcast its outcome to every
    /// waiter that joined it. Called exactly once per [`StartLead::Leader`],
    /// including when the leader's future is dropped before finishing (a
    /// cancelled acquire still frees its followers rather than leaving them
    /// waiting forever).
    pub fn conclude_start(&mut self, outcome: StartOutcome) {
        self.starting = self.starting.saturating_sub(1);
        if let Some(tx) = self.start_tx.take() {
            let _ = tx.send(outcome);
        }
    }

    /// Current waiter count, for the pool-waiters gauge.
    #[must_use]
    pub fn waiter_count(&self) -> u32 {
        self.waiters
    }

    /// Insert a freshly started instance.
    pub fn insert(&mut self, instance: Instance) {
        self.instances.insert(instance.id.clone(), instance);
    }

    /// Remove an instance entirely (after it stops).
    pub fn remove(&mut self, instance_id: &str) -> Option<Instance> {
        self.sticky.retain(|_, binding| binding.instance_id != instance_id);
        self.instances.remove(instance_id)
    }

    /// Borrow an instance by id.
    #[must_use]
    pub fn get(&self, instance_id: &str) -> Option<&Instance> {
        self.instances.get(instance_id)
    }

    /// All instances, for observability snapshots.
    #[must_use]
    pub fn instances(&self) -> impl Iterator<Item = &Instance> {
        self.instances.values()
    }

    /// Resolve a sticky binding if present, not expired, and still backed
    /// by a live instance.
    fn live_sticky_instance(&self, routing_key: &str, session_ttl: Duration) -> Option<&Instance> {
        let binding = self.sticky.get(routing_key)?;
        if session_ttl > Duration::ZERO {
            let age = Utc::now() - binding.last_used;
            let ttl = chrono::Duration::from_std(session_ttl).unwrap_or(chrono::Duration::days(3650));
            if age > ttl {
                return None;
            }
        }
        let instance = self.instances.get(&binding.instance_id)?;
        instance.state.is_ready_or_busy().then_some(instance)
    }

    /// Attempt to pick a servable instance: a live sticky binding first,
    /// then any ready instance under its concurrency limit. Mutates
    /// `busy_count`/`last_active` and binds a sticky routing key in place
    /// if one is supplied and stateful.
    pub fn pick(
        &mut self,
        routing_key: Option<&str>,
        stateful: bool,
        max_concurrent: u32,
        session_ttl: Duration,
    ) -> Pick {
        let now = Utc::now();

        if stateful {
            if let Some(key) = routing_key {
                if let Some(instance) = self.live_sticky_instance(key, session_ttl) {
                    if instance.busy_count < max_concurrent {
                        let id = instance.id.clone();
                        self.bump_busy(&id, now);
                        self.sticky.insert(
                            key.to_string(),
                            StickyBinding {
                                instance_id: id.clone(),
                                last_used: now,
                            },
                        );
                        return Pick::Ready(id);
                    }
                }
            }
        }

        let candidate = self
            .instances
            .values()
            .find(|i| i.state == InstanceState::Ready && i.busy_count < max_concurrent)
            .map(|i| i.id.clone());

        if let Some(id) = candidate {
            self.bump_busy(&id, now);
            if stateful {
                if let Some(key) = routing_key {
                    self.sticky.insert(
                        key.to_string(),
                        StickyBinding {
                            instance_id: id.clone(),
                            last_used: now,
                        },
                    );
                }
            }
            return Pick::Ready(id);
        }

        Pick::NeedsStart
    }

    fn bump_busy(&mut self, instance_id: &str, now: DateTime<Utc>) {
        if let Some(instance) = self.instances.get_mut(instance_id) {
            instance.busy_count += 1;
            instance.last_active = now;
            instance.state = InstanceState::Busy;
        }
    }

    /// Release an instance acquired via [`PoolState::pick`]
    ///. Returns `true` if the instance is now
    /// idle-eligible for immediate drain (more ready instances than
    /// `minReady`, this one exceeds it, and `idleSeconds == 0`).
    pub fn release(&mut self, instance_id: &str, idle_seconds: u64) -> bool {
        let now = Utc::now();
        let Some(instance) = self.instances.get_mut(instance_id) else {
            return false;
        };
        instance.busy_count = instance.busy_count.saturating_sub(1);
        instance.last_active = now;
        if instance.busy_count == 0 && instance.state == InstanceState::Busy {
            instance.state = InstanceState::Ready;
        }

        idle_seconds == 0 && self.ready_count() as u32 > self.min_ready
    }

    /// Instances eligible for idle drain this tick: `Ready`, `busyCount ==
    /// 0`, idle for at least
    /// `idle_seconds`, and the pool has more ready instances than
    /// `minReady` (or the spec is on-demand with `minReady == 0`).
    #[must_use]
    pub fn idle_sweep_candidates(&self, idle_seconds: u64, always_on: bool) -> Vec<String> {
        if idle_seconds == 0 {
            return Vec::new();
        }
        let ready = self.ready_count() as u32;
        let floor = if always_on { self.min_ready.max(1) } else { self.min_ready };
        if ready <= floor {
            return Vec::new();
        }
        let now = Utc::now();
        let mut spare = ready - floor;
        let mut candidates = Vec::new();
        let mut idle_instances: Vec<&Instance> = self
            .instances
            .values()
            .filter(|i| i.state == InstanceState::Ready && i.busy_count == 0)
            .collect();
        idle_instances.sort_by_key(|i| i.last_active);
        for instance in idle_instances {
            if spare == 0 {
                break;
            }
            let idle_for = now - instance.last_active;
            if idle_for >= chrono::Duration::seconds(idle_seconds as i64) {
                candidates.push(instance.id.clone());
                spare -= 1;
            }
        }
        candidates
    }

    /// Every `Ready` instance, for the ping sweep.
    #[must_use]
    pub fn ready_instance_ids(&self) -> Vec<String> {
        self.instances
            .values()
            .filter(|i| i.state == InstanceState::Ready)
            .map(|i| i.id.clone())
            .collect()
    }

    /// Transition an instance to `Draining`.
    pub fn begin_drain(&mut self, instance_id: &str) {
        if let Some(instance) = self.instances.get_mut(instance_id) {
            instance.state = InstanceState::Draining;
        }
    }

    /// Transition an instance to `Failed` (ping sweep failure: a failed
    /// ping drops the instance from future picks).
    pub fn mark_failed(&mut self, instance_id: &str) {
        if let Some(instance) = self.instances.get_mut(instance_id) {
            instance.state = InstanceState::Failed;
        }
    }

    /// Sum of `busyCount` across the pool.
    #[must_use]
    pub fn total_busy(&self) -> u32 {
        self.instances.values().map(|i| i.busy_count).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcpv_types::start_cause::StartCause;

    fn ready_instance(id: &str) -> Instance {
        let mut instance =
            Instance::starting(id.to_string(), SpecKey::from("srv"), StartCause::bootstrap(), Utc::now());
        instance.state = InstanceState::Ready;
        instance
    }

    #[test]
    fn sticky_routing_key_rebinds_to_same_instance_until_different_key() {
        let mut pool = PoolState::new(SpecKey::from("srv"));
        pool.insert(ready_instance("i1"));
        pool.insert(ready_instance("i2"));

        let first = match pool.pick(Some("rk=x"), true, 2, Duration::from_secs(60)) {
            Pick::Ready(id) => id,
            Pick::NeedsStart => panic!("expected a ready instance"),
        };
        pool.release(&first, 0);

        let second = match pool.pick(Some("rk=x"), true, 2, Duration::from_secs(60)) {
            Pick::Ready(id) => id,
            Pick::NeedsStart => panic!("expected sticky hit"),
        };
        assert_eq!(first, second);

        let third = match pool.pick(Some("rk=y"), true, 2, Duration::from_secs(60)) {
            Pick::Ready(id) => id,
            Pick::NeedsStart => panic!("expected a second ready instance"),
        };
        assert_ne!(third, first);
    }

    #[test]
    fn pick_never_exceeds_max_concurrent() {
        let mut pool = PoolState::new(SpecKey::from("srv"));
        pool.insert(ready_instance("i1"));

        assert!(matches!(pool.pick(None, false, 1, Duration::ZERO), Pick::Ready(_)));
        assert!(matches!(pool.pick(None, false, 1, Duration::ZERO), Pick::NeedsStart));
        assert_eq!(pool.total_busy(), 1);
    }

    #[test]
    fn idle_sweep_respects_min_ready_floor() {
        let mut pool = PoolState::new(SpecKey::from("srv"));
        pool.set_min_ready(1);
        let mut stale = ready_instance("i1");
        stale.last_active = Utc::now() - chrono::Duration::seconds(120);
        pool.insert(stale);
        let mut fresh = ready_instance("i2");
        fresh.last_active = Utc::now() - chrono::Duration::seconds(120);
        pool.insert(fresh);

        let candidates = pool.idle_sweep_candidates(30, false);
        assert_eq!(candidates.len(), 1);
    }

    #[test]
    fn idle_sweep_is_empty_when_ready_at_or_below_min_ready() {
        let mut pool = PoolState::new(SpecKey::from("srv"));
        pool.set_min_ready(1);
        let mut stale = ready_instance("i1");
        stale.last_active = Utc::now() - chrono::Duration::seconds(120);
        pool.insert(stale);

        assert!(pool.idle_sweep_candidates(30, false).is_empty());
    }

    #[test]
    fn release_without_prior_acquire_is_a_harmless_no_op() {
        let mut pool = PoolState::new(SpecKey::from("srv"));
        assert!(!pool.release("ghost", 0));
    }
}
