//! The `Metrics` capability interface with `prometheus`
//! and `noop` implementations.

use std::time::Duration;

/// Discrete observations the control plane emits. Implementations are
/// free to ignore any subset (the `noop` backend ignores all of them).
pub trait Metrics: Send + Sync + std::fmt::Debug {
    /// A routed call completed in `duration`, tagged by outcome stage
    /// (`"ok"`, `"timeout-cold-start"`, `"acquire-failed"`, ...).
    fn observe_route(&self, spec_key: &str, stage: &str, duration: Duration);

    /// An `Acquire` waited `duration` before returning (warm hit or cold
    /// start alike).
    fn observe_pool_wait(&self, spec_key: &str, duration: Duration);

    /// An instance start attempt completed in `duration`; `success`
    /// indicates whether it reached `Ready`.
    fn observe_instance_start(&self, spec_key: &str, success: bool, duration: Duration);

    /// Increment the counter for a given [`mcpv_types::StartReason`] tag.
    fn incr_start_cause(&self, spec_key: &str, reason: &str);

    /// Report the current number of callers waiting on a pool's waiter
    /// queue.
    fn set_pool_waiters(&self, spec_key: &str, waiters: u64);

    /// A governance chain produced an outcome (`"allow"`, `"reject"`) for a
    /// method.
    fn incr_governance_outcome(&self, method: &str, outcome: &str);

    /// A catalog reload succeeded.
    fn incr_reload_success(&self);

    /// A catalog reload failed (parse/validate error).
    fn incr_reload_failure(&self);

    /// A catalog diff triggered an instance restart (a field change that
    /// requires restarting existing instances, not just a hot update).
    fn incr_reload_restart(&self, spec_key: &str);
}

/// A [`Metrics`] implementation that discards every observation. The
/// default when no exporter is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl Metrics for NoopMetrics {
    fn observe_route(&self, _spec_key: &str, _stage: &str, _duration: Duration) {}
    fn observe_pool_wait(&self, _spec_key: &str, _duration: Duration) {}
    fn observe_instance_start(&self, _spec_key: &str, _success: bool, _duration: Duration) {}
    fn incr_start_cause(&self, _spec_key: &str, _reason: &str) {}
    fn set_pool_waiters(&self, _spec_key: &str, _waiters: u64) {}
    fn incr_governance_outcome(&self, _method: &str, _outcome: &str) {}
    fn incr_reload_success(&self) {}
    fn incr_reload_failure(&self) {}
    fn incr_reload_restart(&self, _spec_key: &str) {}
}

/// A [`Metrics`] implementation that records through the `metrics` facade,
/// scraped via [`metrics_exporter_prometheus`].
#[derive(Debug, Default, Clone, Copy)]
pub struct PrometheusMetrics;

impl Metrics for PrometheusMetrics {
    fn observe_route(&self, spec_key: &str, stage: &str, duration: Duration) {
        metrics::histogram!("mcpv_route_seconds", "spec_key" => spec_key.to_string(), "stage" => stage.to_string())
            .record(duration.as_secs_f64());
    }

    fn observe_pool_wait(&self, spec_key: &str, duration: Duration) {
        metrics::histogram!("mcpv_pool_wait_seconds", "spec_key" => spec_key.to_string())
            .record(duration.as_secs_f64());
    }

    fn observe_instance_start(&self, spec_key: &str, success: bool, duration: Duration) {
        metrics::counter!("mcpv_instance_starts_total", "spec_key" => spec_key.to_string(), "success" => success.to_string())
            .increment(1);
        metrics::histogram!("mcpv_instance_start_seconds", "spec_key" => spec_key.to_string())
            .record(duration.as_secs_f64());
    }

    fn incr_start_cause(&self, spec_key: &str, reason: &str) {
        metrics::counter!("mcpv_start_cause_total", "spec_key" => spec_key.to_string(), "reason" => reason.to_string())
            .increment(1);
    }

    fn set_pool_waiters(&self, spec_key: &str, waiters: u64) {
        metrics::gauge!("mcpv_pool_waiters", "spec_key" => spec_key.to_string()).set(waiters as f64);
    }

    fn incr_governance_outcome(&self, method: &str, outcome: &str) {
        metrics::counter!("mcpv_governance_outcome_total", "method" => method.to_string(), "outcome" => outcome.to_string())
            .increment(1);
    }

    fn incr_reload_success(&self) {
        metrics::counter!("mcpv_reload_success_total").increment(1);
    }

    fn incr_reload_failure(&self) {
        metrics::counter!("mcpv_reload_failure_total").increment(1);
    }

    fn incr_reload_restart(&self, spec_key: &str) {
        metrics::counter!("mcpv_reload_restart_total", "spec_key" => spec_key.to_string()).increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_metrics_accepts_every_observation_without_panicking() {
        let m = NoopMetrics;
        m.observe_route("srv", "ok", Duration::from_millis(5));
        m.observe_pool_wait("srv", Duration::from_millis(1));
        m.observe_instance_start("srv", true, Duration::from_secs(1));
        m.incr_start_cause("srv", "bootstrap");
        m.set_pool_waiters("srv", 2);
        m.incr_governance_outcome("tools/call", "allow");
        m.incr_reload_success();
        m.incr_reload_failure();
        m.incr_reload_restart("srv");
    }
}
