//! Staged call execution.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use mcpv_protocol::jsonrpc::JsonRpcRequest;
use mcpv_protocol::{AllowedMethods, McpError};
use mcpv_runtime::{InstanceLifecycleManager, RuntimeError, Scheduler};
use mcpv_telemetry::Metrics;
use mcpv_types::spec::SpecKey;
use mcpv_types::start_cause::StartCause;
use crate::error::{RouteError, RouteStage};

/// Per-call options threaded from the gateway surface into the router.
#[derive(Debug, Clone)]
pub struct RouteOptions {
    /// Routing key for stateful sticky binding, if any.
    pub routing_key: Option<String>,
    /// Whether `Acquire` may cold-start a new instance.
    pub allow_start: bool,
    /// Overall deadline for acquire + call.
    pub timeout: Duration,
    /// Provenance recorded if this call triggers a cold start.
    pub cause: StartCause,
}

/// Ties the scheduler and lifecycle manager together behind the four-stage
/// pipeline: decode, validate, acquire, call.
pub struct Router {
    scheduler: Arc<Scheduler>,
    lifecycle: Arc<InstanceLifecycleManager>,
    metrics: Arc<dyn Metrics>,
    capabilities: DashMap<SpecKey, AllowedMethods>,
}

impl Router {
    /// Construct a router over `scheduler` and `lifecycle`.
    #[must_use]
    pub fn new(scheduler: Arc<Scheduler>, lifecycle: Arc<InstanceLifecycleManager>, metrics: Arc<dyn Metrics>) -> Self {
        Self {
            scheduler,
            lifecycle,
            metrics,
            capabilities: DashMap::new(),
        }
    }

    /// Record the capability-derived method allow-list learned from a
    /// spec's most recent successful handshake, consumed by the `Validate`
    /// stage. Until a spec's first instance has handshaken, `Validate` is
    /// permissive.
    pub fn record_capabilities(&self, spec_key: SpecKey, allowed: AllowedMethods) {
        self.capabilities.insert(spec_key, allowed);
    }

    /// Run one call through decode -> validate -> acquire -> call
    ///. `Release` is guaranteed on every exit path once
    /// acquire has succeeded.
    ///
    /// # Errors
    ///
    /// Returns a [`RouteError`] tagged with the stage that failed.
    pub async fn route(&self, spec_key: &SpecKey, raw_request: &[u8], options: RouteOptions) -> Result<Vec<u8>, RouteError> {
        let start = std::time::Instant::now();
        let outcome = self.route_inner(spec_key, raw_request, &options).await;
        let tag = outcome.as_ref().map_or_else(RouteError::metric_tag, |_| "ok");
        self.metrics.observe_route(spec_key.as_str(), tag, start.elapsed());
        outcome
    }

    async fn route_inner(&self, spec_key: &SpecKey, raw_request: &[u8], options: &RouteOptions) -> Result<Vec<u8>, RouteError> {
        // Stage: Decode.
        let request: JsonRpcRequest = serde_json::from_slice(raw_request).map_err(|e| {
            RouteError::new(
                RouteStage::Decode,
                McpError::InvalidInput {
                    message: format!("malformed json-rpc request: {e}"),
                },
            )
        })?;

        // Stage: Validate.
        if let Some(allowed) = self.capabilities.get(spec_key) {
            if !allowed.allows(&request.method) {
                return Err(RouteError::new(
                    RouteStage::Validate,
                    McpError::MethodNotAllowed {
                        method: request.method.clone(),
                    },
                ));
            }
        }

        // Stage: Acquire.
        let instance = if options.allow_start {
            self.scheduler
                .acquire(spec_key, options.routing_key.as_deref(), options.timeout, options.cause.clone())
                .await
        } else {
            self.scheduler.acquire_ready(spec_key, options.routing_key.as_deref()).await
        }
        .map_err(|e| RouteError::new(RouteStage::Acquire, runtime_error_to_mcp(e)))?;

        let release_guard = ReleaseGuard {
            scheduler: &self.scheduler,
            spec_key,
            instance_id: instance.id.clone(),
        };

        // Stage: Call.
        let result = self.call_instance(&instance.id, raw_request, options.timeout).await;
        drop(release_guard);
        result
    }

    async fn call_instance(&self, instance_id: &str, raw_request: &[u8], timeout: Duration) -> Result<Vec<u8>, RouteError> {
        let Some(conn) = self.lifecycle.conn_for(instance_id) else {
            return Err(RouteError::new(
                RouteStage::Call,
                McpError::FailedPrecondition {
                    message: format!("instance {instance_id} has no live connection"),
                },
            ));
        };
        conn.call(raw_request.to_vec(), timeout).await.map_err(|e| {
            let mcp = if e.is_fatal() {
                McpError::FatalConfig { message: e.to_string() }
            } else {
                McpError::TransientTransport { message: e.to_string() }
            };
            RouteError::new(RouteStage::Call, mcp)
        })
    }
}

fn runtime_error_to_mcp(err: RuntimeError) -> McpError {
    match err {
        RuntimeError::NoReadyInstance(spec) => McpError::NotFound {
            message: format!("no ready instance for spec {spec}"),
        },
        RuntimeError::AcquireTimeout { spec_key, .. } => McpError::Timeout {
            message: format!("acquire timed out for spec {spec_key}"),
        },
        RuntimeError::UnknownSpec(spec) => McpError::InvalidInput {
            message: format!("unknown spec {spec}"),
        },
        other => McpError::TransientTransport { message: other.to_string() },
    }
}

struct ReleaseGuard<'a> {
    scheduler: &'a Scheduler,
    spec_key: &'a SpecKey,
    instance_id: String,
}

impl Drop for ReleaseGuard<'_> {
    fn drop(&mut self) {
        self.scheduler.release(self.spec_key, &self.instance_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcpv_telemetry::metrics::NoopMetrics;

    fn router() -> Router {
        let lifecycle = Arc::new(InstanceLifecycleManager::new(Arc::new(NoopMetrics)));
        let scheduler = Arc::new(Scheduler::new(lifecycle.clone(), Arc::new(NoopMetrics), 2));
        Router::new(scheduler, lifecycle, Arc::new(NoopMetrics))
    }

    fn options() -> RouteOptions {
        RouteOptions {
            routing_key: None,
            allow_start: false,
            timeout: Duration::from_millis(50),
            cause: StartCause::policy(),
        }
    }

    #[tokio::test]
    async fn malformed_envelope_fails_at_decode_stage() {
        let router = router();
        let err = router
            .route(&SpecKey::from("srv"), b"not json", options())
            .await
            .unwrap_err();
        assert_eq!(err.stage, RouteStage::Decode);
        assert_eq!(err.metric_tag(), "invalid-request");
    }

    #[tokio::test]
    async fn disallowed_method_fails_at_validate_stage() {
        let router = router();
        router.record_capabilities(SpecKey::from("srv"), AllowedMethods::from_capabilities(&serde_json::json!({"tools": {}})));
        let request = JsonRpcRequest::new(mcpv_protocol::jsonrpc::RequestId::Number(1), "resources/read", None);
        let bytes = serde_json::to_vec(&request).unwrap();
        let err = router.route(&SpecKey::from("srv"), &bytes, options()).await.unwrap_err();
        assert_eq!(err.stage, RouteStage::Validate);
        assert_eq!(err.metric_tag(), "method-not-allowed");
    }

    #[tokio::test]
    async fn unknown_spec_fails_at_acquire_stage() {
        let router = router();
        let request = JsonRpcRequest::new(mcpv_protocol::jsonrpc::RequestId::Number(1), "ping", None);
        let bytes = serde_json::to_vec(&request).unwrap();
        let err = router.route(&SpecKey::from("ghost"), &bytes, options()).await.unwrap_err();
        assert_eq!(err.stage, RouteStage::Acquire);
    }
}
