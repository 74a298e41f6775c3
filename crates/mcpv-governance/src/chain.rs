//! The ordered policy chain and its `Execute` wrapper.

use std::future::Future;
use std::sync::Arc;

use mcpv_protocol::McpError;
use mcpv_telemetry::Metrics;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::GovernanceRejection;
use crate::policy::{GovernancePolicy, PolicyResult};

/// Method name that triggers MCP-shaped rejection encoding instead of a
/// typed error.
pub const TOOLS_CALL_METHOD: &str = "tools/call";

/// Outcome of running one direction of the chain.
enum ChainOutcome {
    Continue(Value),
    Rejected(GovernanceRejection),
}

/// An ordered list of [`GovernancePolicy`] implementations, run forward on
/// the request and in reverse on the response.
///
/// A `nil`/empty chain, or one whose entries are all absent, is a no-op:
/// [`GovernanceChain::default`] and [`GovernanceChain::new`] with an empty
/// `Vec` both behave this way, satisfying the nil-tolerance contract.
#[derive(Clone, Default)]
pub struct GovernanceChain {
    policies: Vec<Arc<dyn GovernancePolicy>>,
    metrics: Option<Arc<dyn Metrics>>,
}

impl GovernanceChain {
    /// Build a chain from an ordered list of policies. Outcome metrics are
    /// not recorded unless [`GovernanceChain::with_metrics`] is used.
    #[must_use]
    pub fn new(policies: Vec<Arc<dyn GovernancePolicy>>) -> Self {
        Self { policies, metrics: None }
    }

    /// Attach a metrics sink so `execute` records the `governance-outcome`
    /// counter on every call.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<dyn Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Whether this chain has no policies to run.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    async fn run_request(&self, request: &Value) -> ChainOutcome {
        let mut current = request.clone();
        for policy in &self.policies {
            let result: PolicyResult = policy.check_request(&current).await;
            if !result.cont {
                return ChainOutcome::Rejected(rejection_from(policy.name(), &result));
            }
            if let Some(rewritten) = result.request_json {
                current = rewritten;
            }
        }
        ChainOutcome::Continue(current)
    }

    async fn run_response(&self, response: &Value) -> ChainOutcome {
        let mut current = response.clone();
        for policy in self.policies.iter().rev() {
            let result: PolicyResult = policy.check_response(&current).await;
            if !result.cont {
                return ChainOutcome::Rejected(rejection_from(policy.name(), &result));
            }
            if let Some(rewritten) = result.response_json {
                current = rewritten;
            }
        }
        ChainOutcome::Continue(current)
    }

    /// Run `request` through the request chain, invoke `next` with the
    /// (possibly mutated) request, then run the response chain over its
    /// result.
    ///
    /// A `tools/call` rejection is encoded as a normal (non-error) MCP
    /// `CallToolResult` payload so it can flow back to the caller through
    /// the same channel as a successful call; rejections on every other
    /// method surface as a typed [`McpError::GovernanceRejection`].
    ///
    /// # Errors
    ///
    /// Returns whatever error `next` returns, or a [`McpError`] if a
    /// non-`tools/call` rejection occurs on either side of the chain.
    pub async fn execute<F, Fut>(&self, method: &str, request: Value, next: F) -> Result<Value, McpError>
    where
        F: FnOnce(Value) -> Fut,
        Fut: Future<Output = Result<Value, McpError>>,
    {
        let is_tool_call = method == TOOLS_CALL_METHOD;

        let mutated_request = match self.run_request(&request).await {
            ChainOutcome::Continue(req) => req,
            ChainOutcome::Rejected(rejection) => {
                debug!(plugin = %rejection.plugin, code = %rejection.code, "governance rejected request");
                self.record_outcome(method, "reject");
                return reject(is_tool_call, rejection);
            }
        };

        let response = next(mutated_request).await?;

        match self.run_response(&response).await {
            ChainOutcome::Continue(resp) => {
                self.record_outcome(method, "allow");
                Ok(resp)
            }
            ChainOutcome::Rejected(rejection) => {
                debug!(plugin = %rejection.plugin, code = %rejection.code, "governance rejected response");
                self.record_outcome(method, "reject");
                reject(is_tool_call, rejection)
            }
        }
    }

    fn record_outcome(&self, method: &str, outcome: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.incr_governance_outcome(method, outcome);
        }
    }
}

fn reject(is_tool_call: bool, rejection: GovernanceRejection) -> Result<Value, McpError> {
    if is_tool_call {
        Ok(tool_call_rejection_payload(&rejection))
    } else {
        Err(rejection.into_mcp_error())
    }
}

/// Shape a rejection as an MCP `CallToolResult`.
fn tool_call_rejection_payload(rejection: &GovernanceRejection) -> Value {
    json!({
        "isError": true,
        "content": [{"type": "text", "text": rejection.message}],
        "structuredContent": {"code": rejection.code, "message": rejection.message},
    })
}

fn rejection_from(plugin: &str, result: &PolicyResult) -> GovernanceRejection {
    GovernanceRejection {
        plugin: plugin.to_string(),
        category: result.category.clone().unwrap_or_default(),
        code: result.reject_code.clone().unwrap_or_default(),
        message: result.reject_message.clone().unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct RecordingPolicy {
        name: &'static str,
        log: Arc<parking_lot::Mutex<Vec<String>>>,
        reject_on: Option<&'static str>,
    }

    #[async_trait]
    impl GovernancePolicy for RecordingPolicy {
        fn name(&self) -> &str {
            self.name
        }

        async fn check_request(&self, _request: &Value) -> PolicyResult {
            self.log.lock().push(format!("req:{}", self.name));
            if self.reject_on == Some("request") {
                return PolicyResult::reject("FORBIDDEN", "nope", "policy");
            }
            PolicyResult::allow_request(None)
        }

        async fn check_response(&self, _response: &Value) -> PolicyResult {
            self.log.lock().push(format!("resp:{}", self.name));
            if self.reject_on == Some("response") {
                return PolicyResult::reject("FORBIDDEN", "nope", "policy");
            }
            PolicyResult::allow_response(None)
        }
    }

    fn policy(name: &'static str, log: Arc<parking_lot::Mutex<Vec<String>>>) -> Arc<dyn GovernancePolicy> {
        Arc::new(RecordingPolicy { name, log, reject_on: None })
    }

    #[tokio::test]
    async fn request_runs_forward_response_runs_reverse() {
        let log = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let chain = GovernanceChain::new(vec![policy("A", log.clone()), policy("B", log.clone()), policy("C", log.clone())]);

        chain
            .execute("ping", json!({}), |req| async move { Ok(req) })
            .await
            .unwrap();

        assert_eq!(*log.lock(), vec!["req:A", "req:B", "req:C", "resp:C", "resp:B", "resp:A"]);
    }

    #[tokio::test]
    async fn empty_chain_is_a_no_op() {
        let chain = GovernanceChain::default();
        assert!(chain.is_empty());
        let result = chain.execute("tools/call", json!({"x": 1}), |req| async move { Ok(req) }).await.unwrap();
        assert_eq!(result, json!({"x": 1}));
    }

    #[tokio::test]
    async fn tool_call_rejection_encodes_as_mcp_error_result() {
        let log = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let rejecting = Arc::new(RecordingPolicy {
            name: "P1",
            log,
            reject_on: Some("request"),
        });
        let chain = GovernanceChain::new(vec![rejecting]);

        let result = chain
            .execute("tools/call", json!({}), |req| async move { Ok(req) })
            .await
            .unwrap();

        assert_eq!(
            result,
            json!({
                "isError": true,
                "content": [{"type": "text", "text": "nope"}],
                "structuredContent": {"code": "FORBIDDEN", "message": "nope"},
            })
        );
    }

    #[tokio::test]
    async fn non_tool_call_rejection_surfaces_as_typed_error() {
        let log = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let rejecting = Arc::new(RecordingPolicy {
            name: "P1",
            log,
            reject_on: Some("request"),
        });
        let chain = GovernanceChain::new(vec![rejecting]);

        let err = chain.execute("resources/read", json!({}), |req| async move { Ok(req) }).await.unwrap_err();
        assert!(matches!(err, McpError::GovernanceRejection { .. }));
    }

    #[tokio::test]
    async fn rejection_stops_further_traversal_in_that_direction() {
        let log = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let rejecting = Arc::new(RecordingPolicy {
            name: "P1",
            log: log.clone(),
            reject_on: Some("request"),
        });
        let chain = GovernanceChain::new(vec![rejecting, policy("P2", log.clone())]);

        let _ = chain.execute("ping", json!({}), |req| async move { Ok(req) }).await;

        assert_eq!(*log.lock(), vec!["req:P1"]);
    }
}
