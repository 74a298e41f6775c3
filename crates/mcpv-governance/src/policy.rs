//! The `GovernancePolicy` capability interface.

use async_trait::async_trait;
use serde_json::Value;

/// One policy's verdict on a request or response it inspected.
///
/// A `{continue, requestJson?, responseJson?, rejectCode?, rejectMessage?,
/// category?}` shape: `request_json`/`response_json` are only meaningful on
/// the matching side of the chain,
/// and are ignored (not merely `None`) when `cont` is `true` and the policy
/// chose not to mutate anything.
#[derive(Debug, Clone)]
pub struct PolicyResult {
    /// Whether the chain should proceed to the next policy.
    pub cont: bool,
    /// Replacement request payload, if this policy rewrote it.
    pub request_json: Option<Value>,
    /// Replacement response payload, if this policy rewrote it.
    pub response_json: Option<Value>,
    /// Machine-readable rejection code, set only when `cont == false`.
    pub reject_code: Option<String>,
    /// Human-readable rejection message, set only when `cont == false`.
    pub reject_message: Option<String>,
    /// Policy-supplied category for the rejection (e.g. `"rate-limit"`,
    /// `"content-filter"`).
    pub category: Option<String>,
}

impl PolicyResult {
    /// Allow the chain to continue, optionally rewriting the request.
    #[must_use]
    pub fn allow_request(request_json: Option<Value>) -> Self {
        Self {
            cont: true,
            request_json,
            response_json: None,
            reject_code: None,
            reject_message: None,
            category: None,
        }
    }

    /// Allow the chain to continue, optionally rewriting the response.
    #[must_use]
    pub fn allow_response(response_json: Option<Value>) -> Self {
        Self {
            cont: true,
            request_json: None,
            response_json,
            reject_code: None,
            reject_message: None,
            category: None,
        }
    }

    /// Reject, stopping the chain.
    #[must_use]
    pub fn reject(code: impl Into<String>, message: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            cont: false,
            request_json: None,
            response_json: None,
            reject_code: Some(code.into()),
            reject_message: Some(message.into()),
            category: Some(category.into()),
        }
    }
}

/// A single governance policy, inspected on both the request and the
/// (symmetric, reverse-order) response side of a call.
#[async_trait]
pub trait GovernancePolicy: Send + Sync {
    /// Stable name, used as `plugin` in a rejection and in metrics.
    fn name(&self) -> &str;

    /// Inspect (and optionally rewrite) an outbound request.
    async fn check_request(&self, request: &Value) -> PolicyResult;

    /// Inspect (and optionally rewrite) an inbound response.
    async fn check_response(&self, response: &Value) -> PolicyResult;
}
