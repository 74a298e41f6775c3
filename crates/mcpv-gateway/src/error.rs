//! Gateway-local error type, converted to an HTTP status at the edge.

use mcpv_protocol::McpError;
use thiserror::Error;

/// Errors the gateway surface itself can raise, distinct from the
/// [`McpError`] taxonomy routed calls produce.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The request carried no bearer token and did not originate from
    /// loopback.
    #[error("missing or invalid bearer token")]
    Unauthorized,
    /// `client` name on a request does not match a registered caller.
    #[error("unknown client: {0}")]
    UnknownClient(String),
    /// The inner control-plane call failed.
    #[error(transparent)]
    Mcp(#[from] McpError),
    /// Request body failed to decode.
    #[error("invalid request body: {0}")]
    InvalidBody(String),
}

impl GatewayError {
    /// HTTP status code this error maps to.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Unauthorized => 401,
            Self::UnknownClient(_) | Self::InvalidBody(_) => 400,
            Self::Mcp(err) => match err {
                McpError::InvalidInput { .. } => 400,
                McpError::NotFound { .. } => 404,
                McpError::MethodNotAllowed { .. } => 403,
                McpError::Timeout { .. } => 504,
                McpError::FailedPrecondition { .. } | McpError::TransientTransport { .. } => 503,
                McpError::FatalConfig { .. } => 500,
                McpError::GovernanceRejection { .. } => 403,
                McpError::RetryExhausted { .. } => 503,
                _ => 500,
            },
        }
    }
}
