//! Governance-specific error glue.

use mcpv_protocol::McpError;

/// A chain rejection, shaped for its two call sites: `tools/call`
/// rejections encode to an MCP error result, everything else surfaces
/// this directly as a typed [`McpError::GovernanceRejection`].
#[derive(Debug, Clone)]
pub struct GovernanceRejection {
    /// Name of the policy that rejected the request/response.
    pub plugin: String,
    /// Policy-supplied category (e.g. `"rate-limit"`).
    pub category: String,
    /// Machine-readable rejection code.
    pub code: String,
    /// Human-readable rejection message.
    pub message: String,
}

impl GovernanceRejection {
    /// Convert to the uniform [`McpError`] taxonomy for non-`tools/call`
    /// methods.
    #[must_use]
    pub fn into_mcp_error(self) -> McpError {
        McpError::GovernanceRejection {
            category: self.category,
            plugin: self.plugin,
            code: self.code,
            message: self.message,
        }
    }
}
