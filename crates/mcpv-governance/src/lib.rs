//! # mcpv Governance
//!
//! The ordered governance policy chain wrapping every client-facing method
//!: forward traversal on the request, reverse
//! traversal on the response, mutation propagation between policies, and
//! rejection shaping — an MCP error result for `tools/call`, a typed
//! [`mcpv_protocol::McpError::GovernanceRejection`] for everything else.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod chain;
pub mod error;
pub mod policy;

pub use chain::{GovernanceChain, TOOLS_CALL_METHOD};
pub use error::GovernanceRejection;
pub use policy::{GovernancePolicy, PolicyResult};
