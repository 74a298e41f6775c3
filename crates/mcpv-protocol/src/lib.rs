//! # mcpv Protocol
//!
//! JSON-RPC envelope types, the `initialize` handshake, capability-derived
//! method allow-lists, and the uniform [`McpError`] taxonomy shared by the
//! router, governance pipeline, and gateway surface.
//!
//! This crate hosts the wire framing the core consumes; it is not a
//! general-purpose MCP implementation.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod capabilities;
pub mod error;
pub mod handshake;
pub mod jsonrpc;

pub use capabilities::AllowedMethods;
pub use error::{FailureClass, McpError, McpResult};
pub use handshake::{ClientInfo, InitializeParams, InitializeResult, ServerInfo};
pub use jsonrpc::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, RequestId};
