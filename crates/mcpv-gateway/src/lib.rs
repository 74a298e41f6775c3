//! The external RPC/gateway surface.
//!
//! Everything downstream of "a caller sent us a request" — stdio framing,
//! the streamable-HTTP router, bearer/CORS enforcement, and long-running
//! task tracking — lives here. Routing, discovery, and governance
//! themselves live in their own crates; this one only translates wire
//! requests into calls against them.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod auth;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod state;
pub mod stdio;
pub mod tasks;

pub use dispatch::dispatch;
pub use error::GatewayError;
pub use http::build_router;
pub use state::{GatewayConfig, GatewayState, TlsConfig};
pub use tasks::{TaskEvent, TaskRecord, TaskRegistry, TaskStatus};
