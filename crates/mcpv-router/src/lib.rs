//! # mcpv Router
//!
//! Staged call execution over the scheduler and instance lifecycle manager:
//! decode the JSON-RPC envelope, validate the method against the server's
//! captured capabilities, acquire an instance, and call it.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod router;

pub use error::{RouteError, RouteStage};
pub use router::{RouteOptions, Router};
