//! # mcpv Transport
//!
//! The `Transport`/`Conn` capability interfaces plus two
//! adapters: a stdio child-process adapter and a streamable-HTTP adapter.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod adapters;
pub mod error;
pub mod traits;

pub use error::{TransportError, TransportResult};
pub use traits::{Conn, Connected, Transport};
