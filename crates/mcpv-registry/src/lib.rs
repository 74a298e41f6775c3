//! # mcpv Registry
//!
//! The client registry: active
//! callers, heartbeats, tag/server selectors, and change events consumed by
//! federated discovery's live watches.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod events;
pub mod registry;

pub use error::{RegistryError, RegistryResult};
pub use events::{ChangeKind, ClientChangeEvent};
pub use registry::ClientRegistry;
