//! # mcpv Types
//!
//! Shared data model for the `mcpv` control plane — the canonical definitions
//! of everything the catalog, scheduler, router, and discovery layers pass
//! between each other.
//!
//! - **Catalog types**: [`ServerSpec`], [`CatalogState`], [`RuntimeConfig`]
//! - **Runtime types**: [`Instance`], [`InstanceState`], [`StartCause`]
//! - **Status types**: [`ServerInitStatus`], [`InitState`]
//! - **Federation types**: [`Snapshot`], [`ToolItem`], [`ResourceItem`], [`PromptItem`]
//! - **Registry types**: [`ClientEntry`]
//!
//! This crate is data-only: no I/O, no locking, no async. Everything here is
//! `Clone + Serialize + Deserialize` so it can cross process boundaries on
//! the RPC surface unchanged.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod catalog;
pub mod client;
pub mod instance;
pub mod snapshot;
pub mod spec;
pub mod start_cause;
pub mod status;

pub use catalog::{CatalogDiff, CatalogState, RuntimeConfig};
pub use client::ClientEntry;
pub use instance::{Instance, InstanceState};
pub use snapshot::{PromptItem, ResourceItem, Snapshot, ToolItem};
pub use spec::{ActivationMode, ServerSpec, SpecKey, Strategy, Transport};
pub use start_cause::{StartCause, StartReason};
pub use status::{InitState, ServerInitStatus};

/// MCP protocol version this control plane negotiates with downstream servers.
///
/// A server speaking a different version than its spec declares is
/// classified as an unsupported-protocol (fatal) startup error.
pub const PROTOCOL_VERSION: &str = "2025-11-25";

/// Protocol versions this control plane accepts from a downstream server's
/// `initialize` response, in addition to [`PROTOCOL_VERSION`].
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2025-11-25", "2025-06-18"];
