//! # mcpv Capability
//!
//! Canonical JSON serialization and SHA-256 content hashing for
//! tool/resource/prompt federation snapshots.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod canonical;
pub mod etag;
pub mod snapshot;

pub use canonical::{canonical_json_bytes, canonicalize};
pub use etag::{compute_etag, empty_etag};
pub use snapshot::build_snapshot;
