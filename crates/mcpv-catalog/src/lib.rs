//! # mcpv Catalog
//!
//! The catalog provider: loads the catalog file,
//! holds a lock-free atomic snapshot, computes diffs, and debounces +
//! broadcasts updates to subscribers.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod provider;
pub mod watcher;

pub use error::{CatalogError, CatalogResult};
pub use loader::load_from_path;
pub use provider::{CatalogProvider, CatalogUpdate, ReloadSource};
pub use watcher::watch_catalog_file;
