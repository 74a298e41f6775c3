//! Federated tool/resource/prompt snapshots.

use serde::{Deserialize, Serialize};

use crate::spec::SpecKey;

/// A tool advertised by a downstream server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolItem {
    /// Tool name — the primary key used for pagination cursors.
    pub name: String,
    /// Spec this tool belongs to.
    pub spec_key: SpecKey,
    /// Human-facing server name, denormalized for display.
    pub server_name: String,
    /// Raw MCP tool definition (schema, description, annotations).
    pub definition: serde_json::Value,
}

/// A resource advertised by a downstream server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceItem {
    /// Resource URI — the primary key used for pagination cursors.
    pub uri: String,
    /// Spec this resource belongs to.
    pub spec_key: SpecKey,
    /// Human-facing server name, denormalized for display.
    pub server_name: String,
    /// Raw MCP resource definition.
    pub definition: serde_json::Value,
}

/// A prompt advertised by a downstream server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptItem {
    /// Prompt name — the primary key used for pagination cursors.
    pub name: String,
    /// Spec this prompt belongs to.
    pub spec_key: SpecKey,
    /// Human-facing server name, denormalized for display.
    pub server_name: String,
    /// Raw MCP prompt definition.
    pub definition: serde_json::Value,
}

/// Anything with a stable, lexicographically-sortable primary key — the
/// contract pagination and ETag computation depend on. Because listings
/// re-sort by this key, a cursor survives unrelated adds/removes.
pub trait PrimaryKeyed {
    /// The primary key used for sorting and pagination cursors.
    fn primary_key(&self) -> &str;

    /// The spec this item belongs to, for post-lookup visibility checks.
    fn spec_key(&self) -> &SpecKey;
}

impl PrimaryKeyed for ToolItem {
    fn primary_key(&self) -> &str {
        &self.name
    }

    fn spec_key(&self) -> &SpecKey {
        &self.spec_key
    }
}

impl PrimaryKeyed for ResourceItem {
    fn primary_key(&self) -> &str {
        &self.uri
    }

    fn spec_key(&self) -> &SpecKey {
        &self.spec_key
    }
}

impl PrimaryKeyed for PromptItem {
    fn primary_key(&self) -> &str {
        &self.name
    }

    fn spec_key(&self) -> &SpecKey {
        &self.spec_key
    }
}

/// A content-addressed list of federation items.
///
/// `etag` is `hex(SHA256(canonical_json(items)))` as computed by
/// `mcpv-capability`; this crate only carries the data, it does not compute
/// the hash itself (data-only, no hashing dependency here).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot<T> {
    /// Content hash over the canonicalized `items`.
    pub etag: String,
    /// The items themselves, in the order the producer assembled them.
    pub items: Vec<T>,
}

impl<T> Snapshot<T> {
    /// An empty snapshot with the ETag of an empty canonical array.
    #[must_use]
    pub fn empty(empty_etag: impl Into<String>) -> Self {
        Self {
            etag: empty_etag.into(),
            items: Vec::new(),
        }
    }
}
