//! Filtered listings, tool resolution, and cached fallback.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use mcpv_protocol::McpError;
use mcpv_types::client::ClientEntry;
use mcpv_types::snapshot::{PrimaryKeyed, PromptItem, ResourceItem, ToolItem};
use mcpv_types::spec::{ServerSpec, SpecKey};
use serde::Serialize;

use crate::index::TypedIndex;
use crate::pagination::{paginate, Page, PAGE_SIZE};
use crate::visibility::effective_visible_specs;

/// A page of a federated listing, together with the ETag of the full
/// post-filter (pre-pagination) result set.
#[derive(Debug, Clone)]
pub struct Listing<T> {
    /// Content hash over every item visible to the caller, not just this
    /// page — membership changes are detectable without paging through the
    /// whole listing.
    pub etag: String,
    /// This page's items.
    pub page: Page<T>,
    /// `specKey -> CachedAt` for every spec represented in this listing
    /// whose pool had no `Ready` instance when the listing was computed.
    /// Those specs' items are being served from the metadata cache rather
    /// than a live server, per the cached-fallback behavior for a server
    /// that is starting or `Suspended`.
    pub stale: BTreeMap<SpecKey, DateTime<Utc>>,
}

/// Per-kind federation caches plus the listing/resolution operations
/// layered over them.
pub struct DiscoveryService {
    tools: TypedIndex<ToolItem>,
    resources: TypedIndex<ResourceItem>,
    prompts: TypedIndex<PromptItem>,
}

impl Default for DiscoveryService {
    fn default() -> Self {
        Self::new(64)
    }
}

impl DiscoveryService {
    /// Construct empty per-kind indexes, each with `change_capacity`
    /// buffered notifications per watch subscriber.
    #[must_use]
    pub fn new(change_capacity: usize) -> Self {
        Self {
            tools: TypedIndex::new(change_capacity),
            resources: TypedIndex::new(change_capacity),
            prompts: TypedIndex::new(change_capacity),
        }
    }

    /// The tool index, for publishing refreshes and subscribing to changes.
    #[must_use]
    pub fn tools(&self) -> &TypedIndex<ToolItem> {
        &self.tools
    }

    /// The resource index.
    #[must_use]
    pub fn resources(&self) -> &TypedIndex<ResourceItem> {
        &self.resources
    }

    /// The prompt index.
    #[must_use]
    pub fn prompts(&self) -> &TypedIndex<PromptItem> {
        &self.prompts
    }

    /// `listTools`.
    ///
    /// `ready_specs` is the set of specs with at least one `Ready` instance
    /// right now; any visible spec outside it is served from its cached
    /// fallback and reported in [`Listing::stale`].
    ///
    /// # Errors
    ///
    /// Returns [`McpError::invalid_cursor`] for an unknown cursor.
    pub fn list_tools(
        &self,
        caller: &ClientEntry,
        specs: &BTreeMap<SpecKey, ServerSpec>,
        ready_specs: &BTreeSet<SpecKey>,
        cursor: Option<&str>,
    ) -> Result<Listing<ToolItem>, McpError> {
        list(&self.tools, caller, specs, ready_specs, cursor)
    }

    /// `listResources`. See [`DiscoveryService::list_tools`] for
    /// `ready_specs`.
    ///
    /// # Errors
    ///
    /// Returns [`McpError::invalid_cursor`] for an unknown cursor.
    pub fn list_resources(
        &self,
        caller: &ClientEntry,
        specs: &BTreeMap<SpecKey, ServerSpec>,
        ready_specs: &BTreeSet<SpecKey>,
        cursor: Option<&str>,
    ) -> Result<Listing<ResourceItem>, McpError> {
        list(&self.resources, caller, specs, ready_specs, cursor)
    }

    /// `listPrompts`. See [`DiscoveryService::list_tools`] for
    /// `ready_specs`.
    ///
    /// # Errors
    ///
    /// Returns [`McpError::invalid_cursor`] for an unknown cursor.
    pub fn list_prompts(
        &self,
        caller: &ClientEntry,
        specs: &BTreeMap<SpecKey, ServerSpec>,
        ready_specs: &BTreeSet<SpecKey>,
        cursor: Option<&str>,
    ) -> Result<Listing<PromptItem>, McpError> {
        list(&self.prompts, caller, specs, ready_specs, cursor)
    }

    /// Resolve a tool call's target spec, denying visibility the same way a
    /// listing would.
    ///
    /// # Errors
    ///
    /// Returns [`McpError::not_found`] if the tool does not exist, or exists
    /// on a spec not visible to `caller`.
    pub fn resolve_tool(&self, tool_name: &str, caller: &ClientEntry, specs: &BTreeMap<SpecKey, ServerSpec>) -> Result<ToolItem, McpError> {
        resolve(&self.tools, "tool", tool_name, caller, specs)
    }

    /// Resolve a resource read's target spec by `uri`, same visibility
    /// contract as [`DiscoveryService::resolve_tool`].
    ///
    /// # Errors
    ///
    /// Returns [`McpError::not_found`] if the resource does not exist, or
    /// exists on a spec not visible to `caller`.
    pub fn resolve_resource(&self, uri: &str, caller: &ClientEntry, specs: &BTreeMap<SpecKey, ServerSpec>) -> Result<ResourceItem, McpError> {
        resolve(&self.resources, "resource", uri, caller, specs)
    }

    /// Resolve a prompt get's target spec by `name`, same visibility
    /// contract as [`DiscoveryService::resolve_tool`].
    ///
    /// # Errors
    ///
    /// Returns [`McpError::not_found`] if the prompt does not exist, or
    /// exists on a spec not visible to `caller`.
    pub fn resolve_prompt(&self, name: &str, caller: &ClientEntry, specs: &BTreeMap<SpecKey, ServerSpec>) -> Result<PromptItem, McpError> {
        resolve(&self.prompts, "prompt", name, caller, specs)
    }
}

fn resolve<T>(
    index: &TypedIndex<T>,
    kind: &str,
    key: &str,
    caller: &ClientEntry,
    specs: &BTreeMap<SpecKey, ServerSpec>,
) -> Result<T, McpError>
where
    T: PrimaryKeyed + Clone,
{
    let visible = effective_visible_specs(caller, specs);
    let all_specs: std::collections::BTreeSet<SpecKey> = specs.keys().cloned().collect();
    let candidate = index
        .items_for(&all_specs)
        .into_iter()
        .find(|item| item.primary_key() == key)
        .ok_or_else(|| McpError::not_found(kind, key))?;
    if !visible.contains(candidate.spec_key()) {
        return Err(McpError::not_found(kind, key));
    }
    Ok(candidate)
}

fn list<T>(
    index: &TypedIndex<T>,
    caller: &ClientEntry,
    specs: &BTreeMap<SpecKey, ServerSpec>,
    ready_specs: &BTreeSet<SpecKey>,
    cursor: Option<&str>,
) -> Result<Listing<T>, McpError>
where
    T: PrimaryKeyed + Clone + Serialize,
{
    let visible = effective_visible_specs(caller, specs);
    let items = index.items_for(&visible);
    let etag = mcpv_capability::compute_etag(&items).map_err(|e| McpError::InvalidInput {
        message: format!("failed to compute listing etag: {e}"),
    })?;
    let page = paginate(items, cursor, PAGE_SIZE)?;

    let stale = visible
        .iter()
        .filter(|spec_key| !ready_specs.contains(*spec_key))
        .filter_map(|spec_key| index.get(spec_key).map(|entry| (spec_key.clone(), entry.cached_at)))
        .collect();

    Ok(Listing { etag, page, stale })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mcpv_types::spec::{ActivationMode, Strategy, Transport};
    use std::collections::BTreeMap as Map;

    fn tool(name: &str, spec_key: &str) -> ToolItem {
        ToolItem {
            name: name.to_string(),
            spec_key: SpecKey::from(spec_key),
            server_name: spec_key.to_string(),
            definition: serde_json::json!({}),
        }
    }

    fn spec() -> ServerSpec {
        ServerSpec {
            name: "s".into(),
            transport: Transport::Stdio {
                command: "x".into(),
                args: vec![],
                env: Map::new(),
                cwd: None,
            },
            protocol_version: "2025-11-25".into(),
            tags: Default::default(),
            activation_mode: ActivationMode::OnDemand,
            strategy: Strategy::Stateless,
            max_concurrent: 1,
            min_ready: 0,
            idle_seconds: 0,
            drain_timeout_seconds: 0,
            session_ttl_seconds: 0,
        }
    }

    fn caller() -> ClientEntry {
        ClientEntry::new("c", None, Default::default(), None, Utc::now()).unwrap()
    }

    #[test]
    fn list_tools_returns_etag_over_the_full_visible_set_not_the_page() {
        let service = DiscoveryService::new(4);
        service.tools().publish(SpecKey::from("a"), vec![tool("t1", "a"), tool("t2", "a")], true);
        let mut specs = Map::new();
        specs.insert(SpecKey::from("a"), spec());
        let ready: std::collections::BTreeSet<SpecKey> = [SpecKey::from("a")].into_iter().collect();

        let listing = service.list_tools(&caller(), &specs, &ready, None).unwrap();
        assert_eq!(listing.page.items.len(), 2);
        let etag_over_all = mcpv_capability::compute_etag(&[tool("t1", "a"), tool("t2", "a")]).unwrap();
        assert_eq!(listing.etag, etag_over_all);
        assert!(listing.stale.is_empty(), "a ready spec must not be reported as stale");
    }

    #[test]
    fn list_tools_reports_cached_at_for_a_spec_with_no_ready_instance() {
        let service = DiscoveryService::new(4);
        service.tools().publish(SpecKey::from("a"), vec![tool("t1", "a")], true);
        let mut specs = Map::new();
        specs.insert(SpecKey::from("a"), spec());
        let no_ready_specs = std::collections::BTreeSet::new();

        let listing = service.list_tools(&caller(), &specs, &no_ready_specs, None).unwrap();
        assert_eq!(listing.page.items.len(), 1, "cached items are still served while the spec is not ready");
        let cached_at = listing.stale.get(&SpecKey::from("a")).expect("spec with no ready instance must be reported stale");
        assert!(*cached_at <= Utc::now());
    }

    #[test]
    fn resolve_tool_denies_access_to_a_tool_behind_an_invisible_spec() {
        let service = DiscoveryService::new(4);
        service.tools().publish(SpecKey::from("a"), vec![tool("secret", "a")], true);
        let mut specs = Map::new();
        let mut hidden = spec();
        hidden.tags = ["private"].into_iter().map(str::to_string).collect();
        specs.insert(SpecKey::from("a"), hidden);

        let mut caller = caller();
        caller.tags = ["public"].into_iter().map(str::to_string).collect();

        let err = service.resolve_tool("secret", &caller, &specs).unwrap_err();
        assert!(matches!(err, McpError::NotFound { .. }));
    }

    #[test]
    fn resolve_tool_succeeds_when_spec_is_visible() {
        let service = DiscoveryService::new(4);
        service.tools().publish(SpecKey::from("a"), vec![tool("t1", "a")], true);
        let mut specs = Map::new();
        specs.insert(SpecKey::from("a"), spec());

        let tool = service.resolve_tool("t1", &caller(), &specs).unwrap();
        assert_eq!(tool.name, "t1");
    }
}
