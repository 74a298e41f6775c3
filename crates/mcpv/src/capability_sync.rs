//! Bridges scheduler instance-ready events into the router's capability
//! cache and discovery's per-server snapshots.
//!
//! The scheduler owns instance lifecycle only; it has no notion of "what
//! tools does this instance expose" — avoiding an ambient global for that
//! means passing what callbacks need as explicit arguments instead. Wiring
//! that knowledge into the router and discovery service without either
//! depending on the scheduler is exactly what [`mcpv_runtime::ReadyHook`]
//! is for.

use std::sync::Arc;
use std::time::Duration;

use mcpv_discovery::DiscoveryService;
use mcpv_protocol::jsonrpc::{JsonRpcRequest, JsonRpcResponse, RequestId};
use mcpv_router::Router;
use mcpv_runtime::{InstanceLifecycleManager, ReadyHook};
use mcpv_types::instance::Instance;
use mcpv_types::snapshot::{PromptItem, ResourceItem, ToolItem};
use mcpv_types::spec::SpecKey;
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

const REFRESH_TIMEOUT: Duration = Duration::from_secs(5);

/// Build the [`ReadyHook`] the scheduler invokes right after each
/// successful instance start: record the handshake-derived method
/// allow-list on the router, then fetch and publish this server's
/// tool/resource/prompt snapshot into discovery.
///
/// Runs the three listing calls directly against the instance's own `Conn`
/// rather than through the router, since the caller that triggered this
/// start already holds the instance via its own `Acquire`; going through
/// the router again would double-count against `maxConcurrent`.
#[must_use]
pub fn ready_hook(lifecycle: Arc<InstanceLifecycleManager>, router: Arc<Router>, discovery: Arc<DiscoveryService>) -> ReadyHook {
    Arc::new(move |spec_key, allowed, instance| {
        router.record_capabilities(spec_key.clone(), allowed);

        let lifecycle = lifecycle.clone();
        let discovery = discovery.clone();
        tokio::spawn(async move {
            refresh_snapshot(&lifecycle, &discovery, &spec_key, &instance).await;
        });
    })
}

async fn refresh_snapshot(lifecycle: &InstanceLifecycleManager, discovery: &DiscoveryService, spec_key: &SpecKey, instance: &Instance) {
    let server_name = instance
        .capabilities
        .as_ref()
        .map(|c| c.server_name.clone())
        .unwrap_or_else(|| spec_key.to_string());

    let tools = fetch_listing(lifecycle, instance, "tools/list", "tools").await;
    discovery.tools().publish(
        spec_key.clone(),
        tools.into_iter().filter_map(|v| tool_item(spec_key, &server_name, v)).collect(),
        true,
    );

    let resources = fetch_listing(lifecycle, instance, "resources/list", "resources").await;
    discovery.resources().publish(
        spec_key.clone(),
        resources
            .into_iter()
            .filter_map(|v| resource_item(spec_key, &server_name, v))
            .collect(),
        true,
    );

    let prompts = fetch_listing(lifecycle, instance, "prompts/list", "prompts").await;
    discovery.prompts().publish(
        spec_key.clone(),
        prompts.into_iter().filter_map(|v| prompt_item(spec_key, &server_name, v)).collect(),
        true,
    );
}

async fn fetch_listing(lifecycle: &InstanceLifecycleManager, instance: &Instance, method: &str, items_key: &str) -> Vec<Value> {
    let Some(conn) = lifecycle.conn_for(&instance.id) else {
        return Vec::new();
    };
    let request = JsonRpcRequest::new(RequestId::String(Uuid::new_v4().to_string()), method, None);
    let Ok(payload) = serde_json::to_vec(&request) else {
        return Vec::new();
    };
    let response = match conn.call(payload, REFRESH_TIMEOUT).await {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(instance_id = %instance.id, method, error = %err, "capability snapshot refresh failed");
            return Vec::new();
        }
    };
    let Ok(decoded) = JsonRpcResponse::from_bytes(&response) else {
        return Vec::new();
    };
    decoded
        .result
        .and_then(|v| v.get(items_key).cloned())
        .and_then(|v| v.as_array().cloned())
        .unwrap_or_default()
}

fn tool_item(spec_key: &SpecKey, server_name: &str, raw: Value) -> Option<ToolItem> {
    let name = raw.get("name")?.as_str()?.to_string();
    Some(ToolItem {
        name,
        spec_key: spec_key.clone(),
        server_name: server_name.to_string(),
        definition: raw,
    })
}

fn resource_item(spec_key: &SpecKey, server_name: &str, raw: Value) -> Option<ResourceItem> {
    let uri = raw.get("uri")?.as_str()?.to_string();
    Some(ResourceItem {
        uri,
        spec_key: spec_key.clone(),
        server_name: server_name.to_string(),
        definition: raw,
    })
}

fn prompt_item(spec_key: &SpecKey, server_name: &str, raw: Value) -> Option<PromptItem> {
    let name = raw.get("name")?.as_str()?.to_string();
    Some(PromptItem {
        name,
        spec_key: spec_key.clone(),
        server_name: server_name.to_string(),
        definition: raw,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tool_item_requires_a_name_field() {
        let key = SpecKey::from("a");
        assert!(tool_item(&key, "a", json!({"name": "add"})).is_some());
        assert!(tool_item(&key, "a", json!({"description": "no name"})).is_none());
    }

    #[test]
    fn resource_item_requires_a_uri_field() {
        let key = SpecKey::from("a");
        let item = resource_item(&key, "a", json!({"uri": "file:///x"})).unwrap();
        assert_eq!(item.uri, "file:///x");
        assert!(resource_item(&key, "a", json!({})).is_none());
    }

    #[test]
    fn prompt_item_requires_a_name_field() {
        let key = SpecKey::from("a");
        assert!(prompt_item(&key, "a", json!({"name": "greet"})).is_some());
        assert!(prompt_item(&key, "a", json!({})).is_none());
    }
}
