//! Translates one decoded JSON-RPC call into calls against the core
//! components: discovery for listings, the router for
//! `tools/call`/`resources/read`/`prompts/get`, wrapped end to end in the
//! governance chain.

use std::time::Duration;

use mcpv_protocol::jsonrpc::{JsonRpcRequest, JsonRpcResponse, RequestId};
use mcpv_protocol::McpError;
use mcpv_router::RouteOptions;
use mcpv_types::client::ClientEntry;
use mcpv_types::start_cause::StartCause;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::state::GatewayState;

/// Dispatch one already-authenticated JSON-RPC request on behalf of
/// `caller`, running it through the governance chain.
pub async fn dispatch(state: &GatewayState, caller: &ClientEntry, request: JsonRpcRequest) -> JsonRpcResponse {
    let id = request.id.clone();
    let method = request.method.clone();
    let request_json = serde_json::to_value(&request).unwrap_or(Value::Null);
    let caller = caller.clone();
    let state_for_next = state.clone();

    let outcome = state
        .governance
        .execute(&method, request_json, move |mutated| {
            let state = state_for_next.clone();
            let caller = caller.clone();
            async move { dispatch_method(&state, &caller, &method, mutated).await }
        })
        .await;

    match outcome {
        Ok(result) => JsonRpcResponse {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        },
        Err(err) => error_response(id, &err),
    }
}

async fn dispatch_method(state: &GatewayState, caller: &ClientEntry, method: &str, request: Value) -> Result<Value, McpError> {
    let params = request.get("params").cloned().unwrap_or(Value::Null);
    let snapshot = state.catalog.snapshot();

    match method {
        "ping" => Ok(json!({})),

        "tools/list" => {
            let cursor = params.get("cursor").and_then(Value::as_str);
            let ready_specs = ready_specs(state);
            let listing = state.discovery.list_tools(caller, &snapshot.specs, &ready_specs, cursor)?;
            Ok(json!({
                "etag": listing.etag,
                "tools": listing.page.items,
                "nextCursor": listing.page.next_cursor,
                "stale": stale_json(&listing.stale),
            }))
        }

        "resources/list" => {
            let cursor = params.get("cursor").and_then(Value::as_str);
            let ready_specs = ready_specs(state);
            let listing = state.discovery.list_resources(caller, &snapshot.specs, &ready_specs, cursor)?;
            Ok(json!({
                "etag": listing.etag,
                "resources": listing.page.items,
                "nextCursor": listing.page.next_cursor,
                "stale": stale_json(&listing.stale),
            }))
        }

        "prompts/list" => {
            let cursor = params.get("cursor").and_then(Value::as_str);
            let ready_specs = ready_specs(state);
            let listing = state.discovery.list_prompts(caller, &snapshot.specs, &ready_specs, cursor)?;
            Ok(json!({
                "etag": listing.etag,
                "prompts": listing.page.items,
                "nextCursor": listing.page.next_cursor,
                "stale": stale_json(&listing.stale),
            }))
        }

        "tools/call" => {
            let name = params
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| McpError::InvalidInput {
                    message: "tools/call requires params.name".to_string(),
                })?;
            let tool = state.discovery.resolve_tool(name, caller, &snapshot.specs)?;
            let routing_key = params.get("routingKey").and_then(Value::as_str).map(str::to_string);
            let downstream_params = json!({
                "name": name,
                "arguments": params.get("arguments").cloned().unwrap_or(Value::Null),
            });
            call_downstream(state, &tool.spec_key, caller, "tools/call", downstream_params, routing_key, &snapshot.runtime).await
        }

        "resources/read" => {
            let uri = params.get("uri").and_then(Value::as_str).ok_or_else(|| McpError::InvalidInput {
                message: "resources/read requires params.uri".to_string(),
            })?;
            let resource = state.discovery.resolve_resource(uri, caller, &snapshot.specs)?;
            let downstream_params = json!({"uri": uri});
            call_downstream(state, &resource.spec_key, caller, "resources/read", downstream_params, None, &snapshot.runtime).await
        }

        "prompts/get" => {
            let name = params.get("name").and_then(Value::as_str).ok_or_else(|| McpError::InvalidInput {
                message: "prompts/get requires params.name".to_string(),
            })?;
            let prompt = state.discovery.resolve_prompt(name, caller, &snapshot.specs)?;
            let downstream_params = json!({
                "name": name,
                "arguments": params.get("arguments").cloned().unwrap_or(Value::Null),
            });
            call_downstream(state, &prompt.spec_key, caller, "prompts/get", downstream_params, None, &snapshot.runtime).await
        }

        other => Err(McpError::MethodNotAllowed { method: other.to_string() }),
    }
}

async fn call_downstream(
    state: &GatewayState,
    spec_key: &mcpv_types::spec::SpecKey,
    caller: &ClientEntry,
    method: &str,
    params: Value,
    routing_key: Option<String>,
    runtime: &mcpv_types::RuntimeConfig,
) -> Result<Value, McpError> {
    let downstream_request = JsonRpcRequest::new(RequestId::String(Uuid::new_v4().to_string()), method, Some(params));
    let raw = serde_json::to_vec(&downstream_request).map_err(|e| McpError::InvalidInput { message: e.to_string() })?;

    let options = RouteOptions {
        routing_key,
        allow_start: true,
        timeout: Duration::from_secs(runtime.route_timeout_seconds),
        cause: StartCause::tool_call(caller.name.clone(), method.to_string()),
    };

    let response_bytes = state
        .router
        .route(spec_key, &raw, options)
        .await
        .map_err(|route_err| route_err.cause)?;

    let response: JsonRpcResponse = serde_json::from_slice(&response_bytes).map_err(|e| McpError::TransientTransport { message: e.to_string() })?;
    if let Some(error) = response.error {
        return Err(McpError::TransientTransport {
            message: format!("downstream error {}: {}", error.code, error.message),
        });
    }
    Ok(response.result.unwrap_or(Value::Null))
}

/// Specs with at least one `Ready` instance right now, used to decide which
/// listed items are being served live vs. from their cached fallback.
fn ready_specs(state: &GatewayState) -> std::collections::BTreeSet<mcpv_types::spec::SpecKey> {
    state
        .scheduler
        .get_pool_status()
        .into_iter()
        .filter(|pool| pool.ready > 0)
        .map(|pool| pool.spec_key)
        .collect()
}

/// `specKey -> CachedAt` as a JSON object, empty when nothing in the
/// listing is stale.
fn stale_json(stale: &std::collections::BTreeMap<mcpv_types::spec::SpecKey, chrono::DateTime<chrono::Utc>>) -> Value {
    json!(stale
        .iter()
        .map(|(spec_key, cached_at)| (spec_key.to_string(), cached_at.to_rfc3339()))
        .collect::<std::collections::BTreeMap<_, _>>())
}

fn error_response(id: RequestId, err: &McpError) -> JsonRpcResponse {
    JsonRpcResponse {
        jsonrpc: "2.0".to_string(),
        id,
        result: None,
        error: Some(mcpv_protocol::jsonrpc::JsonRpcError {
            code: -32000,
            message: err.to_string(),
            data: None,
        }),
    }
}
