//! The streamable-HTTP gateway surface: client lifecycle, RPC dispatch,
//! status endpoints, and catalog/reload operator actions.

use std::collections::BTreeSet;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::middleware;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Json;
use axum::Router as AxumRouter;
use futures::stream::{Stream, StreamExt};
use mcpv_catalog::ReloadSource;
use mcpv_protocol::jsonrpc::{JsonRpcRequest, RequestId};
use mcpv_protocol::McpError;
use mcpv_types::spec::SpecKey;
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::auth::require_bearer_unless_loopback;
use crate::dispatch::dispatch;
use crate::error::GatewayError;
use crate::state::GatewayState;

/// Build the full gateway router: RPC dispatch, client lifecycle, status,
/// and operator endpoints, wrapped in CORS and bearer-token middleware.
#[must_use]
pub fn build_router(state: GatewayState) -> AxumRouter {
    let cors = build_cors_layer(&state.config.cors_origins);

    AxumRouter::new()
        .route("/rpc/:client", post(rpc))
        .route("/clients", post(register_client))
        .route("/clients/:name", axum::routing::delete(unregister_client))
        .route("/clients/:name/heartbeat", post(heartbeat))
        .route("/clients", get(list_clients))
        .route("/status/pools", get(pool_status))
        .route("/status/servers", get(server_status))
        .route("/catalog/reload", post(reload_catalog))
        .route("/catalog/retry/:spec", post(retry_spec))
        .route("/tasks/:id", get(get_task))
        .route("/tasks/:id/stream", get(stream_task))
        .layer(middleware::from_fn_with_state(state.clone(), require_bearer_unless_loopback))
        .layer(cors)
        .with_state(state)
}

fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::new();
    }
    let parsed: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
    CorsLayer::new().allow_origin(AllowOrigin::list(parsed))
}

#[derive(Debug, Deserialize)]
struct RegisterBody {
    name: String,
    pid: Option<u32>,
    #[serde(default)]
    tags: BTreeSet<String>,
    explicit_server: Option<String>,
}

async fn register_client(State(state): State<GatewayState>, Json(body): Json<RegisterBody>) -> Result<Json<Value>, GatewayError> {
    let explicit_server = body.explicit_server.map(SpecKey::from);
    let entry = state
        .registry
        .register(body.name, body.pid, body.tags, explicit_server)
        .map_err(|_| GatewayError::InvalidBody("tags and explicitServer are mutually exclusive".to_string()))?;
    Ok(Json(json!({ "name": entry.name })))
}

async fn unregister_client(State(state): State<GatewayState>, Path(name): Path<String>) -> Result<StatusCode, GatewayError> {
    state.registry.unregister(&name).map_err(|_| GatewayError::UnknownClient(name))?;
    Ok(StatusCode::NO_CONTENT)
}

async fn heartbeat(State(state): State<GatewayState>, Path(name): Path<String>) -> Result<StatusCode, GatewayError> {
    state.registry.heartbeat(&name).map_err(|_| GatewayError::UnknownClient(name))?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_clients(State(state): State<GatewayState>) -> Json<Value> {
    Json(json!({ "clients": state.registry.list() }))
}

async fn pool_status(State(state): State<GatewayState>) -> Json<Value> {
    Json(json!({ "pools": state.scheduler.get_pool_status() }))
}

async fn server_status(State(state): State<GatewayState>) -> Json<Value> {
    Json(json!({ "servers": state.init_coordinator.statuses() }))
}

async fn reload_catalog(State(state): State<GatewayState>) -> Result<Json<Value>, GatewayError> {
    let diff = state
        .catalog
        .reload(ReloadSource::Manual)
        .await
        .map_err(|e| GatewayError::InvalidBody(e.to_string()))?;
    match diff {
        Some(diff) => {
            let snapshot = state.catalog.snapshot();
            state.scheduler.apply_catalog_diff(&diff, &snapshot.specs).await;
            state.init_coordinator.apply_catalog_state(&snapshot.specs, &snapshot.runtime);
            Ok(Json(json!({
                "revision": snapshot.revision,
                "added": diff.added,
                "removed": diff.removed,
                "changed": diff.changed.keys().collect::<Vec<_>>(),
            })))
        }
        None => Ok(Json(json!({ "changed": false }))),
    }
}

async fn retry_spec(State(state): State<GatewayState>, Path(spec): Path<String>) -> Result<StatusCode, GatewayError> {
    let spec_key = SpecKey::from(spec.clone());
    let snapshot = state.catalog.snapshot();
    let server_name = snapshot
        .specs
        .get(&spec_key)
        .map(|s| s.name.clone())
        .ok_or_else(|| GatewayError::Mcp(McpError::not_found("spec", &spec)))?;
    state.init_coordinator.retry_spec(&spec_key, &server_name);
    Ok(StatusCode::ACCEPTED)
}

#[derive(Debug, Deserialize)]
struct RpcBody {
    id: Option<RequestId>,
    method: String,
    #[serde(default)]
    params: Option<Value>,
}

async fn rpc(State(state): State<GatewayState>, Path(client): Path<String>, Json(body): Json<RpcBody>) -> Result<Json<Value>, GatewayError> {
    let caller = state.registry.get(&client).ok_or_else(|| GatewayError::UnknownClient(client.clone()))?;
    let id = body.id.unwrap_or(RequestId::Number(0));
    let request = JsonRpcRequest::new(id, body.method, body.params);
    let response = dispatch(&state, &caller, request).await;
    Ok(Json(serde_json::to_value(response).unwrap_or(Value::Null)))
}

async fn get_task(State(state): State<GatewayState>, Path(id): Path<String>) -> Result<Json<Value>, GatewayError> {
    let record = state.tasks.get(&id).ok_or_else(|| GatewayError::Mcp(McpError::not_found("task", &id)))?;
    Ok(Json(serde_json::to_value(record).unwrap_or(Value::Null)))
}

async fn stream_task(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, std::convert::Infallible>>>, GatewayError> {
    let receiver = state.tasks.subscribe(&id).ok_or_else(|| GatewayError::Mcp(McpError::not_found("task", &id)))?;
    let stream = tokio_stream::wrappers::BroadcastStream::new(receiver).filter_map(|event| async move {
        match event {
            Ok(event) => serde_json::to_string(&task_event_payload(&event)).ok().map(|data| Ok(Event::default().data(data))),
            Err(_) => None,
        }
    });
    Ok(Sse::new(Box::pin(stream)).keep_alive(KeepAlive::default()))
}

fn task_event_payload(event: &crate::tasks::TaskEvent) -> Value {
    match event {
        crate::tasks::TaskEvent::Log(line) => json!({ "kind": "log", "at": line.at, "message": line.message }),
        crate::tasks::TaskEvent::StatusChanged(status) => json!({ "kind": "status", "status": status }),
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}
