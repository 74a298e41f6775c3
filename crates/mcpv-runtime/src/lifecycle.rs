//! The instance lifecycle manager.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use mcpv_protocol::jsonrpc::{JsonRpcRequest, JsonRpcResponse, RequestId};
use mcpv_protocol::{AllowedMethods, InitializeParams, InitializeResult};
use mcpv_telemetry::Metrics;
use mcpv_transport::traits::Conn;
use mcpv_transport::{adapters, TransportError};
use mcpv_types::instance::{Capabilities, Instance};
use mcpv_types::spec::{ServerSpec, SpecKey};
use mcpv_types::start_cause::StartCause;
use mcpv_types::PROTOCOL_VERSION;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::timeout;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{RuntimeError, RuntimeResult};

/// Sub-deadline for the `initialize` request/response round trip.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

type StopFn = Box<dyn FnOnce() -> futures::future::BoxFuture<'static, ()> + Send>;

struct RegisteredConn {
    conn: Arc<dyn Conn>,
    stop: AsyncMutex<Option<StopFn>>,
}

/// Drives a downstream server through connect -> handshake -> `Ready`, and
/// owns the `(conn, stop)` pair for every instance it starts.
pub struct InstanceLifecycleManager {
    registry: DashMap<String, RegisteredConn>,
    metrics: Arc<dyn Metrics>,
}

impl InstanceLifecycleManager {
    /// Construct a manager reporting through `metrics`.
    #[must_use]
    pub fn new(metrics: Arc<dyn Metrics>) -> Self {
        Self {
            registry: DashMap::new(),
            metrics,
        }
    }

    /// Start a new instance of `spec`.
    ///
    /// `startup_deadline` bounds the whole sequence; the long-lived
    /// instance itself is not tied to the caller's context once started —
    /// only this call is.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Transport`] wrapping a fatal or transient
    /// [`TransportError`], [`RuntimeError::UnsupportedProtocol`], or
    /// [`RuntimeError::MalformedHandshake`].
    pub async fn start_instance(
        &self,
        spec_key: &SpecKey,
        spec: &ServerSpec,
        cause: StartCause,
        initialize_retry_count: u32,
        startup_deadline: Duration,
    ) -> RuntimeResult<(Instance, AllowedMethods)> {
        let start = std::time::Instant::now();
        let result = timeout(
            startup_deadline,
            self.start_instance_inner(spec_key, spec, cause, initialize_retry_count),
        )
        .await;

        let outcome = match result {
            Ok(inner) => inner,
            Err(_) => Err(RuntimeError::Transport(TransportError::Timeout {
                operation: "instance startup".to_string(),
            })),
        };

        self.metrics
            .observe_instance_start(spec_key.as_str(), outcome.is_ok(), start.elapsed());
        outcome
    }

    async fn start_instance_inner(
        &self,
        spec_key: &SpecKey,
        spec: &ServerSpec,
        cause: StartCause,
        initialize_retry_count: u32,
    ) -> RuntimeResult<(Instance, AllowedMethods)> {
        // Step 1: ask the transport adapter to connect.
        let transport = adapters::for_spec(spec);
        let connected = transport.connect(spec).await?;
        let conn: Arc<dyn Conn> = Arc::from(connected.conn);
        let stop = connected.stop;

        // Step 2: reject unsupported protocol versions before spending a
        // round trip on the handshake.
        if !mcpv_types::SUPPORTED_PROTOCOL_VERSIONS.contains(&spec.protocol_version.as_str()) {
            conn.close().await;
            stop().await;
            return Err(RuntimeError::UnsupportedProtocol {
                got: spec.protocol_version.clone(),
                expected: mcpv_types::SUPPORTED_PROTOCOL_VERSIONS
                    .iter()
                    .map(|s| (*s).to_string())
                    .collect(),
            });
        }

        // Step 3: send `initialize`, retrying transient send/recv failures
        // up to `initialize_retry_count` times.
        let params = InitializeParams::for_protocol_version(PROTOCOL_VERSION);
        let request = JsonRpcRequest::new(
            RequestId::String(Uuid::new_v4().to_string()),
            "initialize",
            Some(serde_json::to_value(&params).unwrap_or_default()),
        );
        let payload = serde_json::to_vec(&request)
            .map_err(|e| RuntimeError::MalformedHandshake(e.to_string()))?;

        let mut last_err = None;
        let mut response_bytes = None;
        for attempt in 0..=initialize_retry_count {
            match conn.call(payload.clone(), HANDSHAKE_TIMEOUT).await {
                Ok(bytes) => {
                    response_bytes = Some(bytes);
                    break;
                }
                Err(err) => {
                    warn!(spec_key = %spec_key, attempt, error = %err, "initialize attempt failed");
                    last_err = Some(err);
                }
            }
        }
        let Some(response_bytes) = response_bytes else {
            conn.close().await;
            stop().await;
            return Err(RuntimeError::Transport(
                last_err.unwrap_or(TransportError::ConnClosed),
            ));
        };

        let response: JsonRpcResponse = serde_json::from_slice(&response_bytes)
            .map_err(|e| RuntimeError::MalformedHandshake(e.to_string()))?;
        let Some(result_value) = response.result else {
            conn.close().await;
            stop().await;
            let message = response
                .error
                .map(|e| e.message)
                .unwrap_or_else(|| "initialize returned no result".to_string());
            return Err(RuntimeError::MalformedHandshake(message));
        };
        let result: InitializeResult = serde_json::from_value(result_value)
            .map_err(|e| RuntimeError::MalformedHandshake(e.to_string()))?;

        // Step 4: validate the result.
        if !result.is_structurally_valid() {
            conn.close().await;
            stop().await;
            return Err(RuntimeError::MalformedHandshake(
                "missing serverInfo.name or capabilities".to_string(),
            ));
        }
        if result.protocol_version != spec.protocol_version {
            conn.close().await;
            stop().await;
            return Err(RuntimeError::UnsupportedProtocol {
                got: result.protocol_version,
                expected: vec![spec.protocol_version.clone()],
            });
        }

        let allowed_methods = AllowedMethods::from_capabilities(&result.capabilities);
        let capabilities = Capabilities {
            server_name: result.server_info.name.clone(),
            server_version: result.server_info.version.clone(),
            raw: result.capabilities,
        };

        // Step 5: create the instance and register (conn, stop).
        let now = Utc::now();
        let id = Uuid::new_v4().to_string();
        let mut instance = Instance::starting(id.clone(), spec_key.clone(), cause, now);
        instance.state = mcpv_types::InstanceState::Ready;
        instance.capabilities = Some(capabilities);
        instance.handshake_at = Some(now);
        instance.last_heartbeat_at = Some(now);

        self.registry.insert(
            id,
            RegisteredConn {
                conn,
                stop: AsyncMutex::new(Some(stop)),
            },
        );

        info!(spec_key = %spec_key, instance_id = %instance.id, "instance ready");
        Ok((instance, allowed_methods))
    }

    /// Look up the live [`Conn`] for a running instance, used by the
    /// router's `Call` stage.
    #[must_use]
    pub fn conn_for(&self, instance_id: &str) -> Option<Arc<dyn Conn>> {
        self.registry.get(instance_id).map(|entry| entry.conn.clone())
    }

    /// Idempotently stop an instance: remove it from the registry, close
    /// the conn, and invoke its stop callback.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::UnknownInstance`] if `instance_id` is not
    /// currently registered (including a second call for an instance
    /// already stopped — idempotent at the registry level, not
    /// no-op-on-repeat).
    pub async fn stop_instance(&self, instance_id: &str) -> RuntimeResult<()> {
        let (_, entry) = self
            .registry
            .remove(instance_id)
            .ok_or_else(|| RuntimeError::UnknownInstance(instance_id.to_string()))?;
        entry.conn.close().await;
        if let Some(stop) = entry.stop.lock().await.take() {
            stop().await;
        }
        Ok(())
    }
}
