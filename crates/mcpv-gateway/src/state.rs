//! Shared state handed to every gateway entry point: the assembled core
//! (catalog, scheduler, init coordinator, router, discovery, registry,
//! governance) plus the gateway's own auth/CORS configuration.

use std::net::IpAddr;
use std::sync::Arc;

use mcpv_catalog::CatalogProvider;
use mcpv_discovery::DiscoveryService;
use mcpv_governance::GovernanceChain;
use mcpv_registry::ClientRegistry;
use mcpv_router::Router;
use mcpv_runtime::{InitCoordinator, Scheduler};
use mcpv_telemetry::Metrics;

use crate::tasks::TaskRegistry;

/// TLS material for the HTTP listener, required when TLS is enabled.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// Path to the PEM certificate chain.
    pub cert_path: String,
    /// Path to the PEM private key.
    pub key_path: String,
}

/// Gateway-level configuration, distinct from [`mcpv_types::RuntimeConfig`]
/// which governs the core.
#[derive(Debug, Clone, Default)]
pub struct GatewayConfig {
    /// Bearer token required on non-loopback requests. `None` means the
    /// gateway is unauthenticated (only sane for loopback-only binds).
    pub bearer_token: Option<String>,
    /// TLS cert+key, if the HTTP listener terminates TLS itself.
    pub tls: Option<TlsConfig>,
    /// Explicit allow-list of CORS origins.
    pub cors_origins: Vec<String>,
}

impl GatewayConfig {
    /// Whether a request from `peer` may skip bearer-token auth.
    #[must_use]
    pub fn is_loopback(peer: IpAddr) -> bool {
        peer.is_loopback()
    }

    /// Whether `presented` satisfies this gateway's bearer requirement.
    #[must_use]
    pub fn accepts_token(&self, presented: Option<&str>) -> bool {
        match &self.bearer_token {
            None => true,
            Some(expected) => presented == Some(expected.as_str()),
        }
    }
}

/// Everything a gateway handler needs: the assembled core plus this
/// surface's own config. Cheaply `Clone`able — every field is an `Arc` or a
/// small value type, injected rather than reached for as an ambient global.
#[derive(Clone)]
pub struct GatewayState {
    /// The catalog provider.
    pub catalog: Arc<CatalogProvider>,
    /// The scheduler.
    pub scheduler: Arc<Scheduler>,
    /// The server-init coordinator.
    pub init_coordinator: Arc<InitCoordinator>,
    /// The router.
    pub router: Arc<Router>,
    /// Federated discovery.
    pub discovery: Arc<DiscoveryService>,
    /// Active-caller registry.
    pub registry: Arc<ClientRegistry>,
    /// The governance chain wrapping every client-facing method.
    pub governance: GovernanceChain,
    /// Metrics sink.
    pub metrics: Arc<dyn Metrics>,
    /// Long-running task tracking, for the task/log streaming endpoints.
    pub tasks: TaskRegistry,
    /// This gateway surface's own configuration.
    pub config: GatewayConfig,
}
