//! # mcpv
//!
//! The facade over every `mcpv-*` crate: a single [`ControlPlane`] that
//! loads a catalog, drives instance lifecycle and scheduling, routes and
//! discovers across the fleet, and enforces governance, wired the way
//! [`mcpv_gateway`] expects to find it.
//!
//! ```no_run
//! # async fn example() -> anyhow::Result<()> {
//! use mcpv::ControlPlane;
//!
//! let plane = ControlPlane::bootstrap("catalog.yaml").await?;
//! let running = plane.run(std::path::Path::new("catalog.yaml"))?;
//! // ... serve a gateway over `running.plane.gateway_state(..)` ...
//! running.shutdown().await;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod capability_sync;
pub mod control_plane;

pub use control_plane::{ControlPlane, RunningControlPlane};

/// Everything most binaries embedding `mcpv` need, in one `use`.
pub mod prelude {
    pub use crate::{ControlPlane, RunningControlPlane};

    pub use mcpv_catalog::{CatalogError, CatalogProvider, CatalogResult, ReloadSource};
    pub use mcpv_discovery::DiscoveryService;
    pub use mcpv_gateway::{dispatch, GatewayConfig, GatewayState, TaskRegistry, TlsConfig};
    pub use mcpv_governance::{GovernanceChain, GovernancePolicy};
    pub use mcpv_registry::ClientRegistry;
    pub use mcpv_router::{Router, RouteError};
    pub use mcpv_runtime::{InitCoordinator, InstanceLifecycleManager, Scheduler};
    pub use mcpv_telemetry::{LogBus, Metrics, NoopMetrics, PrometheusMetrics};
    pub use mcpv_types::{
        CatalogDiff, CatalogState, ClientEntry, Instance, InstanceState, PromptItem, ResourceItem,
        RuntimeConfig, ServerSpec, Snapshot, SpecKey, ToolItem,
    };
}
