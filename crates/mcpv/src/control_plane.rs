//! The top-level facade: wires catalog -> runtime -> router/discovery ->
//! governance into one handle, mirroring the reference SDK's
//! `ServerBuilder`/`Server` split.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use mcpv_catalog::{watch_catalog_file, CatalogProvider, CatalogResult, ReloadSource};
use mcpv_discovery::DiscoveryService;
use mcpv_gateway::{GatewayConfig, GatewayState, TaskRegistry};
use mcpv_governance::GovernanceChain;
use mcpv_registry::ClientRegistry;
use mcpv_router::Router;
use mcpv_runtime::{InitCoordinator, InstanceLifecycleManager, Scheduler};
use mcpv_telemetry::{LogBus, Metrics, NoopMetrics};
use notify_debouncer_mini::Debouncer;
use tracing::{info, warn};

use crate::capability_sync;

const IDLE_SWEEP_INTERVAL: Duration = Duration::from_secs(5);
const PING_SWEEP_INTERVAL: Duration = Duration::from_secs(15);

/// The assembled core, independent of whichever
/// gateway surface (HTTP, stdio) ends up fronting it. Cheaply `Clone`able —
/// every field is an `Arc`.
#[derive(Clone)]
pub struct ControlPlane {
    /// The catalog provider.
    pub catalog: Arc<CatalogProvider>,
    /// The instance lifecycle manager.
    pub lifecycle: Arc<InstanceLifecycleManager>,
    /// The scheduler.
    pub scheduler: Arc<Scheduler>,
    /// The server-init coordinator.
    pub init_coordinator: Arc<InitCoordinator>,
    /// The router.
    pub router: Arc<Router>,
    /// Federated discovery.
    pub discovery: Arc<DiscoveryService>,
    /// The active-caller registry.
    pub registry: Arc<ClientRegistry>,
    /// The governance chain, initially empty; callers add
    /// policies before serving traffic.
    pub governance: GovernanceChain,
    /// The metrics sink.
    pub metrics: Arc<dyn Metrics>,
    /// The structured log fan-out bus.
    pub logs: Arc<LogBus>,
    /// Long-running task tracking, shared across every gateway surface this
    /// process hosts.
    pub tasks: TaskRegistry,
}

/// Handle returned by [`ControlPlane::bootstrap`]: owns the background
/// tasks (catalog watcher, idle/ping sweeps, catalog-update propagation) so
/// dropping it stops them.
pub struct RunningControlPlane {
    /// The assembled core.
    pub plane: ControlPlane,
    _watcher: Option<Debouncer<notify::RecommendedWatcher>>,
    propagate_handle: tokio::task::JoinHandle<()>,
    idle_handle: tokio::task::JoinHandle<()>,
    ping_handle: tokio::task::JoinHandle<()>,
}

impl ControlPlane {
    /// Load the catalog at `path` and wire every component together, with a
    /// `noop` metrics sink and an empty governance chain. Callers typically
    /// follow this with [`ControlPlane::with_governance`] before calling
    /// [`ControlPlane::run`]; use [`ControlPlane::bootstrap_with_metrics`]
    /// instead of this constructor to wire a real metrics sink.
    ///
    /// # Errors
    ///
    /// Returns the catalog loader's error if the initial load fails.
    pub async fn bootstrap(path: impl AsRef<Path>) -> CatalogResult<Self> {
        Self::bootstrap_with_metrics(path, Arc::new(NoopMetrics)).await
    }

    /// As [`ControlPlane::bootstrap`], but with an explicit metrics sink.
    ///
    /// # Errors
    ///
    /// Returns the catalog loader's error if the initial load fails.
    pub async fn bootstrap_with_metrics(path: impl AsRef<Path>, metrics: Arc<dyn Metrics>) -> CatalogResult<Self> {
        let catalog = Arc::new(CatalogProvider::load(path.as_ref().to_path_buf())?);
        let snapshot = catalog.snapshot();

        let lifecycle = Arc::new(InstanceLifecycleManager::new(metrics.clone()));
        let scheduler = Arc::new(Scheduler::new(
            lifecycle.clone(),
            metrics.clone(),
            snapshot.runtime.initialize_retry_count,
        ));
        let init_coordinator = Arc::new(InitCoordinator::new(scheduler.clone()));
        let router = Arc::new(Router::new(scheduler.clone(), lifecycle.clone(), metrics.clone()));
        let discovery = Arc::new(DiscoveryService::new(64));
        let registry = Arc::new(ClientRegistry::new(64));
        let logs = Arc::new(LogBus::new(1024));

        scheduler.set_ready_hook(capability_sync::ready_hook(lifecycle.clone(), router.clone(), discovery.clone()));

        let bootstrap_diff = mcpv_types::catalog::CatalogDiff {
            added: snapshot.specs.keys().cloned().collect(),
            removed: Vec::new(),
            changed: std::collections::BTreeMap::new(),
            tags_changed: false,
            runtime_changed: false,
        };
        scheduler.apply_catalog_diff(&bootstrap_diff, &snapshot.specs).await;
        init_coordinator.apply_catalog_state(&snapshot.specs, &snapshot.runtime);

        Ok(Self {
            catalog,
            lifecycle,
            scheduler,
            init_coordinator,
            router,
            discovery,
            registry,
            governance: GovernanceChain::new(Vec::new()),
            metrics,
            logs,
            tasks: TaskRegistry::new(),
        })
    }

    /// Replace the governance chain.
    #[must_use]
    pub fn with_governance(mut self, governance: GovernanceChain) -> Self {
        self.governance = governance;
        self
    }

    /// Build a [`GatewayState`] for an HTTP or stdio surface over this core,
    /// applying the given surface-specific `config`.
    /// Every field is shared, so multiple surfaces (e.g. HTTP and stdio in
    /// the same process) can each call this and still see one task
    /// registry, one scheduler, one catalog.
    #[must_use]
    pub fn gateway_state(&self, config: GatewayConfig) -> GatewayState {
        GatewayState {
            catalog: self.catalog.clone(),
            scheduler: self.scheduler.clone(),
            init_coordinator: self.init_coordinator.clone(),
            router: self.router.clone(),
            discovery: self.discovery.clone(),
            registry: self.registry.clone(),
            governance: self.governance.clone(),
            metrics: self.metrics.clone(),
            tasks: self.tasks.clone(),
            config,
        }
    }

    /// Start background housekeeping — the idle sweep, the ping sweep, the
    /// catalog file watcher, and the task that propagates catalog updates
    /// into the scheduler and init coordinator — and return a handle that
    /// keeps them alive.
    ///
    /// # Errors
    ///
    /// Returns the file watcher's error if it cannot be installed; the
    /// control plane still functions without it (manual `reload` keeps
    /// working), so callers may choose to log and continue.
    pub fn run(self, catalog_path: &Path) -> notify::Result<RunningControlPlane> {
        let watcher = match watch_catalog_file(self.catalog.clone(), catalog_path) {
            Ok(watcher) => Some(watcher),
            Err(err) => {
                warn!(error = %err, "catalog file watcher unavailable; manual reload still works");
                None
            }
        };

        let idle_handle = tokio::spawn(self.scheduler.clone().run_idle_manager(IDLE_SWEEP_INTERVAL));
        let ping_handle = tokio::spawn(self.scheduler.clone().run_ping_manager(PING_SWEEP_INTERVAL));
        let propagate_handle = tokio::spawn(propagate_catalog_updates(self.clone()));

        Ok(RunningControlPlane {
            plane: self,
            _watcher: watcher,
            propagate_handle,
            idle_handle,
            ping_handle,
        })
    }

    /// Trigger a manual reload.
    ///
    /// # Errors
    ///
    /// Propagates the loader's parse/validate error; the previous snapshot
    /// remains live.
    pub async fn reload(&self) -> CatalogResult<()> {
        let outcome = self.catalog.reload(ReloadSource::Manual).await;
        match &outcome {
            Ok(Some(_)) => self.metrics.incr_reload_success(),
            Ok(None) => {}
            Err(_) => self.metrics.incr_reload_failure(),
        }
        if let Some(diff) = outcome? {
            self.apply_diff(&diff).await;
        }
        Ok(())
    }
}

async fn propagate_catalog_updates(plane: ControlPlane) {
    let mut updates = plane.catalog.watch().await;
    while let Some(update) = updates.recv().await {
        info!(revision = update.snapshot.revision, source = ?update.source, "catalog update received");
        plane.apply_diff(&update.diff).await;
    }
}

impl ControlPlane {
    async fn apply_diff(&self, diff: &mcpv_types::catalog::CatalogDiff) {
        // `Scheduler::apply_catalog_diff` already reports restart-required
        // changes to `metrics`; nothing further to attribute here.
        let snapshot = self.catalog.snapshot();
        self.scheduler.apply_catalog_diff(diff, &snapshot.specs).await;
        self.init_coordinator.apply_catalog_state(&snapshot.specs, &snapshot.runtime);
    }
}

impl RunningControlPlane {
    /// Stop every pool and tear down background tasks.
    pub async fn shutdown(self) {
        self.idle_handle.abort();
        self.ping_handle.abort();
        self.propagate_handle.abort();
        self.plane.scheduler.stop_all().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcpv_types::spec::SpecKey;
    use std::io::Write;

    const CATALOG: &str = r#"
servers:
  - name: a
    transport: stdio
    command: demo
    protocol_version: "2025-11-25"
    max_concurrent: 1
  - name: b
    transport: stdio
    command: demo
    protocol_version: "2025-11-25"
    max_concurrent: 1
"#;

    fn write_catalog(dir: &tempfile::TempDir, body: &str) -> std::path::PathBuf {
        let path = dir.path().join("catalog.yaml");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(body.as_bytes()).unwrap();
        path
    }

    #[tokio::test]
    async fn bootstrap_creates_one_pool_per_catalog_spec() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_catalog(&dir, CATALOG);

        let plane = ControlPlane::bootstrap(&path).await.unwrap();

        let mut keys: Vec<_> = plane.scheduler.get_pool_status().into_iter().map(|p| p.spec_key).collect();
        keys.sort();
        assert_eq!(keys, vec![SpecKey::from("a"), SpecKey::from("b")]);
        assert!(plane.governance.is_empty());
    }

    #[tokio::test]
    async fn reload_with_unchanged_file_does_not_touch_metrics() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_catalog(&dir, CATALOG);
        let plane = ControlPlane::bootstrap(&path).await.unwrap();

        plane.reload().await.unwrap();
        assert_eq!(plane.catalog.snapshot().revision, 1);
    }

    #[tokio::test]
    async fn reload_after_file_change_adds_a_new_pool() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_catalog(&dir, CATALOG);
        let plane = ControlPlane::bootstrap(&path).await.unwrap();

        std::fs::write(
            &path,
            r#"
servers:
  - name: a
    transport: stdio
    command: demo
    protocol_version: "2025-11-25"
    max_concurrent: 1
  - name: b
    transport: stdio
    command: demo
    protocol_version: "2025-11-25"
    max_concurrent: 1
  - name: c
    transport: stdio
    command: demo
    protocol_version: "2025-11-25"
    max_concurrent: 1
"#,
        )
        .unwrap();

        plane.reload().await.unwrap();

        let keys: std::collections::BTreeSet<_> = plane.scheduler.get_pool_status().into_iter().map(|p| p.spec_key).collect();
        assert!(keys.contains(&SpecKey::from("c")));
    }
}
