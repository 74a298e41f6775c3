//! Boots a control plane in-process and serves it over HTTP.

use std::sync::Arc;

use anyhow::{Context, Result};
use mcpv::ControlPlane;
use mcpv_gateway::GatewayConfig;
use mcpv_telemetry::{Metrics, NoopMetrics, PrometheusMetrics};
use tracing::{info, warn};

use crate::cli::RunArgs;

/// Load the catalog at `args.catalog`, wire the control plane, start
/// background housekeeping, and serve the HTTP gateway on `args.addr`
/// until `Ctrl+C`.
pub async fn run(args: RunArgs) -> Result<()> {
    let metrics: Arc<dyn Metrics> = match &args.metrics_addr {
        Some(addr) => {
            let socket_addr: std::net::SocketAddr = addr.parse().with_context(|| format!("invalid metrics address {addr}"))?;
            metrics_exporter_prometheus::PrometheusBuilder::new()
                .with_http_listener(socket_addr)
                .install_recorder()
                .context("installing prometheus exporter")?;
            info!(addr = %addr, "prometheus metrics endpoint started");
            Arc::new(PrometheusMetrics)
        }
        None => Arc::new(NoopMetrics),
    };

    let plane = ControlPlane::bootstrap_with_metrics(&args.catalog, metrics)
        .await
        .with_context(|| format!("loading catalog at {}", args.catalog))?;

    let config = GatewayConfig {
        bearer_token: args.token.clone(),
        tls: None,
        cors_origins: args.cors_origin.clone(),
    };
    let state = plane.gateway_state(config);
    let app = mcpv_gateway::build_router(state);

    let running = plane.run(std::path::Path::new(&args.catalog)).context("starting catalog watcher")?;

    let listener = tokio::net::TcpListener::bind(&args.addr)
        .await
        .with_context(|| format!("binding {}", args.addr))?;
    info!(addr = %args.addr, "mcpv gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("gateway server error")?;

    running.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
    info!("shutdown signal received, draining pools");
}
