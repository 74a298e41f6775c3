//! CLI argument parsing.

use clap::{Args, Parser, Subcommand};

/// Operator CLI for an `mcpv` control plane.
#[derive(Parser, Debug)]
#[command(name = "mcpv", version, about = "Operate an mcpv control plane: inspect pool/server status, reload the catalog, retry a failed spec, or run the gateway.")]
pub struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print current pool occupancy for every spec.
    Status(Connection),
    /// Print per-server init status (pending/backoff/ready/failed).
    Servers(Connection),
    /// Trigger a manual catalog reload.
    Reload(Connection),
    /// Retry a spec stuck in backoff or failed.
    Retry {
        #[command(flatten)]
        conn: Connection,
        /// The spec key to retry, as it appears in the catalog file.
        spec: String,
    },
    /// Boot a control plane from a catalog file and serve the gateway.
    Run(RunArgs),
}

/// Connection details for talking to a running gateway.
#[derive(Args, Debug, Clone)]
pub struct Connection {
    /// Base URL of the gateway's HTTP surface.
    #[arg(long, env = "MCPV_GATEWAY_URL", default_value = "http://127.0.0.1:8787")]
    pub url: String,
    /// Bearer token, if the gateway requires one.
    #[arg(long, env = "MCPV_TOKEN")]
    pub token: Option<String>,
    /// Emit raw JSON instead of a formatted table.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for booting a control plane in-process.
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Path to the catalog YAML file.
    #[arg(long, default_value = "catalog.yaml")]
    pub catalog: String,
    /// Address to bind the HTTP gateway on.
    #[arg(long, default_value = "127.0.0.1:8787")]
    pub addr: String,
    /// Bearer token required on non-loopback requests.
    #[arg(long, env = "MCPV_TOKEN")]
    pub token: Option<String>,
    /// Allowed CORS origins; unset means none are allowed cross-origin.
    #[arg(long)]
    pub cors_origin: Vec<String>,
    /// Serve Prometheus metrics on this address instead of using the no-op
    /// sink.
    #[arg(long)]
    pub metrics_addr: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_requires_a_spec_argument() {
        let cli = Cli::parse_from(["mcpv", "retry", "--url", "http://localhost:9000", "my-spec"]);
        match cli.command {
            Commands::Retry { conn, spec } => {
                assert_eq!(conn.url, "http://localhost:9000");
                assert_eq!(spec, "my-spec");
            }
            other => panic!("expected Retry, got {other:?}"),
        }
    }

    #[test]
    fn status_defaults_to_loopback_gateway() {
        let cli = Cli::parse_from(["mcpv", "status"]);
        match cli.command {
            Commands::Status(conn) => assert_eq!(conn.url, "http://127.0.0.1:8787"),
            other => panic!("expected Status, got {other:?}"),
        }
    }
}
