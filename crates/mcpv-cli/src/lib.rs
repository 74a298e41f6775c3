//! # mcpv-cli
//!
//! Operator CLI for an `mcpv` control plane: `status` and `servers` report
//! on a running gateway, `reload`/`retry` drive catalog operations against
//! it, and `run` boots a control plane in-process and serves it.

pub mod cli;
pub mod client;
pub mod commands;
pub mod run;

use clap::Parser;

pub use cli::{Cli, Commands};

/// Parse `argv`-derived arguments and dispatch to the matching command.
///
/// # Errors
///
/// Propagates whatever error the dispatched command produces: a transport
/// failure talking to the gateway, or a catalog load failure for `run`.
pub async fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Status(conn) => commands::status(conn).await,
        Commands::Servers(conn) => commands::servers(conn).await,
        Commands::Reload(conn) => commands::reload(conn).await,
        Commands::Retry { conn, spec } => commands::retry(conn, spec).await,
        Commands::Run(args) => run::run(args).await,
    }
}
