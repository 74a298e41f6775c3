//! Command implementations dispatched from [`crate::cli::Commands`].

use anyhow::Result;
use serde_json::Value;

use crate::cli::Connection;
use crate::client::GatewayClient;

/// `mcpv status`: print per-spec pool occupancy.
pub async fn status(conn: Connection) -> Result<()> {
    let value = GatewayClient::new(&conn).pool_status().await?;
    display(&conn, &value);
    Ok(())
}

/// `mcpv servers`: print per-server init status.
pub async fn servers(conn: Connection) -> Result<()> {
    let value = GatewayClient::new(&conn).server_status().await?;
    display(&conn, &value);
    Ok(())
}

/// `mcpv reload`: trigger a manual catalog reload.
pub async fn reload(conn: Connection) -> Result<()> {
    let value = GatewayClient::new(&conn).reload().await?;
    display(&conn, &value);
    Ok(())
}

/// `mcpv retry <spec>`: retry a spec stuck in backoff or failed.
pub async fn retry(conn: Connection, spec: String) -> Result<()> {
    GatewayClient::new(&conn).retry(&spec).await?;
    println!("retry requested for {spec}");
    Ok(())
}

fn display(conn: &Connection, value: &Value) {
    if conn.json {
        println!("{}", serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string()));
    } else {
        println!("{value}");
    }
}
