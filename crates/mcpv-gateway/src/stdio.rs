//! Stdio transport: line-based JSON-RPC over stdin/stdout for a single
//! implicit caller.

use mcpv_protocol::jsonrpc::JsonRpcRequest;
use mcpv_types::client::ClientEntry;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::warn;

use crate::dispatch::dispatch;
use crate::state::GatewayState;

/// Run the gateway's stdio surface for `caller`: read newline-delimited
/// JSON-RPC requests from stdin, dispatch each against `state`, and write
/// the response back to stdout as a single line.
///
/// Exits when stdin closes.
pub async fn run(state: &GatewayState, caller: &ClientEntry) {
    let stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(stdin).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => continue,
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                warn!(error = %err, "stdio read failed, closing transport");
                break;
            }
        };

        let request: JsonRpcRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(err) => {
                warn!(error = %err, "dropping malformed stdio frame");
                continue;
            }
        };

        let response = dispatch(state, caller, request).await;
        let Ok(mut encoded) = serde_json::to_vec(&response) else {
            warn!("failed to encode response, dropping");
            continue;
        };
        encoded.push(b'\n');
        if stdout.write_all(&encoded).await.is_err() || stdout.flush().await.is_err() {
            warn!("stdio write failed, closing transport");
            break;
        }
    }
}
