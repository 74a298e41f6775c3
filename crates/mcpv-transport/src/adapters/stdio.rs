//! Stdio transport adapter: spawns a child process and frames newline-JSON
//! over its stdin/stdout.

use std::process::Stdio as StdStdio;
use std::time::Duration;

use async_trait::async_trait;
use mcpv_types::spec::{ServerSpec, Transport as SpecTransport};
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_util::codec::{FramedRead, LinesCodec};
use tracing::{debug, warn};

use crate::error::{TransportError, TransportResult};
use crate::traits::{Conn, Connected, Transport};

type FramedStdout = FramedRead<BufReader<tokio::process::ChildStdout>, LinesCodec>;

/// Connects by spawning the spec's `command` as a child process.
#[derive(Debug, Default)]
pub struct StdioTransport;

#[async_trait]
impl Transport for StdioTransport {
    async fn connect(&self, spec: &ServerSpec) -> TransportResult<Connected> {
        let SpecTransport::Stdio { command, args, env, cwd } = &spec.transport else {
            return Err(TransportError::InvalidCommand(
                "spec is not a stdio transport".to_string(),
            ));
        };
        if command.trim().is_empty() {
            return Err(TransportError::InvalidCommand("empty command".to_string()));
        }

        let mut cmd = Command::new(command);
        cmd.args(args)
            .envs(env)
            .stdin(StdStdio::piped())
            .stdout(StdStdio::piped())
            .stderr(StdStdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(classify_spawn_error)?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| TransportError::ConnectFailed("child stdin not piped".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TransportError::ConnectFailed("child stdout not piped".to_string()))?;
        if let Some(stderr) = child.stderr.take() {
            spawn_stderr_logger(stderr);
        }

        let reader = FramedRead::new(BufReader::new(stdout), LinesCodec::new());
        let conn = StdioConn {
            stdin: Mutex::new(stdin),
            stdout: Mutex::new(reader),
        };

        let stop = Box::new(move || {
            Box::pin(async move {
                let _ = child.start_kill();
                let _ = child.wait().await;
            }) as futures::future::BoxFuture<'static, ()>
        });

        Ok(Connected {
            conn: Box::new(conn),
            stop,
        })
    }
}

fn classify_spawn_error(err: std::io::Error) -> TransportError {
    match err.kind() {
        std::io::ErrorKind::NotFound => TransportError::ExecutableNotFound(err.to_string()),
        std::io::ErrorKind::PermissionDenied => TransportError::PermissionDenied(err.to_string()),
        _ => TransportError::ConnectFailed(err.to_string()),
    }
}

fn spawn_stderr_logger(stderr: tokio::process::ChildStderr) {
    tokio::spawn(async move {
        use tokio::io::AsyncBufReadExt;
        let mut lines = tokio::io::BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            warn!(target: "mcpv_transport::stdio_stderr", "{line}");
        }
    });
}

/// A [`Conn`] backed by a child process's stdin/stdout, framed as
/// newline-delimited JSON-RPC.
///
/// Newline-JSON framing keeps this adapter symmetric with the upstream
/// reference SDK's `LinesCodec`-based stdio transport; it assumes the
/// downstream server never emits embedded newlines inside a JSON value,
/// which holds for every compliant MCP stdio server.
struct StdioConn {
    stdin: Mutex<tokio::process::ChildStdin>,
    stdout: Mutex<FramedStdout>,
}

#[async_trait]
impl Conn for StdioConn {
    async fn call(&self, payload: Vec<u8>, timeout_dur: Duration) -> TransportResult<Vec<u8>> {
        {
            let mut stdin = self.stdin.lock().await;
            stdin
                .write_all(&payload)
                .await
                .map_err(|e| TransportError::SendFailed(e.to_string()))?;
            stdin
                .write_all(b"\n")
                .await
                .map_err(|e| TransportError::SendFailed(e.to_string()))?;
            stdin
                .flush()
                .await
                .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        }

        let mut stdout = self.stdout.lock().await;
        use futures::StreamExt;
        let line = timeout(timeout_dur, stdout.next())
            .await
            .map_err(|_| TransportError::Timeout {
                operation: "stdio recv".to_string(),
            })?
            .ok_or(TransportError::ConnClosed)?
            .map_err(|e| TransportError::ReceiveFailed(e.to_string()))?;
        debug!(target: "mcpv_transport::stdio", bytes = line.len(), "received frame");
        Ok(line.into_bytes())
    }

    async fn close(&self) {
        let mut stdin = self.stdin.lock().await;
        let _ = stdin.shutdown().await;
    }
}
