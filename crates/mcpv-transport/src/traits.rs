//! The `Transport`/`Conn` capability interfaces: small, object-safe
//! interfaces at the one seam dynamic dispatch is actually needed.

use std::time::Duration;

use async_trait::async_trait;
use mcpv_types::spec::ServerSpec;

use crate::error::TransportResult;

/// An opaque, already-connected channel to one downstream server instance.
///
/// Exactly the two operations an instance's connection needs: call and
/// close. Implementations (`StdioConn`, `HttpConn`) own the underlying
/// I/O and are not `Clone` — the lifecycle manager holds the single
/// instance that owns a given `Conn`.
#[async_trait]
pub trait Conn: Send + Sync {
    /// Send one JSON-RPC request frame and wait for its matching response
    /// frame, bounded by `timeout`.
    async fn call(&self, payload: Vec<u8>, timeout: Duration) -> TransportResult<Vec<u8>>;

    /// Close the underlying channel. Idempotent.
    async fn close(&self);
}

/// The result of a successful transport connect.
pub struct Connected {
    /// The opaque connection handle.
    pub conn: Box<dyn Conn>,
    /// Callback that tears down whatever process/session backs `conn`
    /// (kills the child, drops the HTTP session). Distinct from
    /// `Conn::close` so the lifecycle manager can close the logical
    /// channel without necessarily tearing down the process, and vice
    /// versa.
    pub stop: Box<dyn FnOnce() -> futures::future::BoxFuture<'static, ()> + Send>,
}

/// A factory that establishes a connection to a downstream server described
/// by a [`ServerSpec`].
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connect to the server described by `spec`, returning an opaque
    /// [`Connected`] handle. Does not perform the `initialize` handshake —
    /// that is the lifecycle manager's responsibility.
    async fn connect(&self, spec: &ServerSpec) -> TransportResult<Connected>;
}
