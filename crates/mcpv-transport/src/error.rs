//! Transport-level errors.

use thiserror::Error;

/// Specialized result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Errors raised while connecting to or communicating with a downstream
/// MCP server.
///
/// Each variant is pre-classified so the instance lifecycle manager can map
/// it to the fatal/transient taxonomy without re-inspecting strings:
/// [`TransportError::is_fatal`] is the single source of truth.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum TransportError {
    /// The spec's `command` could not be parsed or resolved.
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    /// The executable named by `command` does not exist on `PATH`.
    #[error("executable not found: {0}")]
    ExecutableNotFound(String),

    /// The current user lacks permission to execute `command`.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The spec's endpoint URL is malformed.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Connect (process spawn or HTTP dial) failed for a transient reason.
    #[error("connect failed: {0}")]
    ConnectFailed(String),

    /// Sending a frame failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Receiving a frame failed, including the downstream process exiting
    /// or the HTTP session dropping.
    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    /// A frame could not be decoded as JSON.
    #[error("decode failed: {0}")]
    DecodeFailed(String),

    /// The operation did not complete within its deadline.
    #[error("timed out waiting for {operation}")]
    Timeout {
        /// What was being waited on.
        operation: String,
    },

    /// The connection was already closed when an operation was attempted.
    #[error("connection closed")]
    ConnClosed,
}

impl TransportError {
    /// `true` for error classes considered fatal: no retry, the spec must
    /// be suspended instead.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::InvalidCommand(_)
                | Self::ExecutableNotFound(_)
                | Self::PermissionDenied(_)
                | Self::InvalidEndpoint(_)
        )
    }
}
