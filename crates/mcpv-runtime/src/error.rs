//! Runtime-wide errors: instance lifecycle, scheduler, and init coordinator.

use mcpv_protocol::FailureClass;
use mcpv_transport::TransportError;
use thiserror::Error;

/// Specialized result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Errors raised by the instance lifecycle manager, the scheduler, or the
/// init coordinator.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum RuntimeError {
    /// Transport-level failure surfaced from `mcpv-transport`.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The server's `initialize` response declared a protocol version this
    /// control plane does not accept.
    #[error("unsupported protocol version: server speaks {got}, expected one of {expected:?}")]
    UnsupportedProtocol {
        /// Version the server actually reported.
        got: String,
        /// Versions this control plane accepts.
        expected: Vec<String>,
    },

    /// The `initialize` response failed structural validation.
    #[error("malformed initialize response: {0}")]
    MalformedHandshake(String),

    /// `stopInstance` was called for an instance id this manager never
    /// registered.
    #[error("unknown instance: {0}")]
    UnknownInstance(String),

    /// `specKey` does not exist in the current catalog.
    #[error("unknown spec: {0}")]
    UnknownSpec(String),

    /// No warm instance was available and the caller used
    /// `AcquireReady`.
    #[error("no ready instance for spec {0}")]
    NoReadyInstance(String),

    /// `Acquire` exceeded the caller's context deadline.
    ///
    /// `cold_start` distinguishes the two timeout classifications:
    /// `cold-start` if a start was in-flight, else `acquire-failed`.
    #[error("acquire timed out for spec {spec_key} (cold_start={cold_start})")]
    AcquireTimeout {
        /// The spec being acquired from.
        spec_key: String,
        /// Whether a start attempt was in flight when the deadline hit.
        cold_start: bool,
    },

    /// The acquiring context was cancelled before acquire returned.
    #[error("acquire cancelled for spec {0}")]
    AcquireCancelled(String),

    /// The init coordinator's retry ceiling was reached.
    #[error("retry limit reached ({attempts})")]
    RetryExhausted {
        /// Attempts made before giving up.
        attempts: u32,
    },
}

impl RuntimeError {
    /// Classify this error for the init coordinator's fatal-vs-transient
    /// decision.
    #[must_use]
    pub fn failure_class(&self) -> FailureClass {
        match self {
            Self::Transport(e) if e.is_fatal() => FailureClass::Fatal,
            Self::UnsupportedProtocol { .. } | Self::UnknownSpec(_) => FailureClass::Fatal,
            _ => FailureClass::Transient,
        }
    }
}
