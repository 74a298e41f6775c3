//! The control plane's error taxonomy.
//!
//! These are *kinds*, not leaf types — every subsystem crate defines its own
//! `thiserror` enum for its own failure modes and converts into
//! [`McpError`] at the boundary where the taxonomy needs to be uniform (the
//! router, the governance pipeline, and the RPC/gateway surface).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Specialized result type for code that returns [`McpError`] directly.
pub type McpResult<T> = Result<T, McpError>;

/// Whether an error observed during instance startup should suspend the
/// spec (fatal) or be retried with backoff (transient).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureClass {
    /// Retryable: network hiccups, stderr crashes, timeouts.
    Transient,
    /// Non-retryable: invalid command, executable not found, permission
    /// denied, unsupported protocol, unknown specKey.
    Fatal,
}

/// The uniform error taxonomy surfaced across router/governance/gateway
/// boundaries.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
#[non_exhaustive]
pub enum McpError {
    /// Malformed JSON-RPC envelope, invalid pagination cursor, or an unknown
    /// `specKey`.
    #[error("invalid input: {message}")]
    InvalidInput {
        /// Human-readable detail.
        message: String,
    },

    /// A tool/resource/prompt does not exist, or exists but is not visible
    /// to the requesting caller.
    #[error("not found: {message}")]
    NotFound {
        /// Human-readable detail.
        message: String,
    },

    /// The target server's captured capabilities do not list the requested
    /// method.
    #[error("method not allowed: {method}")]
    MethodNotAllowed {
        /// The rejected method.
        method: String,
    },

    /// Precondition failed: not installed, already running, scheduler
    /// unavailable.
    #[error("failed precondition: {message}")]
    FailedPrecondition {
        /// Human-readable detail.
        message: String,
    },

    /// Cold-start or execution timeout.
    #[error("timeout: {message}")]
    Timeout {
        /// Human-readable detail.
        message: String,
    },

    /// Transient transport failure: conn closed, dial failed, remote
    /// unavailable.
    #[error("transient transport error: {message}")]
    TransientTransport {
        /// Human-readable detail.
        message: String,
    },

    /// Non-retryable config error: invalid command, executable not found,
    /// permission denied, unsupported protocol.
    #[error("fatal config error: {message}")]
    FatalConfig {
        /// Human-readable detail.
        message: String,
    },

    /// A governance policy rejected the request.
    #[error("governance rejection [{category}/{plugin}] {code}: {message}")]
    GovernanceRejection {
        /// Policy-supplied category.
        category: String,
        /// Name of the rejecting policy.
        plugin: String,
        /// Machine-readable rejection code.
        code: String,
        /// Human-readable rejection message.
        message: String,
    },

    /// The init coordinator's retry ceiling was reached.
    #[error("retry limit reached ({attempts})")]
    RetryExhausted {
        /// Number of attempts made before giving up.
        attempts: u32,
    },
}

impl McpError {
    /// Classify this error for the init coordinator's fatal-vs-transient
    /// decision.
    #[must_use]
    pub fn failure_class(&self) -> FailureClass {
        match self {
            Self::FatalConfig { .. } | Self::InvalidInput { .. } => FailureClass::Fatal,
            _ => FailureClass::Transient,
        }
    }

    /// Shorthand for constructing an invalid-cursor error.
    #[must_use]
    pub fn invalid_cursor(cursor: &str) -> Self {
        Self::InvalidInput {
            message: format!("invalid cursor: {cursor}"),
        }
    }

    /// Shorthand for a tool/resource/prompt not found or not visible.
    #[must_use]
    pub fn not_found(kind: &str, name: &str) -> Self {
        Self::NotFound {
            message: format!("{kind} '{name}' not found"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_config_is_fatal_class() {
        let err = McpError::FatalConfig {
            message: "executable not found".into(),
        };
        assert_eq!(err.failure_class(), FailureClass::Fatal);
    }

    #[test]
    fn transport_error_is_transient_class() {
        let err = McpError::TransientTransport {
            message: "connection reset".into(),
        };
        assert_eq!(err.failure_class(), FailureClass::Transient);
    }

    #[test]
    fn retry_exhausted_message_includes_attempt_count() {
        let err = McpError::RetryExhausted { attempts: 3 };
        assert!(err.to_string().contains("retry limit reached (3)"));
    }
}
