//! Start-cause provenance.

use serde::{Deserialize, Serialize};

/// Why an instance start attempt was initiated.
///
/// Propagated on the request context into the lifecycle manager, and used
/// purely for observability and pool-growth attribution — it has no effect
/// on scheduling decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartReason {
    /// Start issued while bringing a spec up to its min-ready target at
    /// control-plane startup.
    Bootstrap,
    /// Start issued by the server-init coordinator reconciling min-ready.
    Policy,
    /// Start issued to serve an in-flight `tools/call` (or resource/prompt
    /// read) that required a warm instance.
    ToolCall,
    /// Start issued to redo a handshake (e.g. respawn after `Failed`).
    Handshake,
    /// Start issued by an operator action (CLI/UI `RetrySpec`, manual scale).
    Manual,
}

/// Provenance record attached to a start attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartCause {
    /// Why the start happened.
    pub reason: StartReason,
    /// Client name responsible, if attributable.
    pub client: Option<String>,
    /// Tool name being called, when `reason == ToolCall`.
    pub tool_name: Option<String>,
}

impl StartCause {
    /// A start attributed to control-plane bootstrap.
    #[must_use]
    pub fn bootstrap() -> Self {
        Self {
            reason: StartReason::Bootstrap,
            client: None,
            tool_name: None,
        }
    }

    /// A start attributed to the init coordinator reconciling min-ready.
    #[must_use]
    pub fn policy() -> Self {
        Self {
            reason: StartReason::Policy,
            client: None,
            tool_name: None,
        }
    }

    /// A start attributed to an in-flight tool call.
    #[must_use]
    pub fn tool_call(client: impl Into<String>, tool_name: impl Into<String>) -> Self {
        Self {
            reason: StartReason::ToolCall,
            client: Some(client.into()),
            tool_name: Some(tool_name.into()),
        }
    }

    /// A start attributed to an operator action.
    #[must_use]
    pub fn manual(client: impl Into<String>) -> Self {
        Self {
            reason: StartReason::Manual,
            client: Some(client.into()),
            tool_name: None,
        }
    }
}
