//! `RouteError` and its stage tag.

use mcpv_protocol::McpError;
use thiserror::Error;

/// Which stage of the pipeline failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteStage {
    /// JSON-RPC envelope failed to parse.
    Decode,
    /// Method is not in the server's captured capability set.
    Validate,
    /// No instance could be acquired in time.
    Acquire,
    /// The acquired instance's call failed.
    Call,
}

impl RouteStage {
    /// Stable tag for logs and the stage label in the metric.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Decode => "decode",
            Self::Validate => "validate",
            Self::Acquire => "acquire",
            Self::Call => "call",
        }
    }
}

/// A staged routing failure: which stage, and the underlying cause.
#[derive(Debug, Clone, Error)]
#[error("{stage} stage failed: {cause}", stage = self.stage.label())]
pub struct RouteError {
    /// The stage that produced this error.
    pub stage: RouteStage,
    /// The underlying cause, already normalized to the shared taxonomy.
    #[source]
    pub cause: McpError,
}

impl RouteError {
    /// Construct a `RouteError` for `stage` wrapping `cause`.
    #[must_use]
    pub fn new(stage: RouteStage, cause: McpError) -> Self {
        Self { stage, cause }
    }

    /// The metric tag for this stage, refined by the underlying cause for
    /// `Acquire`/`Call`.
    #[must_use]
    pub fn metric_tag(&self) -> &'static str {
        match self.stage {
            RouteStage::Decode => "invalid-request",
            RouteStage::Validate => "method-not-allowed",
            RouteStage::Acquire => match self.cause {
                McpError::Timeout { .. } => "timeout-cold-start",
                _ => "acquire-failed",
            },
            RouteStage::Call => match self.cause {
                McpError::Timeout { .. } => "timeout-execution",
                McpError::FailedPrecondition { .. } => "conn-closed",
                _ => "execution-failed",
            },
        }
    }
}
