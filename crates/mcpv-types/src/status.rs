//! Server-init status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::spec::SpecKey;

/// The init coordinator's classification of a spec's progress toward its
/// min-ready target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitState {
    /// Target is zero; nothing to drive toward.
    Pending,
    /// Below target, no failures observed yet.
    Starting,
    /// At or above target.
    Ready,
    /// Above zero but below target.
    Degraded,
    /// An error (or instance failure) was observed this attempt.
    Failed,
    /// Retry ceiling reached, or a fatal error class was seen; no further
    /// attempts until `RetrySpec` is called.
    Suspended,
}

/// One attempt record within a spec's init status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AttemptRecord {
    /// When this attempt began.
    pub started_at: Option<DateTime<Utc>>,
    /// When this attempt concluded, if it has.
    pub ended_at: Option<DateTime<Utc>>,
    /// Which step of the worker loop this attempt last reported
    /// (`set_min_ready`, `snapshot_done`, ...).
    pub step: Option<String>,
    /// Error observed during this attempt, if any.
    pub error: Option<String>,
    /// Ready-instance count observed this attempt.
    pub ready: u32,
    /// Failed-instance count observed this attempt.
    pub failed: u32,
    /// Min-ready target this attempt was driving toward.
    pub target: u32,
}

/// Per-spec progress snapshot published by the init coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerInitStatus {
    /// Spec this status describes.
    pub spec_key: SpecKey,
    /// Human-facing server name, denormalized for display.
    pub server_name: String,
    /// Currently desired min-ready target.
    pub min_ready: u32,
    /// Ready-instance count as of the last reconciliation.
    pub ready: u32,
    /// Failed-instance count as of the last reconciliation.
    pub failed: u32,
    /// Coordinator's classification.
    pub state: InitState,
    /// Number of consecutive failed attempts since the last `Ready` or
    /// `RetrySpec`.
    pub retry_count: u32,
    /// When the next retry is scheduled, if any.
    pub next_retry_at: Option<DateTime<Utc>>,
    /// Most recent error message, if any.
    pub last_error: Option<String>,
    /// The current (or most recently concluded) attempt's detail.
    pub attempt: AttemptRecord,
    /// When this status was last updated.
    pub updated_at: DateTime<Utc>,
}

impl ServerInitStatus {
    /// A fresh `Pending` status for a spec with target 0.
    #[must_use]
    pub fn pending(spec_key: SpecKey, server_name: String, now: DateTime<Utc>) -> Self {
        Self {
            spec_key,
            server_name,
            min_ready: 0,
            ready: 0,
            failed: 0,
            state: InitState::Pending,
            retry_count: 0,
            next_retry_at: None,
            last_error: None,
            attempt: AttemptRecord::default(),
            updated_at: now,
        }
    }
}
