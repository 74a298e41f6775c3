//! Instance lifecycle state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::spec::SpecKey;
use crate::start_cause::StartCause;

/// Captured capabilities of a downstream server, recorded at handshake time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Capabilities {
    /// Server-reported name from its `initialize` response.
    pub server_name: String,
    /// Server-reported version string, if any.
    pub server_version: Option<String>,
    /// Raw capability object as returned by the server, preserved verbatim
    /// so discovery can surface fields this control plane doesn't model.
    pub raw: serde_json::Value,
}

/// The instance lifecycle state machine.
///
/// ```text
/// Starting -> Initializing -> Handshaking -> Ready <-> Busy -> Draining -> Stopped
/// Failed is terminal from any pre-Ready state.
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceState {
    /// Transport connect is in flight.
    Starting,
    /// Transport connected; about to send `initialize`.
    Initializing,
    /// `initialize` request sent, awaiting result.
    Handshaking,
    /// Handshake validated; idle and available for acquire.
    Ready,
    /// At least one call is in flight (`busyCount > 0`).
    Busy,
    /// Stop requested; waiting for in-flight calls to finish or the drain
    /// timeout to elapse.
    Draining,
    /// Transport closed, stop callback invoked.
    Stopped,
    /// Terminal failure from any pre-Ready state.
    Failed,
}

impl InstanceState {
    /// Whether an instance in this state may be considered for [`crate::Snapshot`]
    /// acquisition (i.e. it is warm and not on its way out).
    #[must_use]
    pub const fn is_ready_or_busy(&self) -> bool {
        matches!(self, Self::Ready | Self::Busy)
    }

    /// Whether this state is terminal (no further transitions occur).
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Failed)
    }
}

/// A single running MCP server process or HTTP session, owned exclusively by
/// its pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    /// Stable identifier, unique for the lifetime of the process.
    pub id: String,
    /// The spec this instance was started from.
    pub spec_key: SpecKey,
    /// Current lifecycle state.
    pub state: InstanceState,
    /// Number of calls currently in flight on this instance.
    pub busy_count: u32,
    /// Last time this instance served (or finished serving) a call.
    pub last_active: DateTime<Utc>,
    /// Capabilities captured at handshake time, if the handshake completed.
    pub capabilities: Option<Capabilities>,
    /// When the transport connect attempt for this instance began.
    pub spawned_at: DateTime<Utc>,
    /// When the `initialize` handshake completed, if it has.
    pub handshake_at: Option<DateTime<Utc>>,
    /// Last successful protocol-level ping, if any.
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    /// Provenance of the start attempt that created this instance.
    pub last_start_cause: StartCause,
}

impl Instance {
    /// Construct a fresh instance in the `Starting` state.
    #[must_use]
    pub fn starting(id: String, spec_key: SpecKey, cause: StartCause, now: DateTime<Utc>) -> Self {
        Self {
            id,
            spec_key,
            state: InstanceState::Starting,
            busy_count: 0,
            last_active: now,
            capabilities: None,
            spawned_at: now,
            handshake_at: None,
            last_heartbeat_at: None,
            last_start_cause: cause,
        }
    }

    /// `true` if this instance has room for another concurrent call under
    /// `maxConcurrent`.
    #[must_use]
    pub fn has_capacity(&self, max_concurrent: u32) -> bool {
        self.state == InstanceState::Ready
            || (self.state == InstanceState::Busy && self.busy_count < max_concurrent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_instance_starts_in_starting_state() {
        let now = Utc::now();
        let inst = Instance::starting(
            "i1".into(),
            SpecKey::from("srv"),
            StartCause::bootstrap(),
            now,
        );
        assert_eq!(inst.state, InstanceState::Starting);
        assert_eq!(inst.busy_count, 0);
    }

    #[test]
    fn ready_instance_under_max_concurrent_has_capacity() {
        let mut inst = Instance::starting("i1".into(), SpecKey::from("srv"), StartCause::bootstrap(), Utc::now());
        inst.state = InstanceState::Busy;
        inst.busy_count = 1;
        assert!(inst.has_capacity(2));
        inst.busy_count = 2;
        assert!(!inst.has_capacity(2));
    }
}
