//! Declarative server specifications.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// The internal handle for one declarative server definition.
///
/// Distinct from [`ServerSpec::name`], which is human-facing and may collide
/// across profiles; `SpecKey` is always unique within a [`crate::CatalogState`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpecKey(pub String);

impl SpecKey {
    /// Borrow the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SpecKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SpecKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SpecKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// How a downstream server process or session is reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "transport", rename_all = "snake_case")]
pub enum Transport {
    /// A child process speaking newline-delimited JSON-RPC over stdin/stdout.
    Stdio {
        /// Executable to spawn.
        command: String,
        /// Arguments passed to the executable.
        #[serde(default)]
        args: Vec<String>,
        /// Environment variables added on top of the inherited environment.
        #[serde(default)]
        env: BTreeMap<String, String>,
        /// Working directory for the spawned process; inherits the control
        /// plane's cwd when `None`.
        #[serde(default)]
        cwd: Option<String>,
    },
    /// A streamable-HTTP session against a remote endpoint.
    StreamableHttp {
        /// Base endpoint URL.
        endpoint: String,
        /// Extra headers sent with every request (e.g. static bearer tokens).
        #[serde(default)]
        headers: BTreeMap<String, String>,
        /// Maximum connect/send retries before the attempt is abandoned.
        #[serde(default = "default_max_retries")]
        max_retries: u32,
        /// Optional upstream proxy URL.
        #[serde(default)]
        proxy: Option<String>,
    },
}

fn default_max_retries() -> u32 {
    3
}

impl Transport {
    /// `true` for [`Transport::Stdio`].
    #[must_use]
    pub const fn is_stdio(&self) -> bool {
        matches!(self, Self::Stdio { .. })
    }
}

/// Whether a spec's pool is started eagerly or only in response to demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActivationMode {
    /// Start instances only when acquired (subject to `minReady`).
    OnDemand,
    /// Always keep at least one instance warm, regardless of `minReady`.
    ///
    /// `minReady=0` under `always-on` still guarantees one warm instance —
    /// `always-on` is a distinct dimension from `minReady`, not a
    /// multiplier of it.
    AlwaysOn,
}

/// Routing discipline for a spec's pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Any ready instance may serve any call.
    Stateless,
    /// Calls sharing a routing key are pinned to the same instance until it
    /// terminates or the sticky binding's session TTL expires.
    Stateful,
}

/// An immutable, declarative server definition.
///
/// Published as part of a [`crate::CatalogState`] snapshot; once published a
/// `ServerSpec` is never mutated in place — a changed spec is a new value
/// under the same [`SpecKey`] in the next revision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSpec {
    /// Human-facing name; may repeat across specs in different profiles.
    pub name: String,
    /// How the server is reached.
    pub transport: Transport,
    /// MCP protocol version this server is expected to speak.
    pub protocol_version: String,
    /// Tags used for federated-visibility tag intersection.
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Eager vs on-demand pool activation.
    #[serde(default = "default_activation_mode")]
    pub activation_mode: ActivationMode,
    /// Stateless vs sticky-stateful routing.
    #[serde(default = "default_strategy")]
    pub strategy: Strategy,
    /// Maximum concurrent in-flight calls per instance.
    pub max_concurrent: u32,
    /// Minimum number of `Ready` instances the init coordinator drives toward.
    pub min_ready: u32,
    /// Seconds of idleness (busyCount=0) before an instance becomes eligible
    /// for drain; `0` disables idle-triggered shutdown.
    pub idle_seconds: u64,
    /// Seconds to wait for in-flight calls to finish once draining starts.
    pub drain_timeout_seconds: u64,
    /// Seconds a stateful sticky binding may go unused before it is eligible
    /// to be rebound; `0` disables expiry.
    pub session_ttl_seconds: u64,
}

fn default_activation_mode() -> ActivationMode {
    ActivationMode::OnDemand
}

fn default_strategy() -> Strategy {
    Strategy::Stateless
}

impl ServerSpec {
    /// `true` when this spec must keep at least one instance warm
    /// irrespective of `minReady` (see [`ActivationMode::AlwaysOn`]).
    #[must_use]
    pub fn effective_min_ready(&self) -> u32 {
        match self.activation_mode {
            ActivationMode::AlwaysOn => self.min_ready.max(1),
            ActivationMode::OnDemand => self.min_ready,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stdio_spec(min_ready: u32, mode: ActivationMode) -> ServerSpec {
        ServerSpec {
            name: "demo".into(),
            transport: Transport::Stdio {
                command: "demo-server".into(),
                args: vec![],
                env: BTreeMap::new(),
                cwd: None,
            },
            protocol_version: "2025-11-25".into(),
            tags: BTreeSet::new(),
            activation_mode: mode,
            strategy: Strategy::Stateless,
            max_concurrent: 4,
            min_ready,
            idle_seconds: 30,
            drain_timeout_seconds: 5,
            session_ttl_seconds: 0,
        }
    }

    #[test]
    fn always_on_guarantees_one_warm_instance_even_at_min_ready_zero() {
        let spec = stdio_spec(0, ActivationMode::AlwaysOn);
        assert_eq!(spec.effective_min_ready(), 1);
    }

    #[test]
    fn on_demand_min_ready_zero_stays_zero() {
        let spec = stdio_spec(0, ActivationMode::OnDemand);
        assert_eq!(spec.effective_min_ready(), 0);
    }

    #[test]
    fn spec_key_displays_inner_string() {
        let key = SpecKey::from("srv-a");
        assert_eq!(key.to_string(), "srv-a");
        assert_eq!(key.as_str(), "srv-a");
    }
}
