//! Process-wide catalog state.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::spec::{ServerSpec, SpecKey};

/// Global knobs that apply to every spec unless overridden.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Global timeout applied to a routed call.
    pub route_timeout_seconds: u64,
    /// Heartbeat interval clients are told to use when registering.
    pub heartbeat_interval_seconds: u64,
    /// Default per-spec instance-init retry ceiling for the init coordinator.
    pub max_retries: u32,
    /// Base delay for the coordinator's exponential backoff.
    pub retry_base_seconds: u64,
    /// Cap on the coordinator's exponential backoff.
    pub retry_max_seconds: u64,
    /// Number of `initialize` retries the lifecycle manager allows on
    /// transient send/recv failures before giving up on one start attempt.
    pub initialize_retry_count: u32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            route_timeout_seconds: 30,
            heartbeat_interval_seconds: 20,
            max_retries: 5,
            retry_base_seconds: 1,
            retry_max_seconds: 60,
            initialize_retry_count: 2,
        }
    }
}

/// A single, versioned, process-wide snapshot of the catalog.
///
/// Invariants: every spec has a unique [`SpecKey`] and non-empty `name`;
/// revisions strictly increase; two snapshots with equal revision are
/// byte-equal (enforced by construction — `CatalogState` is immutable once
/// built, see [`crate::catalog`] module docs and `mcpv-catalog::provider`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogState {
    /// Monotonically increasing revision number.
    pub revision: u64,
    /// Wall-clock time this snapshot was built.
    pub built_at: DateTime<Utc>,
    /// All known specs, keyed by their stable handle.
    pub specs: BTreeMap<SpecKey, ServerSpec>,
    /// Runtime-wide configuration in effect for this revision.
    pub runtime: RuntimeConfig,
    /// Union of all tags across `specs`, cached for discovery.
    pub tags: BTreeSet<String>,
}

impl CatalogState {
    /// An empty catalog at revision 0, used before the first successful load.
    #[must_use]
    pub fn empty(built_at: DateTime<Utc>) -> Self {
        Self {
            revision: 0,
            built_at,
            specs: BTreeMap::new(),
            runtime: RuntimeConfig::default(),
            tags: BTreeSet::new(),
        }
    }

    /// Validate the structural invariants required of a catalog: unique,
    /// non-empty spec names.
    ///
    /// # Errors
    ///
    /// Returns a human-readable message on the first violated invariant.
    pub fn validate(&self) -> Result<(), String> {
        for (key, spec) in &self.specs {
            if spec.name.trim().is_empty() {
                return Err(format!("spec '{key}' has an empty name"));
            }
            if spec.max_concurrent == 0 {
                return Err(format!("spec '{key}' has maxConcurrent == 0"));
            }
        }
        Ok(())
    }

    fn derive_tags(specs: &BTreeMap<SpecKey, ServerSpec>) -> BTreeSet<String> {
        specs.values().flat_map(|s| s.tags.iter().cloned()).collect()
    }

    /// Construct the next revision from a parsed set of specs and runtime
    /// config. Does not itself diff against a previous state — callers in
    /// `mcpv-catalog` are responsible for deciding whether the result is
    /// worth publishing.
    #[must_use]
    pub fn next(
        prev_revision: u64,
        built_at: DateTime<Utc>,
        specs: BTreeMap<SpecKey, ServerSpec>,
        runtime: RuntimeConfig,
    ) -> Self {
        let tags = Self::derive_tags(&specs);
        Self {
            revision: prev_revision + 1,
            built_at,
            specs,
            runtime,
            tags,
        }
    }
}

/// Fields of a [`ServerSpec`] whose change requires restarting instances
/// rather than a hot pool-level reconfiguration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChanges {
    /// `command`/`args`/`env`/`cwd`/`transport`/`endpoint`/`protocolVersion`
    /// changed — instances must be restarted.
    pub requires_restart: bool,
    /// `minReady` changed — hot-applicable.
    pub min_ready: bool,
    /// `idleSeconds` changed — hot-applicable.
    pub idle_seconds: bool,
    /// `maxConcurrent` changed — hot-applicable.
    pub max_concurrent: bool,
    /// `tags` changed — hot-applicable, affects discovery visibility only.
    pub tags: bool,
    /// `drainTimeoutSeconds` or `sessionTTLSeconds` changed — hot-applicable.
    pub drain_or_session_ttl: bool,
}

impl FieldChanges {
    /// `true` if nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self
            == Self {
                requires_restart: false,
                min_ready: false,
                idle_seconds: false,
                max_concurrent: false,
                tags: false,
                drain_or_session_ttl: false,
            }
    }
}

/// The result of comparing two [`CatalogState`] snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CatalogDiff {
    /// Specs present in the new snapshot but absent from the old one.
    pub added: Vec<SpecKey>,
    /// Specs present in the old snapshot but absent from the new one.
    pub removed: Vec<SpecKey>,
    /// Per-spec field-level changes for specs present in both snapshots.
    pub changed: BTreeMap<SpecKey, FieldChanges>,
    /// `true` if any spec's tag set changed (union recomputed).
    pub tags_changed: bool,
    /// `true` if [`RuntimeConfig`] changed.
    pub runtime_changed: bool,
}

impl CatalogDiff {
    /// `true` when nothing changed between the two snapshots that produced
    /// this diff — the caller should discard the candidate revision.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.removed.is_empty()
            && self.changed.is_empty()
            && !self.tags_changed
            && !self.runtime_changed
    }

    /// Compute the diff between two snapshots.
    #[must_use]
    pub fn compute(prev: &CatalogState, next: &CatalogState) -> Self {
        let mut added = Vec::new();
        let mut removed = Vec::new();
        let mut changed = BTreeMap::new();

        for key in next.specs.keys() {
            if !prev.specs.contains_key(key) {
                added.push(key.clone());
            }
        }
        for key in prev.specs.keys() {
            if !next.specs.contains_key(key) {
                removed.push(key.clone());
            }
        }
        for (key, next_spec) in &next.specs {
            let Some(prev_spec) = prev.specs.get(key) else {
                continue;
            };
            let fields = Self::diff_fields(prev_spec, next_spec);
            if !fields.is_empty() {
                changed.insert(key.clone(), fields);
            }
        }

        Self {
            added,
            removed,
            changed,
            tags_changed: prev.tags != next.tags,
            runtime_changed: prev.runtime != next.runtime,
        }
    }

    fn diff_fields(prev: &ServerSpec, next: &ServerSpec) -> FieldChanges {
        FieldChanges {
            requires_restart: prev.transport != next.transport
                || prev.protocol_version != next.protocol_version,
            min_ready: prev.min_ready != next.min_ready,
            idle_seconds: prev.idle_seconds != next.idle_seconds,
            max_concurrent: prev.max_concurrent != next.max_concurrent,
            tags: prev.tags != next.tags,
            drain_or_session_ttl: prev.drain_timeout_seconds != next.drain_timeout_seconds
                || prev.session_ttl_seconds != next.session_ttl_seconds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{ActivationMode, Strategy, Transport};
    use std::collections::BTreeSet;

    fn spec(name: &str, tags: &[&str]) -> ServerSpec {
        ServerSpec {
            name: name.into(),
            transport: Transport::Stdio {
                command: "x".into(),
                args: vec![],
                env: BTreeMap::new(),
                cwd: None,
            },
            protocol_version: "2025-11-25".into(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            activation_mode: ActivationMode::OnDemand,
            strategy: Strategy::Stateless,
            max_concurrent: 1,
            min_ready: 0,
            idle_seconds: 0,
            drain_timeout_seconds: 0,
            session_ttl_seconds: 0,
        }
    }

    fn state(revision: u64, entries: &[(&str, ServerSpec)]) -> CatalogState {
        let specs = entries
            .iter()
            .map(|(k, v)| (SpecKey::from(*k), v.clone()))
            .collect::<BTreeMap<_, _>>();
        let tags = entries.iter().flat_map(|(_, s)| s.tags.clone()).collect::<BTreeSet<_>>();
        CatalogState {
            revision,
            built_at: Utc::now(),
            specs,
            runtime: RuntimeConfig::default(),
            tags,
        }
    }

    #[test]
    fn diff_reports_added_and_removed_spec_keys() {
        // catalog1 has {a, b}; catalog2 has {a, c}.
        let prev = state(1, &[("a", spec("a", &[])), ("b", spec("b", &[]))]);
        let next = state(2, &[("a", spec("a", &[])), ("c", spec("c", &[]))]);

        let diff = CatalogDiff::compute(&prev, &next);
        assert_eq!(diff.added, vec![SpecKey::from("c")]);
        assert_eq!(diff.removed, vec![SpecKey::from("b")]);
        assert!(!diff.is_empty());
    }

    #[test]
    fn identical_catalogs_diff_empty() {
        let a = state(1, &[("a", spec("a", &["x"]))]);
        let b = state(2, &[("a", spec("a", &["x"]))]);
        assert!(CatalogDiff::compute(&a, &b).is_empty());
    }

    #[test]
    fn transport_change_requires_restart() {
        let prev = state(1, &[("a", spec("a", &[]))]);
        let mut changed_spec = spec("a", &[]);
        changed_spec.transport = Transport::StreamableHttp {
            endpoint: "https://example".into(),
            headers: BTreeMap::new(),
            max_retries: 3,
            proxy: None,
        };
        let next = state(2, &[("a", changed_spec)]);

        let diff = CatalogDiff::compute(&prev, &next);
        assert!(diff.changed[&SpecKey::from("a")].requires_restart);
    }

    #[test]
    fn min_ready_change_is_hot_applicable() {
        let prev = state(1, &[("a", spec("a", &[]))]);
        let mut changed_spec = spec("a", &[]);
        changed_spec.min_ready = 3;
        let next = state(2, &[("a", changed_spec)]);

        let diff = CatalogDiff::compute(&prev, &next);
        let fields = diff.changed[&SpecKey::from("a")];
        assert!(fields.min_ready);
        assert!(!fields.requires_restart);
    }
}
