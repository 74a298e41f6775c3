//! Per-caller visibility resolution.

use std::collections::{BTreeMap, BTreeSet};

use mcpv_types::client::ClientEntry;
use mcpv_types::spec::{ServerSpec, SpecKey};

/// The set of specs visible to `caller` given the full catalog's specs.
///
/// A caller bound to `explicitServer` sees only that spec (and nothing if
/// that spec no longer exists); otherwise visibility is a tag-intersection
/// formula: a spec is visible if its tags intersect the caller's tags, or
/// either side has no tags at all.
#[must_use]
pub fn effective_visible_specs(caller: &ClientEntry, specs: &BTreeMap<SpecKey, ServerSpec>) -> BTreeSet<SpecKey> {
    if let Some(explicit) = &caller.explicit_server {
        return if specs.contains_key(explicit) {
            BTreeSet::from([explicit.clone()])
        } else {
            BTreeSet::new()
        };
    }

    specs
        .iter()
        .filter(|(_, spec)| {
            let intersects = !caller.tags.is_empty() && caller.tags.intersection(&spec.tags).next().is_some();
            intersects || spec.tags.is_empty() || caller.tags.is_empty()
        })
        .map(|(key, _)| key.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mcpv_types::spec::{ActivationMode, Strategy, Transport};
    use std::collections::BTreeMap as Map;

    fn spec(tags: &[&str]) -> ServerSpec {
        ServerSpec {
            name: "s".into(),
            transport: Transport::Stdio {
                command: "x".into(),
                args: vec![],
                env: Map::new(),
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

    fn caller(tags: &[&str], explicit: Option<SpecKey>) -> ClientEntry {
        ClientEntry::new("c", None, tags.iter().map(|t| t.to_string()).collect(), explicit, Utc::now()).unwrap()
    }

    #[test]
    fn explicit_server_narrows_to_one_spec() {
        let mut specs = Map::new();
        specs.insert(SpecKey::from("a"), spec(&["x"]));
        specs.insert(SpecKey::from("b"), spec(&["y"]));
        let c = caller(&[], Some(SpecKey::from("b")));
        let visible = effective_visible_specs(&c, &specs);
        assert_eq!(visible, BTreeSet::from([SpecKey::from("b")]));
    }

    #[test]
    fn explicit_server_pointing_at_missing_spec_sees_nothing() {
        let specs: Map<SpecKey, ServerSpec> = Map::new();
        let c = caller(&[], Some(SpecKey::from("gone")));
        assert!(effective_visible_specs(&c, &specs).is_empty());
    }

    #[test]
    fn disjoint_tags_with_both_sides_nonempty_are_invisible() {
        let mut specs = Map::new();
        specs.insert(SpecKey::from("a"), spec(&["x"]));
        let c = caller(&["y"], None);
        assert!(effective_visible_specs(&c, &specs).is_empty());
    }

    #[test]
    fn intersecting_tags_are_visible() {
        let mut specs = Map::new();
        specs.insert(SpecKey::from("a"), spec(&["x", "y"]));
        let c = caller(&["y"], None);
        assert_eq!(effective_visible_specs(&c, &specs), BTreeSet::from([SpecKey::from("a")]));
    }

    #[test]
    fn untagged_spec_is_visible_to_every_caller() {
        let mut specs = Map::new();
        specs.insert(SpecKey::from("a"), spec(&[]));
        let c = caller(&["y"], None);
        assert_eq!(effective_visible_specs(&c, &specs), BTreeSet::from([SpecKey::from("a")]));
    }

    #[test]
    fn untagged_caller_sees_every_spec() {
        let mut specs = Map::new();
        specs.insert(SpecKey::from("a"), spec(&["x"]));
        let c = caller(&[], None);
        assert_eq!(effective_visible_specs(&c, &specs), BTreeSet::from([SpecKey::from("a")]));
    }
}
