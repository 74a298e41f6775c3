//! Client registry entries.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::spec::SpecKey;

/// An active caller registered with the control plane.
///
/// Invariant: `explicit_server` and `tags` are mutually exclusive — a client
/// either pins to one server's view or computes visibility from tags, never
/// both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientEntry {
    /// Caller-supplied display name; not required to be unique process-wide,
    /// but is the registry's lookup key in practice.
    pub name: String,
    /// Caller's process id, when known (useful for desktop-UI display).
    pub pid: Option<u32>,
    /// Tags the caller visibility filter intersects against spec tags.
    pub tags: BTreeSet<String>,
    /// When set, the caller sees only this spec's federated view.
    pub explicit_server: Option<SpecKey>,
    /// Last heartbeat received from this caller.
    pub last_heartbeat: DateTime<Utc>,
}

impl ClientEntry {
    /// Construct a new registration, enforcing the tags/explicit_server
    /// mutual exclusion invariant.
    ///
    /// # Errors
    ///
    /// Returns an error if both `tags` and `explicit_server` are non-empty.
    pub fn new(
        name: impl Into<String>,
        pid: Option<u32>,
        tags: BTreeSet<String>,
        explicit_server: Option<SpecKey>,
        now: DateTime<Utc>,
    ) -> Result<Self, String> {
        if explicit_server.is_some() && !tags.is_empty() {
            return Err("explicitServer and tags are mutually exclusive".to_string());
        }
        Ok(Self {
            name: name.into(),
            pid,
            tags,
            explicit_server,
            last_heartbeat: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_server_and_tags_together_is_rejected() {
        let mut tags = BTreeSet::new();
        tags.insert("x".to_string());
        let err = ClientEntry::new(
            "caller",
            None,
            tags,
            Some(SpecKey::from("srv")),
            Utc::now(),
        )
        .unwrap_err();
        assert!(err.contains("mutually exclusive"));
    }
}
