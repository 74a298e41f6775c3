//! The client registry itself.

use std::collections::BTreeSet;

use chrono::Utc;
use dashmap::DashMap;
use mcpv_types::client::ClientEntry;
use mcpv_types::spec::SpecKey;
use tokio::sync::broadcast;

use crate::error::{RegistryError, RegistryResult};
use crate::events::{ChangeKind, ClientChangeEvent};

/// Active callers known to the control plane, keyed by client name. The
/// registry exclusively owns entries under that key.
pub struct ClientRegistry {
    entries: DashMap<String, ClientEntry>,
    changes: broadcast::Sender<ClientChangeEvent>,
}

impl ClientRegistry {
    /// Construct an empty registry with the given change-channel capacity.
    #[must_use]
    pub fn new(change_capacity: usize) -> Self {
        let (changes, _) = broadcast::channel(change_capacity.max(1));
        Self {
            entries: DashMap::new(),
            changes,
        }
    }

    /// Register (or re-register) a client, enforcing the
    /// tags/`explicit_server` mutual-exclusion invariant.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::MutuallyExclusiveSelectors`] if both `tags`
    /// and `explicit_server` are non-empty.
    pub fn register(
        &self,
        name: impl Into<String>,
        pid: Option<u32>,
        tags: BTreeSet<String>,
        explicit_server: Option<SpecKey>,
    ) -> RegistryResult<ClientEntry> {
        let name = name.into();
        let entry = ClientEntry::new(name.clone(), pid, tags, explicit_server, Utc::now())
            .map_err(|_| RegistryError::MutuallyExclusiveSelectors)?;
        self.entries.insert(name.clone(), entry.clone());
        self.publish(name, ChangeKind::Registered);
        Ok(entry)
    }

    /// Remove a client.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownClient`] if `name` was never
    /// registered.
    pub fn unregister(&self, name: &str) -> RegistryResult<()> {
        self.entries
            .remove(name)
            .ok_or_else(|| RegistryError::UnknownClient(name.to_string()))?;
        self.publish(name.to_string(), ChangeKind::Unregistered);
        Ok(())
    }

    /// Refresh a client's `last_heartbeat`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownClient`] if `name` was never
    /// registered.
    pub fn heartbeat(&self, name: &str) -> RegistryResult<()> {
        let mut entry = self
            .entries
            .get_mut(name)
            .ok_or_else(|| RegistryError::UnknownClient(name.to_string()))?;
        entry.last_heartbeat = Utc::now();
        Ok(())
    }

    /// Drop every client whose last heartbeat is older than `max_age`
    /// (operator/idle-sweep housekeeping keyed off heartbeats as a
    /// liveness signal).
    pub fn sweep_expired(&self, max_age: chrono::Duration) {
        let now = Utc::now();
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|e| now - e.last_heartbeat > max_age)
            .map(|e| e.key().clone())
            .collect();
        for name in expired {
            let _ = self.unregister(&name);
        }
    }

    /// Look up one client by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<ClientEntry> {
        self.entries.get(name).map(|e| e.clone())
    }

    /// Snapshot of every currently registered client.
    #[must_use]
    pub fn list(&self) -> Vec<ClientEntry> {
        self.entries.iter().map(|e| e.value().clone()).collect()
    }

    /// Subscribe to registry change events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ClientChangeEvent> {
        self.changes.subscribe()
    }

    fn publish(&self, client: String, kind: ChangeKind) {
        let _ = self.changes.send(ClientChangeEvent { client, kind });
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_then_get_round_trips() {
        let registry = ClientRegistry::default();
        registry.register("alice", Some(100), BTreeSet::new(), None).unwrap();
        let entry = registry.get("alice").unwrap();
        assert_eq!(entry.pid, Some(100));
    }

    #[test]
    fn register_with_both_tags_and_explicit_server_is_rejected() {
        let registry = ClientRegistry::default();
        let mut tags = BTreeSet::new();
        tags.insert("x".to_string());
        let err = registry
            .register("bob", None, tags, Some(SpecKey::from("srv")))
            .unwrap_err();
        assert!(matches!(err, RegistryError::MutuallyExclusiveSelectors));
    }

    #[test]
    fn unregister_unknown_client_errors() {
        let registry = ClientRegistry::default();
        let err = registry.unregister("ghost").unwrap_err();
        assert!(matches!(err, RegistryError::UnknownClient(_)));
    }

    #[tokio::test]
    async fn registering_publishes_a_change_event() {
        let registry = ClientRegistry::default();
        let mut rx = registry.subscribe();
        registry.register("alice", None, BTreeSet::new(), None).unwrap();
        let event = rx.recv().await.unwrap();
        assert_eq!(event.client, "alice");
        assert_eq!(event.kind, ChangeKind::Registered);
    }
}
