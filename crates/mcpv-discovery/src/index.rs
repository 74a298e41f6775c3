//! Per-spec federation item caches, refreshed whenever a discovery refresh
//! runs against a downstream server, and served as a cached fallback while
//! that server is starting or suspended.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use mcpv_types::spec::SpecKey;
use tokio::sync::broadcast;

/// Items captured for one spec, plus when they were captured and whether
/// the server was `Ready` at capture time.
#[derive(Debug, Clone)]
pub struct CachedItems<T> {
    /// The items themselves, unsorted and unfiltered.
    pub items: Vec<T>,
    /// When this entry was last refreshed.
    pub cached_at: DateTime<Utc>,
    /// Whether the server was `Ready` when these items were captured; `false`
    /// marks this entry as a stale fallback being served while the server is
    /// starting or suspended.
    pub fresh: bool,
}

/// A per-spec cache of one federation item kind (tools, resources, or
/// prompts), with a change-notification channel for live watches.
pub struct TypedIndex<T> {
    entries: DashMap<SpecKey, CachedItems<T>>,
    changes: broadcast::Sender<SpecKey>,
}

impl<T: Clone> TypedIndex<T> {
    /// An empty index whose change channel buffers up to `capacity` pending
    /// notifications per slow subscriber before dropping the oldest.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (changes, _) = broadcast::channel(capacity);
        Self {
            entries: DashMap::new(),
            changes,
        }
    }

    /// Replace the cached items for `spec_key` and notify subscribers.
    pub fn publish(&self, spec_key: SpecKey, items: Vec<T>, fresh: bool) {
        self.entries.insert(
            spec_key.clone(),
            CachedItems {
                items,
                cached_at: Utc::now(),
                fresh,
            },
        );
        let _ = self.changes.send(spec_key);
    }

    /// The cached entry for one spec, if any has been published.
    #[must_use]
    pub fn get(&self, spec_key: &SpecKey) -> Option<CachedItems<T>> {
        self.entries.get(spec_key).map(|e| e.value().clone())
    }

    /// All items across the given visible specs, flattened.
    #[must_use]
    pub fn items_for(&self, visible: &std::collections::BTreeSet<SpecKey>) -> Vec<T> {
        visible
            .iter()
            .filter_map(|key| self.entries.get(key))
            .flat_map(|entry| entry.value().items.clone())
            .collect()
    }

    /// Subscribe to per-spec refresh notifications.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SpecKey> {
        self.changes.subscribe()
    }
}
