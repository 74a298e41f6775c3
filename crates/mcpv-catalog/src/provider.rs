//! The catalog provider: atomic snapshot cell, single-writer reload,
//! subscriber fan-out.

use std::path::PathBuf;
use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::Utc;
use mcpv_types::catalog::{CatalogDiff, CatalogState};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::error::CatalogResult;
use crate::loader::load_from_path;

/// Where a reload was triggered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadSource {
    /// An explicit caller-initiated reload (RPC/CLI).
    Manual,
    /// The debounced file watcher.
    Watch,
}

/// One published catalog change, handed to every subscriber.
#[derive(Clone)]
pub struct CatalogUpdate {
    /// The newly published snapshot.
    pub snapshot: Arc<CatalogState>,
    /// What changed versus the previous snapshot.
    pub diff: Arc<CatalogDiff>,
    /// What triggered this reload.
    pub source: ReloadSource,
}

struct Subscriber {
    sender: mpsc::Sender<CatalogUpdate>,
}

/// Process-wide, versioned catalog state: a lock-free atomic read cell plus
/// a single-writer reload path.
pub struct CatalogProvider {
    path: PathBuf,
    cell: ArcSwap<CatalogState>,
    subscribers: Mutex<Vec<Subscriber>>,
    reload_lock: Mutex<()>,
}

impl CatalogProvider {
    /// Construct a provider over `path`, performing the first load
    /// synchronously so the provider never observes an unvalidated state.
    ///
    /// # Errors
    ///
    /// Returns the loader's [`crate::error::CatalogError`] if the initial
    /// load fails; callers typically treat this as fatal at startup.
    pub fn load(path: PathBuf) -> CatalogResult<Self> {
        let initial = load_from_path(&path, 0)?;
        Ok(Self {
            path,
            cell: ArcSwap::from_pointee(initial),
            subscribers: Mutex::new(Vec::new()),
            reload_lock: Mutex::new(()),
        })
    }

    /// Lock-free read of the current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<CatalogState> {
        self.cell.load_full()
    }

    /// Subscribe to future catalog updates. The returned channel has
    /// capacity 1 and does not replay history — a late subscriber only
    /// sees updates published after it subscribed.
    pub async fn watch(&self) -> mpsc::Receiver<CatalogUpdate> {
        let (sender, receiver) = mpsc::channel(1);
        self.subscribers.lock().await.push(Subscriber { sender });
        receiver
    }

    /// Drive the single-writer reload operation: load, parse, validate,
    /// diff, and — if non-empty — swap the cell and fan out to
    /// subscribers.
    ///
    /// On a load/parse/validate error the previous snapshot remains live;
    /// the error is returned to the caller. A revision is never skipped on
    /// failure because the candidate snapshot that failed is simply
    /// discarded before any revision number is computed from it again.
    ///
    /// # Errors
    ///
    /// Propagates the loader's error. The previous snapshot remains the
    /// published one.
    pub async fn reload(&self, source: ReloadSource) -> CatalogResult<Option<CatalogDiff>> {
        let _guard = self.reload_lock.lock().await;
        let prev = self.cell.load_full();

        let next = match load_from_path(&self.path, prev.revision) {
            Ok(state) => state,
            Err(err) => {
                warn!(error = %err, ?source, "catalog reload failed, keeping previous snapshot");
                return Err(err);
            }
        };

        let diff = CatalogDiff::compute(&prev, &next);
        if diff.is_empty() {
            debug!(?source, "catalog reload produced no changes, discarding candidate");
            return Ok(None);
        }

        let next = Arc::new(next);
        self.cell.store(next.clone());
        info!(
            revision = next.revision,
            added = diff.added.len(),
            removed = diff.removed.len(),
            changed = diff.changed.len(),
            ?source,
            "catalog reloaded"
        );

        self.broadcast(CatalogUpdate {
            snapshot: next,
            diff: Arc::new(diff.clone()),
            source,
        })
        .await;

        Ok(Some(diff))
    }

    async fn broadcast(&self, update: CatalogUpdate) {
        let mut subscribers = self.subscribers.lock().await;
        subscribers.retain(|sub| match sub.sender.try_send(update.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => true,
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_catalog(dir: &tempfile::TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("catalog.yaml");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(body.as_bytes()).unwrap();
        path
    }

    const BASE: &str = r#"
servers:
  - name: a
    transport: stdio
    command: demo
    protocol_version: "2025-11-25"
    max_concurrent: 1
  - name: b
    transport: stdio
    command: demo
    protocol_version: "2025-11-25"
    max_concurrent: 1
"#;

    const NEXT: &str = r#"
servers:
  - name: a
    transport: stdio
    command: demo
    protocol_version: "2025-11-25"
    max_concurrent: 1
  - name: c
    transport: stdio
    command: demo
    protocol_version: "2025-11-25"
    max_concurrent: 1
"#;

    #[tokio::test]
    async fn hot_reload_diff_publishes_single_update_with_added_and_removed_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_catalog(&dir, BASE);
        let provider = CatalogProvider::load(path.clone()).unwrap();
        assert_eq!(provider.snapshot().revision, 1);

        let mut sub = provider.watch().await;

        std::fs::write(&path, NEXT).unwrap();
        let diff = provider.reload(ReloadSource::Manual).await.unwrap().unwrap();
        assert_eq!(diff.added, vec![mcpv_types::spec::SpecKey::from("c")]);
        assert_eq!(diff.removed, vec![mcpv_types::spec::SpecKey::from("b")]);

        let update = sub.try_recv().unwrap();
        assert_eq!(update.snapshot.revision, 2);
        assert_eq!(provider.snapshot().revision, 2);
    }

    #[tokio::test]
    async fn reload_with_no_changes_discards_candidate_and_does_not_broadcast() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_catalog(&dir, BASE);
        let provider = CatalogProvider::load(path.clone()).unwrap();
        let mut sub = provider.watch().await;

        let result = provider.reload(ReloadSource::Manual).await.unwrap();
        assert!(result.is_none());
        assert_eq!(provider.snapshot().revision, 1);
        assert!(sub.try_recv().is_err());
    }

    #[tokio::test]
    async fn failed_reload_keeps_previous_snapshot_live() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_catalog(&dir, BASE);
        let provider = CatalogProvider::load(path.clone()).unwrap();

        std::fs::write(&path, "servers: [unterminated").unwrap();
        let err = provider.reload(ReloadSource::Manual).await;
        assert!(err.is_err());
        assert_eq!(provider.snapshot().revision, 1);
    }
}
