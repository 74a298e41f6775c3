//! Debounced file watcher that drives `reload(source=Watch)`.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use notify_debouncer_mini::{new_debouncer, DebouncedEventKind};
use tracing::{error, warn};

use crate::provider::{CatalogProvider, ReloadSource};

const DEBOUNCE: Duration = Duration::from_millis(200);

/// Spawn a background task that watches the catalog file's parent
/// directory and calls `provider.reload(Watch)` whenever the file itself
/// changes, after debouncing bursts of events for 200 ms.
///
/// Only events whose cleaned path equals the configured catalog path cause
/// a reload — the watcher necessarily watches the parent
/// directory (editors often replace a file via rename-into-place, which
/// `notify` only reports at the directory level), so this filter is what
/// keeps unrelated sibling-file churn from triggering spurious reloads.
///
/// Returns the debouncer handle; dropping it stops the watch.
pub fn watch_catalog_file(
    provider: Arc<CatalogProvider>,
    path: &Path,
) -> notify::Result<notify_debouncer_mini::Debouncer<notify::RecommendedWatcher>> {
    let target = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    let watch_dir = target.parent().map(Path::to_path_buf).unwrap_or_else(|| target.clone());

    let mut debouncer = new_debouncer(DEBOUNCE, move |result| match result {
        Ok(events) => {
            let relevant = events.iter().any(|event| {
                event.kind != DebouncedEventKind::AnyContinuous
                    && event
                        .path
                        .canonicalize()
                        .map(|p| p == target)
                        .unwrap_or(false)
            });
            if !relevant {
                return;
            }
            let provider = provider.clone();
            tokio::spawn(async move {
                if let Err(err) = provider.reload(ReloadSource::Watch).await {
                    warn!(error = %err, "watch-triggered catalog reload failed");
                }
            });
        }
        Err(err) => error!(error = %err, "catalog file watcher error"),
    })?;

    debouncer
        .watcher()
        .watch(&watch_dir, notify::RecursiveMode::NonRecursive)?;

    Ok(debouncer)
}
