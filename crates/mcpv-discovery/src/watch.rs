//! Live per-subscriber discovery watches.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use mcpv_registry::events::ClientChangeEvent;
use mcpv_types::client::ClientEntry;
use mcpv_types::snapshot::PrimaryKeyed;
use mcpv_types::spec::{ServerSpec, SpecKey};
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tracing::warn;

use crate::index::TypedIndex;
use crate::listing::Listing;
use crate::pagination::{paginate, PAGE_SIZE};
use crate::visibility::effective_visible_specs;

/// Spawn the merge task for one caller's live listing: one task per
/// subscriber, merging the server-side snapshot channel, the registry
/// change channel, and cancellation via a `select`.
///
/// The returned [`watch::Receiver`] always holds the most recently computed
/// [`Listing`]; a subscriber that falls behind a burst of refreshes simply
/// skips the intermediate values, per `tokio::sync::watch`'s
/// keep-latest-only semantics: a non-blocking send where the most recent
/// value wins, so slow subscribers drop intermediate snapshots but always
/// eventually see the latest.
///
/// The task exits when every sender side (the index's change channel and the
/// client-registry's change channel) is dropped, or when the returned
/// receiver is dropped.
pub fn watch_listing<T>(
    index: Arc<TypedIndex<T>>,
    mut registry_changes: broadcast::Receiver<ClientChangeEvent>,
    caller: ClientEntry,
    specs_provider: impl Fn() -> BTreeMap<SpecKey, ServerSpec> + Send + 'static,
    ready_specs_provider: impl Fn() -> BTreeSet<SpecKey> + Send + 'static,
) -> watch::Receiver<Option<Listing<T>>>
where
    T: PrimaryKeyed + Clone + Serialize + Send + Sync + 'static,
{
    let initial = compute_listing(&index, &caller, &specs_provider(), &ready_specs_provider());
    let (tx, rx) = watch::channel(initial);
    let mut index_changes = index.subscribe();
    let caller_name = caller.name.clone();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                changed = index_changes.recv() => {
                    match changed {
                        Ok(_spec_key) => {
                            let listing = compute_listing(&index, &caller, &specs_provider(), &ready_specs_provider());
                            if tx.send(listing).is_err() {
                                return;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(broadcast::error::RecvError::Closed) => return,
                    }
                }
                changed = registry_changes.recv() => {
                    match changed {
                        Ok(event) if event.client == caller_name => {
                            let listing = compute_listing(&index, &caller, &specs_provider(), &ready_specs_provider());
                            if tx.send(listing).is_err() {
                                return;
                            }
                        }
                        Ok(_) => continue,
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(broadcast::error::RecvError::Closed) => return,
                    }
                }
                () = tx.closed() => {
                    return;
                }
            }
        }
    });

    rx
}

fn compute_listing<T>(
    index: &TypedIndex<T>,
    caller: &ClientEntry,
    specs: &BTreeMap<SpecKey, ServerSpec>,
    ready_specs: &BTreeSet<SpecKey>,
) -> Option<Listing<T>>
where
    T: PrimaryKeyed + Clone + Serialize,
{
    let visible = effective_visible_specs(caller, specs);
    let items = index.items_for(&visible);
    let etag = match mcpv_capability::compute_etag(&items) {
        Ok(etag) => etag,
        Err(err) => {
            warn!(caller = %caller.name, error = %err, "failed to compute watch listing etag");
            return None;
        }
    };
    let page = paginate(items, None, PAGE_SIZE).ok()?;
    let stale = visible
        .iter()
        .filter(|spec_key| !ready_specs.contains(*spec_key))
        .filter_map(|spec_key| index.get(spec_key).map(|entry| (spec_key.clone(), entry.cached_at)))
        .collect();
    Some(Listing { etag, page, stale })
}
