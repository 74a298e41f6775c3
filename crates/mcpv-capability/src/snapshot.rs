//! Building [`mcpv_types::Snapshot`] values with their ETag recomputed over
//! the final, post-filter item list so clients can cheaply detect
//! membership changes.

use mcpv_types::Snapshot;
use serde::Serialize;

use crate::etag::compute_etag;

/// Build a [`Snapshot`] from an already-ordered item list, computing its
/// ETag over exactly those items.
///
/// # Errors
///
/// Returns a [`serde_json::Error`] if `items` cannot be canonically
/// serialized.
pub fn build_snapshot<T: Serialize + Clone>(items: Vec<T>) -> Result<Snapshot<T>, serde_json::Error> {
    let etag = compute_etag(&items)?;
    Ok(Snapshot { etag, items })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcpv_types::ToolItem;
    use mcpv_types::SpecKey;

    fn tool(name: &str) -> ToolItem {
        ToolItem {
            name: name.into(),
            spec_key: SpecKey::from("srv"),
            server_name: "srv".into(),
            definition: serde_json::json!({}),
        }
    }

    #[test]
    fn snapshot_etag_matches_direct_compute_etag() {
        let items = vec![tool("a"), tool("b")];
        let snapshot = build_snapshot(items.clone()).unwrap();
        assert_eq!(snapshot.etag, compute_etag(&items).unwrap());
        assert_eq!(snapshot.items.len(), 2);
    }
}
