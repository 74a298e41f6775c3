//! ETag computation for federation snapshots: two semantically equal item
//! lists hash equal, and reordering items with distinct primary keys
//! changes the hash.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::canonical::canonical_json_bytes;

/// Compute `hex(SHA256(canonical_json(items)))` for an ordered item list.
///
/// # Errors
///
/// Returns a [`serde_json::Error`] if `items` cannot be serialized.
pub fn compute_etag<T: Serialize>(items: &[T]) -> Result<String, serde_json::Error> {
    let bytes = canonical_json_bytes(&items)?;
    let digest = Sha256::digest(&bytes);
    Ok(hex::encode(digest))
}

/// ETag of an empty item list, cached as a const-evaluable helper for
/// [`mcpv_types::Snapshot::empty`].
#[must_use]
pub fn empty_etag() -> String {
    let digest = Sha256::digest(b"[]");
    hex::encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;
    use serde_json::json;

    #[derive(Serialize)]
    struct Item {
        name: String,
        value: i32,
    }

    #[test]
    fn semantically_equal_lists_hash_identically() {
        let a = vec![Item { name: "a".into(), value: 1 }];
        let b = vec![Item { name: "a".into(), value: 1 }];
        assert_eq!(compute_etag(&a).unwrap(), compute_etag(&b).unwrap());
    }

    #[test]
    fn reordering_items_with_unique_keys_changes_etag() {
        let a = vec![
            Item { name: "a".into(), value: 1 },
            Item { name: "b".into(), value: 2 },
        ];
        let b = vec![
            Item { name: "b".into(), value: 2 },
            Item { name: "a".into(), value: 1 },
        ];
        assert_ne!(compute_etag(&a).unwrap(), compute_etag(&b).unwrap());
    }

    #[test]
    fn key_order_in_each_item_does_not_affect_etag() {
        let a = json!([{"b": 1, "a": 2}]);
        let b = json!([{"a": 2, "b": 1}]);
        assert_eq!(compute_etag(&vec![a]).unwrap(), compute_etag(&vec![b]).unwrap());
    }

    #[test]
    fn empty_list_matches_empty_etag_helper() {
        let empty: Vec<Item> = Vec::new();
        assert_eq!(compute_etag(&empty).unwrap(), empty_etag());
    }
}
