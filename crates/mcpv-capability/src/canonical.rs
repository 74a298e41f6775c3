//! Canonical JSON form used as the hashing input for snapshot ETags.
//!
//! The workspace enables `serde_json`'s `preserve_order` feature (object
//! keys serialize in insertion order, which the gateway/discovery surfaces
//! rely on for readable payloads) — canonicalization must therefore
//! explicitly re-sort every object's keys by key before hashing. Arrays keep
//! producer order: item order is semantically meaningful to a federation
//! snapshot, so only maps are normalized.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

/// Recursively rewrite `value` so every JSON object's keys are sorted
/// lexicographically, leaving array order untouched.
#[must_use]
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, Value> =
                map.iter().map(|(k, v)| (k, canonicalize(v))).collect();
            let mut out = serde_json::Map::new();
            for (k, v) in sorted {
                out.insert(k.clone(), v);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Serialize `value` to its canonical JSON bytes: sorted-key objects,
/// no whitespace.
///
/// # Errors
///
/// Returns a [`serde_json::Error`] if `value` cannot be serialized.
pub fn canonical_json_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    let as_value = serde_json::to_value(value)?;
    let canonical = canonicalize(&as_value);
    serde_json::to_vec(&canonical)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn object_keys_are_sorted_regardless_of_insertion_order() {
        let a = json!({"b": 1, "a": 2});
        let b = json!({"a": 2, "b": 1});
        assert_eq!(
            serde_json::to_vec(&canonicalize(&a)).unwrap(),
            serde_json::to_vec(&canonicalize(&b)).unwrap()
        );
    }

    #[test]
    fn array_order_is_preserved() {
        let value = json!([3, 1, 2]);
        let canonical = canonicalize(&value);
        assert_eq!(canonical, json!([3, 1, 2]));
    }

    #[test]
    fn nested_objects_inside_arrays_are_canonicalized() {
        let value = json!([{"z": 1, "a": 2}]);
        let canonical = canonicalize(&value);
        let bytes = serde_json::to_vec(&canonical).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.find("\"a\"").unwrap() < text.find("\"z\"").unwrap());
    }
}
