//! # Deterministic thunk identity keys.
//!
//! [`derive_key`] produces the string identity used for deduplication,
//! caching, and loader tracking: `"name"` when there is no payload, or
//! `"name|hash8"` where `hash8` is an 8-hex-digit hash of the payload's
//! canonical JSON encoding.
//!
//! ## Rules
//! - Object keys are sorted recursively before encoding; array order is preserved.
//! - Two structurally-equal payloads always derive the same key.
//! - The hash is FNV-1a/32. It is an identity scheme, **not** a security
//!   primitive.
//! - Runs on every dispatch; pure and allocation-cheap.

use serde_json::{Map, Value};

/// Derives the identity key for a thunk invocation.
///
/// Returns `name` unchanged when `payload` is `None`, otherwise
/// `name|hash8` computed from the deep-sorted JSON encoding.
///
/// # Example
/// ```
/// use serde_json::json;
/// use thunkvisor::derive_key;
///
/// assert_eq!(derive_key("fetch", None), "fetch");
///
/// let a = json!({ "b": 1, "a": 2 });
/// let b = json!({ "a": 2, "b": 1 });
/// assert_eq!(derive_key("fetch", Some(&a)), derive_key("fetch", Some(&b)));
/// ```
pub fn derive_key(name: &str, payload: Option<&Value>) -> String {
    match payload {
        None => name.to_string(),
        Some(value) => {
            let encoded = deep_sort(value).to_string();
            format!("{name}|{:08x}", fnv1a(encoded.as_bytes()))
        }
    }
}

/// Recursively sorts object keys; array order is preserved.
///
/// `serde_json::Map` keeps insertion order, so inserting in sorted order
/// yields a canonical encoding from the default serializer.
fn deep_sort(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();
            let mut sorted = Map::with_capacity(map.len());
            for k in keys {
                sorted.insert(k.clone(), deep_sort(&map[k]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(deep_sort).collect()),
        other => other.clone(),
    }
}

/// FNV-1a, 32-bit.
fn fnv1a(bytes: &[u8]) -> u32 {
    const OFFSET: u32 = 0x811c_9dc5;
    const PRIME: u32 = 0x0100_0193;

    let mut hash = OFFSET;
    for b in bytes {
        hash ^= u32::from(*b);
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_no_payload_is_bare_name() {
        assert_eq!(derive_key("load", None), "load");
    }

    #[test]
    fn test_key_has_eight_hex_digits() {
        let key = derive_key("load", Some(&json!({ "id": "1" })));
        let (name, hash) = key.split_once('|').expect("separator");
        assert_eq!(name, "load");
        assert_eq!(hash.len(), 8);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_key_order_insensitive_for_objects() {
        let a = json!({ "x": { "b": 1, "a": [1, 2] }, "y": null });
        let b = json!({ "y": null, "x": { "a": [1, 2], "b": 1 } });
        assert_eq!(derive_key("k", Some(&a)), derive_key("k", Some(&b)));
    }

    #[test]
    fn test_key_array_order_sensitive() {
        let a = json!({ "ids": [1, 2] });
        let b = json!({ "ids": [2, 1] });
        assert_ne!(derive_key("k", Some(&a)), derive_key("k", Some(&b)));
    }

    #[test]
    fn test_different_payloads_differ() {
        let a = json!({ "id": "1" });
        let b = json!({ "id": "2" });
        assert_ne!(derive_key("k", Some(&a)), derive_key("k", Some(&b)));
    }

    #[test]
    fn test_stable_across_calls() {
        let payload = json!({ "page": 3, "filter": "open" });
        assert_eq!(
            derive_key("list", Some(&payload)),
            derive_key("list", Some(&payload)),
        );
    }
}
