//! Content hashing for document metadata.
//!
//! The digest is SHA-256 over a *canonical* JSON serialization: object keys
//! are emitted in sorted order at every nesting level and no insignificant
//! whitespace is produced.  Without a fixed serialization, re-verifying a
//! hash would depend on reproducing the original key order exactly.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Serialize a JSON value with recursively sorted object keys.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                // Key serialization cannot fail for a String.
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        // Scalars already have a single compact form.
        other => out.push_str(&other.to_string()),
    }
}

/// Compute the hex-encoded SHA-256 digest of a metadata payload.
pub fn hash_metadata(metadata: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_json(metadata).as_bytes());
    hex::encode(hasher.finalize())
}

/// Check a metadata payload against a previously stored digest.
pub fn verify_hash(metadata: &Value, stored_hash: &str) -> bool {
    hash_metadata(metadata) == stored_hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn hash_is_deterministic() {
        let m = json!({"bill_of_lading": "BL-123", "weight_kg": 1200});
        assert_eq!(hash_metadata(&m), hash_metadata(&m));
    }

    #[test]
    fn hash_is_sensitive_to_content() {
        let a = json!({"a": 1});
        let b = json!({"a": 2});
        let c = json!({"b": 1});
        assert_ne!(hash_metadata(&a), hash_metadata(&b));
        assert_ne!(hash_metadata(&a), hash_metadata(&c));
    }

    #[test]
    fn canonical_form_ignores_key_order() {
        let a: Value = serde_json::from_str(r#"{"b": 2, "a": {"y": 1, "x": 0}}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"a": {"x": 0, "y": 1}, "b": 2}"#).unwrap();
        assert_eq!(canonical_json(&a), canonical_json(&b));
        assert_eq!(hash_metadata(&a), hash_metadata(&b));
    }

    #[test]
    fn canonical_form_is_compact_and_sorted() {
        let v = json!({"z": [1, 2], "a": "text"});
        assert_eq!(canonical_json(&v), r#"{"a":"text","z":[1,2]}"#);
    }

    #[test]
    fn verify_hash_matches_only_original_payload() {
        let m = json!({"a": 1});
        let stored = hash_metadata(&m);
        assert!(verify_hash(&m, &stored));
        assert!(!verify_hash(&json!({"a": 1, "b": 2}), &stored));
        assert!(!verify_hash(&m, "deadbeef"));
    }
}
