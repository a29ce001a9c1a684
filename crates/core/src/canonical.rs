//! Canonical JSON encoding and content hashing.
//!
//! Used wherever a payload needs a deterministic byte representation: payload
//! deduplication (LEPH), integrity verification, idempotency-key derivation,
//! and the migration export/import file format. The same logical payload
//! must always produce the same bytes regardless of field insertion order.
//!
//! `serde_json::Value`'s object type is a `BTreeMap` (this crate does not
//! enable `serde_json`'s `preserve_order` feature), so keys are already
//! sorted; the default compact formatter already uses `,`/`:` separators and
//! never escapes non-ASCII characters. `to_canonical_string` exists mainly to
//! name the guarantee explicitly and keep call sites independent of that
//! `serde_json` configuration detail.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Render a JSON value as its canonical string form: keys sorted recursively,
/// minimal separators, UTF-8 with no ASCII escaping of non-ASCII characters.
pub fn to_canonical_string(value: &Value) -> String {
    serde_json::to_string(value).expect("Value serialization cannot fail")
}

/// Serialize any `Serialize` payload to its canonical JSON string.
pub fn canonical_json<T: Serialize>(data: &T) -> Result<String, serde_json::Error> {
    let value = serde_json::to_value(data)?;
    Ok(to_canonical_string(&value))
}

/// SHA-256 hex digest of a value's canonical JSON form.
pub fn compute_payload_hash(value: &Value) -> String {
    compute_bytes_hash(to_canonical_string(value).as_bytes())
}

/// SHA-256 hex digest of raw bytes.
pub fn compute_bytes_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Approximate the on-disk size of a payload if serialized to canonical JSON.
pub fn estimate_json_size(value: &Value) -> usize {
    to_canonical_string(value).len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonical_string_sorts_keys_and_uses_minimal_separators() {
        let value = json!({"b": 2, "a": 1});
        assert_eq!(to_canonical_string(&value), r#"{"a":1,"b":2}"#);
    }

    #[test]
    fn canonical_string_preserves_non_ascii() {
        let value = json!({"name": "caf\u{e9}"});
        assert!(to_canonical_string(&value).contains("café"));
    }

    #[test]
    fn hash_is_stable_across_key_order() {
        let a = json!({"a": 1, "b": 2});
        let b = json!({"b": 2, "a": 1});
        assert_eq!(compute_payload_hash(&a), compute_payload_hash(&b));
    }

    #[test]
    fn hash_changes_with_content() {
        let a = json!({"a": 1});
        let b = json!({"a": 2});
        assert_ne!(compute_payload_hash(&a), compute_payload_hash(&b));
    }
}
