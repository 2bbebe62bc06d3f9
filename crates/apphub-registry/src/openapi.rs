use std::collections::BTreeMap;

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::RegistryError;

/// Resolves the Open Question in spec §9 ("an implementer should decide
/// [a canonical form], e.g. parse→canonical JSON") per SPEC_FULL.md §4.F:
/// parse as JSON or YAML, then re-serialize with map keys sorted via a
/// `BTreeMap`-backed pass (`serde_json`'s own maps are insertion-ordered,
/// so sorting has to happen before the final `to_vec`).
pub fn canonicalize(raw: &[u8]) -> Result<Vec<u8>, RegistryError> {
    let value: Value = serde_json::from_slice(raw)
        .or_else(|_| serde_yaml::from_slice::<Value>(raw))
        .map_err(|e| RegistryError::InvalidOpenapi(e.to_string()))?;
    let canonical = sort_keys(value);
    serde_json::to_vec(&canonical).map_err(|e| RegistryError::InvalidOpenapi(e.to_string()))
}

fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> =
                map.into_iter().map(|(k, v)| (k, sort_keys(v))).collect();
            Value::Object(sorted.into_iter().collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

pub fn hash(canonical: &[u8]) -> String {
    hex::encode(Sha256::digest(canonical))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_with_different_key_order_canonicalizes_identically() {
        let a = canonicalize(br#"{"b":1,"a":2}"#).unwrap();
        let b = canonicalize(br#"{"a":2,"b":1}"#).unwrap();
        assert_eq!(a, b);
        assert_eq!(hash(&a), hash(&b));
    }

    #[test]
    fn yaml_and_equivalent_json_hash_the_same() {
        let yaml = canonicalize(b"a: 1\nb:\n  - x\n  - y\n").unwrap();
        let json = canonicalize(br#"{"b":["x","y"],"a":1}"#).unwrap();
        assert_eq!(hash(&yaml), hash(&json));
    }

    #[test]
    fn nested_objects_are_sorted_recursively() {
        let canonical = canonicalize(br#"{"paths":{"/b":{},"/a":{}}}"#).unwrap();
        let text = String::from_utf8(canonical).unwrap();
        assert!(text.find("\"/a\"").unwrap() < text.find("\"/b\"").unwrap());
    }

    #[test]
    fn non_utf8_garbage_is_rejected() {
        let err = canonicalize(&[0xff, 0xfe, 0x00, 0x01]).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidOpenapi(_)));
    }
}
