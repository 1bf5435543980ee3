//! Cache key generation.

use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Content-addressed key: `"{service}:{sha256(service:canonical_params)}"`.
///
/// Object keys are sorted recursively before hashing, so two parameter sets
/// that differ only in field order map to the same key. Array order is part
/// of the content and is preserved.
pub fn cache_key<P: Serialize + ?Sized>(service: &str, params: &P) -> String {
    let value = serde_json::to_value(params).unwrap_or(Value::Null);
    cache_key_from_value(service, &value)
}

pub fn cache_key_from_value(service: &str, params: &Value) -> String {
    let canonical = canonical_json(params);
    let mut hasher = Sha256::new();
    hasher.update(service.as_bytes());
    hasher.update(b":");
    hasher.update(canonical.as_bytes());
    let hash: String = hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect();
    format!("{}:{}", service, hash)
}

/// Serializes with lexicographically sorted object keys at every depth.
pub fn canonical_json(value: &Value) -> String {
    serde_json::to_string(&sort_keys(value)).unwrap_or_default()
}

fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for k in keys {
                sorted.insert(k.clone(), sort_keys(&map[k]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}
