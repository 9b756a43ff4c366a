//! Deterministic request fingerprints ("thumbprints").
//!
//! A fingerprint is derived from the normalized request only: the canonical
//! JSON text (object keys sorted, no insignificant whitespace) is hashed with
//! SHA-256 and the digest is folded into a name-based UUID, so the same
//! inputs map to the same resource id in every process.

use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::api::ResourceId;

/// Namespace for analysis resource ids.
pub const ANALYSIS_NAMESPACE: Uuid = Uuid::from_u128(0x6f1d_29a4_5b0e_4c8a_9f43_a2d1_7e5c_3b90);

/// Calculate the SHA-256 checksum of `content` as lowercase hex.
pub fn calculate_checksum(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Render a JSON value with object keys sorted at every level.
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
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                // Serializing a string cannot fail
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
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
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Fingerprint an already-normalized JSON value.
pub fn fingerprint_value(normalized: &Value) -> ResourceId {
    let checksum = calculate_checksum(&canonical_json(normalized));
    Uuid::new_v5(&ANALYSIS_NAMESPACE, checksum.as_bytes())
}
