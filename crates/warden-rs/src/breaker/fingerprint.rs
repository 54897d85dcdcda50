//! Approximate tool-argument fingerprints for repetition detection.
//!
//! Arguments are parsed as JSON, re-serialized with object keys sorted (so
//! `{"a":1,"b":2}` and `{"b":2,"a":1}` match), and hashed with FNV-1a.
//!
//! Fingerprints are approximate. Two distinct argument sets can
//! collide, and every argument string that fails to parse shares the single
//! [`FALLBACK_FINGERPRINT`], so unrelated unparseable calls to the same tool
//! count as repeats of each other. Fingerprinting never fails a tool call.

use serde_json::Value;
use tracing::debug;

/// Fingerprint assigned to arguments that cannot be parsed.
pub const FALLBACK_FINGERPRINT: u64 = 0;

/// Fingerprint a raw JSON argument string. Empty input is treated as `null`.
pub fn fingerprint_arguments(arguments: &str) -> u64 {
    let trimmed = arguments.trim();
    if trimmed.is_empty() {
        return fingerprint_value(&Value::Null);
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => fingerprint_value(&value),
        Err(e) => {
            debug!("unfingerprintable tool arguments, using fallback: {e}");
            FALLBACK_FINGERPRINT
        }
    }
}

/// Fingerprint an already-parsed argument value.
pub fn fingerprint_value(value: &Value) -> u64 {
    let mut canonical = String::new();
    write_canonical(value, &mut canonical);
    fnv1a(canonical.as_bytes())
}

/// Serialize with object keys in sorted order at every depth.
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, val)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(val, out);
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

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in bytes {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    // Keep the fallback value reserved for unparseable input.
    if hash == FALLBACK_FINGERPRINT { 1 } else { hash }
}
