//! Canonical JSON and the payload checksum.
//!
//! Rules (shared with the Studio importer):
//! - object keys sorted by UTF-8 byte order, recursively,
//! - arrays kept in element order,
//! - no insignificant whitespace,
//! - strings and numbers rendered exactly as `serde_json` renders them.
//!
//! The checksum is lowercase hex SHA-256 over the canonical JSON of the
//! payload with `provenance.checksumSha256` removed.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Field excluded from the hashed body.
pub const CHECKSUM_FIELD: &str = "checksumSha256";
pub const PROVENANCE_FIELD: &str = "provenance";

pub fn to_canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
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
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key.as_str()], out);
            }
            out.push('}');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Checksum of a payload value; any existing checksum field is ignored.
pub fn payload_checksum(payload: &Value) -> String {
    let mut body = payload.clone();
    if let Some(provenance) = body
        .get_mut(PROVENANCE_FIELD)
        .and_then(Value::as_object_mut)
    {
        provenance.remove(CHECKSUM_FIELD);
    }
    sha256_hex(to_canonical_json(&body).as_bytes())
}
