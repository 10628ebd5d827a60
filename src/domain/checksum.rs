//! Content checksums for configuration entities.
//!
//! Documents are encoded canonically (object keys sorted at every depth)
//! before hashing, so two documents with the same content hash identically
//! no matter how their maps were built.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Top-level bookkeeping fields written by the database, not by authors.
pub const VOLATILE_FIELDS: &[&str] = &["createdAt", "updatedAt", "__v"];

/// Hex-encoded SHA-256 over the canonical encoding of `document`.
pub fn content_hash(document: &Value) -> String {
    let mut encoded = String::new();
    match document {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map
                .keys()
                .filter(|key| !VOLATILE_FIELDS.contains(&key.as_str()))
                .collect();
            keys.sort();
            write_object(&mut encoded, keys.into_iter().map(|key| (key, &map[key])));
        }
        other => write_canonical(&mut encoded, other),
    }

    let mut hasher = Sha256::new();
    hasher.update(encoded.as_bytes());
    hex::encode(hasher.finalize())
}

/// Canonical JSON text for `value`.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(&mut out, value);
    out
}

fn write_canonical(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(flag) => out.push_str(if *flag { "true" } else { "false" }),
        Value::Number(number) => out.push_str(&number.to_string()),
        Value::String(text) => write_string(out, text),
        Value::Array(items) => {
            out.push('[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_canonical(out, item);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            write_object(out, keys.into_iter().map(|key| (key, &map[key])));
        }
    }
}

fn write_object<'a>(out: &mut String, entries: impl Iterator<Item = (&'a String, &'a Value)>) {
    out.push('{');
    for (index, (key, value)) in entries.enumerate() {
        if index > 0 {
            out.push(',');
        }
        write_string(out, key);
        out.push(':');
        write_canonical(out, value);
    }
    out.push('}');
}

fn write_string(out: &mut String, text: &str) {
    out.push_str(&Value::String(text.to_owned()).to_string());
}
