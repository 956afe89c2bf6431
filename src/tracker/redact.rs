// src/tracker/redact.rs
//! Recursive redaction of secret-bearing parameter values
//!
//! Tool parameters are stored on tracked operations and may end up in the
//! stats snapshot on disk, so anything that looks like a credential is
//! replaced before storage. Matching is by key name, case-insensitive,
//! substring: `apiKey`, `AUTH_HEADER`, and `db_password` all redact.

use serde_json::Value;

/// Replacement written over redacted values
pub const REDACTED: &str = "[REDACTED]";

/// Key-name fragments that mark a value as secret-bearing
const SECRET_MARKERS: [&str; 6] = ["password", "token", "auth", "key", "secret", "credential"];

/// Whether a parameter key names a secret
pub fn is_sensitive_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    SECRET_MARKERS.iter().any(|marker| key.contains(marker))
}

/// Return a copy of `value` with all secret-bearing values redacted
///
/// Objects are walked recursively; arrays are walked element-wise.
/// Scalars pass through untouched, since only key names identify secrets.
pub fn redact_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (key, value) in map {
                if is_sensitive_key(key) {
                    out.insert(key.clone(), Value::String(REDACTED.to_string()));
                } else {
                    out.insert(key.clone(), redact_value(value));
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact_value).collect()),
        other => other.clone(),
    }
}
