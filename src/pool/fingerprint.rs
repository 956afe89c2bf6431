// src/pool/fingerprint.rs
//! Deterministic pool lookup keys derived from resource configuration
//!
//! Two acquisitions with the same configuration options must land on the
//! same pooled handle, so the options value is serialized with all object
//! keys sorted recursively. Empty or absent options collapse to the
//! well-known shared fingerprint.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::{Map, Value};

/// Fingerprint used for handles created without configuration options
pub const SHARED_FINGERPRINT: &str = "shared";

/// Deterministic serialization of a resource's configuration options
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// The fingerprint of the default/shared handle
    pub fn shared() -> Self {
        Self(SHARED_FINGERPRINT.to_string())
    }

    /// Compute the fingerprint for a set of configuration options
    pub fn from_options(options: &Value) -> Self {
        if is_empty_options(options) {
            return Self::shared();
        }
        Self(canonicalize(options).to_string())
    }

    /// Whether this is the shared default fingerprint
    pub fn is_shared(&self) -> bool {
        self.0 == SHARED_FINGERPRINT
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn is_empty_options(options: &Value) -> bool {
    match options {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Rebuild the value with every object's keys in sorted order so that the
/// serialized form is independent of insertion order.
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, &Value> = map.iter().collect();
            let mut out = Map::with_capacity(sorted.len());
            for (key, value) in sorted {
                out.insert(key.clone(), canonicalize(value));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_empty_options_are_shared() {
        assert!(Fingerprint::from_options(&Value::Null).is_shared());
        assert!(Fingerprint::from_options(&json!({})).is_shared());
        assert!(!Fingerprint::from_options(&json!({"headless": true})).is_shared());
    }

    #[test]
    fn test_key_order_does_not_matter() {
        let a = Fingerprint::from_options(&json!({"viewport": "1280x720", "headless": true}));
        let b = Fingerprint::from_options(&json!({"headless": true, "viewport": "1280x720"}));
        assert_eq!(a, b);
    }

    #[test]
    fn test_nested_objects_are_canonicalized() {
        let a = Fingerprint::from_options(&json!({"proxy": {"port": 8080, "host": "a"}}));
        let b = Fingerprint::from_options(&json!({"proxy": {"host": "a", "port": 8080}}));
        assert_eq!(a, b);
    }

    #[test]
    fn test_different_values_differ() {
        let a = Fingerprint::from_options(&json!({"headless": true}));
        let b = Fingerprint::from_options(&json!({"headless": false}));
        assert_ne!(a, b);
    }

    #[test]
    fn test_array_order_matters() {
        let a = Fingerprint::from_options(&json!({"args": ["--a", "--b"]}));
        let b = Fingerprint::from_options(&json!({"args": ["--b", "--a"]}));
        assert_ne!(a, b);
    }

    proptest! {
        #[test]
        fn prop_fingerprint_independent_of_insertion_order(
            entries in proptest::collection::btree_map("[a-z]{1,8}", any::<i64>(), 1..8)
        ) {
            let mut forward = Map::new();
            for (key, value) in &entries {
                forward.insert(key.clone(), json!(value));
            }
            let mut reverse = Map::new();
            for (key, value) in entries.iter().rev() {
                reverse.insert(key.clone(), json!(value));
            }
            prop_assert_eq!(
                Fingerprint::from_options(&Value::Object(forward)),
                Fingerprint::from_options(&Value::Object(reverse))
            );
        }
    }
}
