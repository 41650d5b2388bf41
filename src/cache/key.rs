//! Query Key Module
//!
//! Structured query keys and their canonical, order-independent hash form.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// == Query Key ==
/// Caller-supplied structured identifier for a cached query.
///
/// An ordered sequence of JSON values. Object key order is irrelevant for
/// identity; array order is significant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryKey(Vec<Value>);

/// Builds a [`QueryKey`] from JSON-literal parts.
///
/// ```
/// use query_cache::query_key;
///
/// let key = query_key!["todos", { "page": 1, "done": false }];
/// assert_eq!(key.len(), 2);
/// ```
#[macro_export]
macro_rules! query_key {
    ($($part:tt),* $(,)?) => {
        $crate::cache::QueryKey::new(vec![$($crate::serde_json::json!($part)),*])
    };
}

impl QueryKey {
    /// Creates a key from an ordered sequence of parts.
    pub fn new<I, V>(parts: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self(parts.into_iter().map(Into::into).collect())
    }

    /// Returns the key parts in order.
    pub fn parts(&self) -> &[Value] {
        &self.0
    }

    /// Returns the number of parts.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the key has no parts.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the canonical hash of this key.
    pub fn hash(&self) -> NormalizedKey {
        hash_query_key(self)
    }

    /// Returns true if `prefix` is a structural subset of this key.
    ///
    /// Arrays are compared positionally and the prefix may be shorter.
    /// Objects match when every field of the prefix matches the field of the
    /// same name. Scalars compare by equality.
    pub fn partially_matches(&self, prefix: &QueryKey) -> bool {
        prefix.0.len() <= self.0.len()
            && prefix
                .0
                .iter()
                .zip(self.0.iter())
                .all(|(expected, actual)| partial_match(actual, expected))
    }
}

impl From<&str> for QueryKey {
    fn from(part: &str) -> Self {
        Self(vec![Value::from(part)])
    }
}

impl From<String> for QueryKey {
    fn from(part: String) -> Self {
        Self(vec![Value::from(part)])
    }
}

impl From<Vec<Value>> for QueryKey {
    fn from(parts: Vec<Value>) -> Self {
        Self(parts)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(hash_query_key(self).as_str())
    }
}

// == Normalized Key ==
/// Canonical comparison form of a [`QueryKey`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NormalizedKey(String);

impl NormalizedKey {
    /// Returns the canonical string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NormalizedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// == Normalization ==
/// Normalizes a query key into its canonical form.
///
/// The key is rendered as compact JSON with every object's fields sorted
/// recursively, so two keys that differ only in field insertion order hash
/// identically.
pub fn hash_query_key(key: &QueryKey) -> NormalizedKey {
    let canonical = Value::Array(key.0.iter().map(canonicalize).collect());
    NormalizedKey(canonical.to_string())
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut fields: Vec<(&String, &Value)> = map.iter().collect();
            fields.sort_by(|(a, _), (b, _)| a.cmp(b));

            let mut sorted = Map::with_capacity(fields.len());
            for (name, field) in fields {
                sorted.insert(name.clone(), canonicalize(field));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        scalar => scalar.clone(),
    }
}

fn partial_match(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Object(actual), Value::Object(expected)) => expected.iter().all(|(name, field)| {
            actual
                .get(name)
                .is_some_and(|candidate| partial_match(candidate, field))
        }),
        (Value::Array(actual), Value::Array(expected)) => {
            expected.len() <= actual.len()
                && expected
                    .iter()
                    .zip(actual.iter())
                    .all(|(field, candidate)| partial_match(candidate, field))
        }
        (actual, expected) => actual == expected,
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_hash_ignores_object_field_order() {
        let a = QueryKey::new(vec![json!("todos"), json!({ "page": 1, "status": "done" })]);

        let mut reordered = Map::new();
        reordered.insert("status".to_string(), json!("done"));
        reordered.insert("page".to_string(), json!(1));
        let b = QueryKey::new(vec![json!("todos"), Value::Object(reordered)]);

        assert_eq!(hash_query_key(&a), hash_query_key(&b));
    }

    #[test]
    fn test_hash_respects_array_order() {
        let a = query_key!["todos", [1, 2]];
        let b = query_key!["todos", [2, 1]];

        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn test_hash_sorts_nested_objects() {
        let a = query_key![{ "outer": { "b": 2, "a": 1 } }];
        assert_eq!(a.hash().as_str(), r#"[{"outer":{"a":1,"b":2}}]"#);
    }

    #[test]
    fn test_hash_distinguishes_scalar_types() {
        assert_ne!(query_key![1].hash(), query_key!["1"].hash());
    }

    #[test]
    fn test_from_str() {
        let key = QueryKey::from("user");
        assert_eq!(key.parts(), &[json!("user")]);
        assert_eq!(key.to_string(), r#"["user"]"#);
    }

    #[test]
    fn test_partial_match_prefix() {
        let key = query_key!["todos", { "page": 1, "done": false }];

        assert!(key.partially_matches(&query_key!["todos"]));
        assert!(key.partially_matches(&query_key!["todos", { "page": 1 }]));
        assert!(!key.partially_matches(&query_key!["todos", { "page": 2 }]));
        assert!(!key.partially_matches(&query_key!["users"]));
        assert!(key.partially_matches(&QueryKey::new(Vec::<Value>::new())));
    }

    #[test]
    fn test_partial_match_longer_prefix_fails() {
        let key = query_key!["todos"];
        assert!(!key.partially_matches(&query_key!["todos", 1]));
    }
}
