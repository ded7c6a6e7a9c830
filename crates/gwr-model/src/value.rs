// SPDX-License-Identifier: MIT OR Apache-2.0
//! Recursive tagged value for schema-free configuration bags.
//!
//! Plugin `config`, vault `config`, and custom-entity payloads are opaque to
//! the reconciler: the control plane owns their schemas. [`ConfigValue`]
//! represents them as a JSON-shaped tree with *canonical* structural
//! equality: numbers compare by value, `null` entries in objects compare
//! equal to absent entries, and object keys are kept sorted.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A JSON-shaped configuration value with canonical equality.
#[derive(Debug, Clone)]
pub enum ConfigValue {
    /// JSON `null`.
    Null,
    /// JSON boolean.
    Bool(bool),
    /// JSON number (integer or float, compared by value).
    Number(Number),
    /// JSON string.
    String(String),
    /// JSON array.
    Array(Vec<ConfigValue>),
    /// JSON object with string keys, kept in sorted order.
    Object(BTreeMap<String, ConfigValue>),
}

/// A JSON number, integer or float.
///
/// Two numbers are equal when they denote the same value, regardless of
/// representation: `5` equals `5.0`.
#[derive(Debug, Clone, Copy)]
pub enum Number {
    /// Signed integer.
    Int(i64),
    /// Floating point.
    Float(f64),
}

impl Number {
    /// The value as an `f64` (lossy for integers beyond 2^53).
    #[must_use]
    pub fn as_f64(&self) -> f64 {
        match self {
            Self::Int(i) => *i as f64,
            Self::Float(f) => *f,
        }
    }

    /// The value as an `i64`, if it is an integer (or an integral float).
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Float(f) if f.fract() == 0.0 && f.is_finite() => Some(*f as i64),
            Self::Float(_) => None,
        }
    }
}

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a == b,
            _ => self.as_f64() == other.as_f64(),
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
        }
    }
}

impl ConfigValue {
    /// An empty object.
    #[must_use]
    pub fn object() -> Self {
        Self::Object(BTreeMap::new())
    }

    /// Returns `true` for [`ConfigValue::Null`].
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Borrow as a string slice, if this is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Borrow as a bool, if this is a boolean.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Borrow as an integer, if this is an integral number.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    /// Borrow the object map, if this is an object.
    #[must_use]
    pub fn as_object(&self) -> Option<&BTreeMap<String, ConfigValue>> {
        match self {
            Self::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Mutably borrow the object map, if this is an object.
    pub fn as_object_mut(&mut self) -> Option<&mut BTreeMap<String, ConfigValue>> {
        match self {
            Self::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Borrow the array elements, if this is an array.
    #[must_use]
    pub fn as_array(&self) -> Option<&[ConfigValue]> {
        match self {
            Self::Array(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    /// Look up a key in an object; `None` for non-objects and missing keys.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.as_object().and_then(|m| m.get(key))
    }

    /// Walk a path of keys through nested objects.
    #[must_use]
    pub fn get_path(&self, path: &[&str]) -> Option<&ConfigValue> {
        let mut cur = self;
        for key in path {
            cur = cur.get(key)?;
        }
        Some(cur)
    }

    /// Remove a key from an object, returning the removed value.
    pub fn remove(&mut self, key: &str) -> Option<ConfigValue> {
        self.as_object_mut().and_then(|m| m.remove(key))
    }

    /// Insert a key into an object. No-op (returning `false`) on non-objects.
    pub fn insert(&mut self, key: impl Into<String>, value: ConfigValue) -> bool {
        match self.as_object_mut() {
            Some(m) => {
                m.insert(key.into(), value);
                true
            }
            None => false,
        }
    }

    /// Convert into a [`serde_json::Value`].
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Number(Number::Int(i)) => serde_json::Value::from(*i),
            Self::Number(Number::Float(f)) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Self::String(s) => serde_json::Value::String(s.clone()),
            Self::Array(items) => {
                serde_json::Value::Array(items.iter().map(ConfigValue::to_json).collect())
            }
            Self::Object(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }

    /// Strip `null` entries from objects, recursively.
    ///
    /// This is the normal form used for comparison and rendering: a key
    /// explicitly set to `null` denotes the same state as the key being
    /// absent.
    #[must_use]
    pub fn without_nulls(&self) -> ConfigValue {
        match self {
            Self::Object(map) => Self::Object(
                map.iter()
                    .filter(|(_, v)| !v.is_null())
                    .map(|(k, v)| (k.clone(), v.without_nulls()))
                    .collect(),
            ),
            Self::Array(items) => {
                Self::Array(items.iter().map(ConfigValue::without_nulls).collect())
            }
            other => other.clone(),
        }
    }
}

/// Canonical equality: object keys by key set with `null` ≡ absent, numbers
/// by value, arrays positionally.
impl PartialEq for ConfigValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => {
                let keys: std::collections::BTreeSet<&String> =
                    a.keys().chain(b.keys()).collect();
                keys.into_iter().all(|k| {
                    match (a.get(k), b.get(k)) {
                        (Some(x), Some(y)) => x == y,
                        // null on one side, absent on the other
                        (Some(v), None) | (None, Some(v)) => v.is_null(),
                        (None, None) => true,
                    }
                })
            }
            _ => false,
        }
    }
}

impl From<serde_json::Value> for ConfigValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Number(Number::Int(i))
                } else {
                    Self::Number(Number::Float(n.as_f64().unwrap_or(0.0)))
                }
            }
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(items) => {
                Self::Array(items.into_iter().map(Into::into).collect())
            }
            serde_json::Value::Object(map) => {
                Self::Object(map.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

impl From<&serde_json::Value> for ConfigValue {
    fn from(value: &serde_json::Value) -> Self {
        value.clone().into()
    }
}

impl From<ConfigValue> for serde_json::Value {
    fn from(value: ConfigValue) -> Self {
        value.to_json()
    }
}

impl Serialize for ConfigValue {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ConfigValue {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Into::into)
    }
}

impl schemars::JsonSchema for ConfigValue {
    fn schema_name() -> std::borrow::Cow<'static, str> {
        "ConfigValue".into()
    }

    fn json_schema(_generator: &mut schemars::SchemaGenerator) -> schemars::Schema {
        // Any JSON value is acceptable; the control plane owns the schema.
        schemars::json_schema!(true)
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cv(v: serde_json::Value) -> ConfigValue {
        v.into()
    }

    #[test]
    fn scalar_equality() {
        assert_eq!(cv(json!(true)), cv(json!(true)));
        assert_eq!(cv(json!("x")), cv(json!("x")));
        assert_ne!(cv(json!("x")), cv(json!("y")));
        assert_ne!(cv(json!(true)), cv(json!("true")));
    }

    #[test]
    fn numbers_compare_by_value() {
        assert_eq!(cv(json!(5)), cv(json!(5.0)));
        assert_eq!(cv(json!(-1)), cv(json!(-1.0)));
        assert_ne!(cv(json!(5)), cv(json!(5.5)));
    }

    #[test]
    fn null_equals_absent_in_objects() {
        assert_eq!(cv(json!({"a": 1, "b": null})), cv(json!({"a": 1})));
        assert_eq!(cv(json!({})), cv(json!({"x": null})));
        assert_ne!(cv(json!({"a": 1, "b": 2})), cv(json!({"a": 1})));
    }

    #[test]
    fn null_not_equal_to_value() {
        assert_ne!(cv(json!({"a": null})), cv(json!({"a": 1})));
    }

    #[test]
    fn arrays_compare_positionally() {
        assert_eq!(cv(json!([1, 2])), cv(json!([1, 2])));
        assert_ne!(cv(json!([1, 2])), cv(json!([2, 1])));
        assert_ne!(cv(json!([1])), cv(json!([1, 1])));
    }

    #[test]
    fn nested_canonical_equality() {
        let a = cv(json!({"redis": {"host": "localhost", "port": 6379, "username": null}}));
        let b = cv(json!({"redis": {"host": "localhost", "port": 6379.0}}));
        assert_eq!(a, b);
    }

    #[test]
    fn without_nulls_strips_recursively() {
        let v = cv(json!({"a": null, "b": {"c": null, "d": 1}, "e": [null, 2]}));
        let stripped = v.without_nulls();
        assert_eq!(stripped, cv(json!({"b": {"d": 1}, "e": [null, 2]})));
        // Array elements are positional; nulls inside arrays are preserved.
        assert_eq!(stripped.get("e").unwrap().as_array().unwrap().len(), 2);
    }

    #[test]
    fn get_path_walks_nested_objects() {
        let v = cv(json!({"config": {"redis": {"host": "h"}}}));
        assert_eq!(
            v.get_path(&["config", "redis", "host"]).unwrap().as_str(),
            Some("h")
        );
        assert!(v.get_path(&["config", "missing"]).is_none());
    }

    #[test]
    fn insert_and_remove() {
        let mut v = ConfigValue::object();
        assert!(v.insert("k", cv(json!(1))));
        assert_eq!(v.get("k").unwrap().as_i64(), Some(1));
        assert_eq!(v.remove("k").unwrap().as_i64(), Some(1));
        assert!(v.get("k").is_none());

        let mut s = cv(json!("scalar"));
        assert!(!s.insert("k", ConfigValue::Null));
    }

    #[test]
    fn json_roundtrip_preserves_structure() {
        let original = json!({
            "minute": 20,
            "policy": "redis",
            "redis": {"host": "localhost", "port": 6379},
            "limits": [1, 2.5, "x", true, null]
        });
        let v: ConfigValue = original.clone().into();
        assert_eq!(v.to_json(), original);
    }

    #[test]
    fn serde_roundtrip() {
        let v = cv(json!({"a": [1, {"b": "c"}], "d": null}));
        let text = serde_json::to_string(&v).unwrap();
        let back: ConfigValue = serde_json::from_str(&text).unwrap();
        assert_eq!(back, v);
    }

    #[test]
    fn object_keys_iterate_sorted() {
        let v = cv(json!({"zeta": 1, "alpha": 2, "mid": 3}));
        let keys: Vec<&String> = v.as_object().unwrap().keys().collect();
        assert_eq!(keys, ["alpha", "mid", "zeta"]);
    }

    #[test]
    fn number_accessors() {
        assert_eq!(Number::Int(7).as_i64(), Some(7));
        assert_eq!(Number::Float(7.0).as_i64(), Some(7));
        assert_eq!(Number::Float(7.5).as_i64(), None);
        assert_eq!(Number::Int(2).as_f64(), 2.0);
    }
}
