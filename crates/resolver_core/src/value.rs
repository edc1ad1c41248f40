//! Typed property values decoded at the store-adapter boundary.
//!
//! The graph store keeps nested structures as JSON-encoded strings. Decoding
//! happens exactly once, in [`PropValue::from_stored`]; everything above the
//! adapter works with the tagged union and never re-guesses a value's type.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A decoded property value.
///
/// Maps are ordered so that serializing a value (for hashing or rendering)
/// always yields the same byte sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<PropValue>),
    Map(BTreeMap<String, PropValue>),
}

impl PropValue {
    /// Decode a raw store value.
    ///
    /// Strings that open with `{` or `[` and parse as JSON are replaced by
    /// the decoded structure; any other string is kept verbatim. Lists and
    /// maps are walked so that encoded strings nested in them decode too.
    /// The decoded structure itself is taken as-is.
    pub fn from_stored(raw: serde_json::Value) -> Self {
        match raw {
            serde_json::Value::String(s) => decode_encoded_string(s),
            serde_json::Value::Array(items) => {
                PropValue::List(items.into_iter().map(PropValue::from_stored).collect())
            }
            serde_json::Value::Object(map) => PropValue::Map(
                map.into_iter()
                    .map(|(k, v)| (k, PropValue::from_stored(v)))
                    .collect(),
            ),
            scalar => Self::from_json(scalar),
        }
    }

    /// Structural conversion without string decoding, at any depth.
    pub fn from_json(raw: serde_json::Value) -> Self {
        match raw {
            serde_json::Value::Null => PropValue::Null,
            serde_json::Value::Bool(b) => PropValue::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => PropValue::Int(i),
                None => PropValue::Float(n.as_f64().unwrap_or_default()),
            },
            serde_json::Value::String(s) => PropValue::String(s),
            serde_json::Value::Array(items) => {
                PropValue::List(items.into_iter().map(PropValue::from_json).collect())
            }
            serde_json::Value::Object(map) => PropValue::Map(
                map.into_iter()
                    .map(|(k, v)| (k, PropValue::from_json(v)))
                    .collect(),
            ),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            PropValue::Null => serde_json::Value::Null,
            PropValue::Bool(b) => serde_json::Value::Bool(*b),
            PropValue::Int(i) => serde_json::Value::from(*i),
            PropValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            PropValue::String(s) => serde_json::Value::String(s.clone()),
            PropValue::List(items) => {
                serde_json::Value::Array(items.iter().map(PropValue::to_json).collect())
            }
            PropValue::Map(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, PropValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PropValue::Int(i) => Some(*i),
            PropValue::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[PropValue]> {
        match self {
            PropValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, PropValue>> {
        match self {
            PropValue::Map(map) => Some(map),
            _ => None,
        }
    }
}

impl From<&str> for PropValue {
    fn from(s: &str) -> Self {
        PropValue::String(s.to_string())
    }
}

impl From<String> for PropValue {
    fn from(s: String) -> Self {
        PropValue::String(s)
    }
}

impl From<i64> for PropValue {
    fn from(i: i64) -> Self {
        PropValue::Int(i)
    }
}

impl From<bool> for PropValue {
    fn from(b: bool) -> Self {
        PropValue::Bool(b)
    }
}

impl<T: Into<PropValue>> From<Vec<T>> for PropValue {
    fn from(items: Vec<T>) -> Self {
        PropValue::List(items.into_iter().map(Into::into).collect())
    }
}

fn decode_encoded_string(s: String) -> PropValue {
    if matches!(s.as_bytes().first(), Some(b'{') | Some(b'[')) {
        if let Ok(parsed) = serde_json::from_str::<serde_json::Value>(&s) {
            return PropValue::from_json(parsed);
        }
    }
    PropValue::String(s)
}

/// Decode every property of a stored object.
pub fn decode_properties(
    raw: serde_json::Map<String, serde_json::Value>,
) -> BTreeMap<String, PropValue> {
    raw.into_iter()
        .map(|(k, v)| (k, PropValue::from_stored(v)))
        .collect()
}
