//! Dynamic record value type.

use std::collections::BTreeMap;

use crate::error::{CodecError, CodecResult};

/// A dynamic property value.
///
/// Records are loosely typed: each property holds one of these. Map keys
/// are always text, mirroring the JSON-like documents the backend stores.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed integer.
    Integer(i64),
    /// Floating point number.
    Float(f64),
    /// Text string (UTF-8).
    Text(String),
    /// Raw binary payload.
    Bytes(Vec<u8>),
    /// Array of values.
    Array(Vec<Value>),
    /// Map of text keys to values, ordered by key.
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Create a map value from key-value pairs.
    pub fn map<K, I>(pairs: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Map(pairs.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Get this value as a boolean, if it is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get this value as an integer, if it is one.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Get this value as a float, if it is one.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Get this value as bytes, if it is a byte string.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Get this value as a string, if it is a text string.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Get this value as an array, if it is one.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Get this value as a map, if it is one.
    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Look up a key in this map value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map().and_then(|m| m.get(key))
    }

    /// Returns true if a byte string appears anywhere inside this value.
    pub fn contains_bytes(&self) -> bool {
        match self {
            Value::Bytes(_) => true,
            Value::Array(items) => items.iter().any(Value::contains_bytes),
            Value::Map(entries) => entries.values().any(Value::contains_bytes),
            _ => false,
        }
    }

    /// Short name of the variant, used in validation messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Bytes(_) => "bytes",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
        }
    }

    /// Convert into the `ciborium` value tree used for encoding.
    pub(crate) fn to_cbor(&self) -> ciborium::Value {
        match self {
            Value::Null => ciborium::Value::Null,
            Value::Bool(b) => ciborium::Value::Bool(*b),
            Value::Integer(n) => ciborium::Value::Integer((*n).into()),
            Value::Float(f) => ciborium::Value::Float(*f),
            Value::Text(s) => ciborium::Value::Text(s.clone()),
            Value::Bytes(b) => ciborium::Value::Bytes(b.clone()),
            Value::Array(items) => ciborium::Value::Array(items.iter().map(Value::to_cbor).collect()),
            Value::Map(entries) => ciborium::Value::Map(
                entries
                    .iter()
                    .map(|(k, v)| (ciborium::Value::Text(k.clone()), v.to_cbor()))
                    .collect(),
            ),
        }
    }

    /// Convert from a decoded `ciborium` value tree.
    pub(crate) fn from_cbor(value: ciborium::Value) -> CodecResult<Self> {
        match value {
            ciborium::Value::Null => Ok(Value::Null),
            ciborium::Value::Bool(b) => Ok(Value::Bool(b)),
            ciborium::Value::Integer(n) => i64::try_from(n)
                .map(Value::Integer)
                .map_err(|_| CodecError::IntegerOverflow),
            ciborium::Value::Float(f) => Ok(Value::Float(f)),
            ciborium::Value::Text(s) => Ok(Value::Text(s)),
            ciborium::Value::Bytes(b) => Ok(Value::Bytes(b)),
            ciborium::Value::Array(items) => items
                .into_iter()
                .map(Value::from_cbor)
                .collect::<CodecResult<Vec<_>>>()
                .map(Value::Array),
            ciborium::Value::Map(pairs) => {
                let mut entries = BTreeMap::new();
                for (k, v) in pairs {
                    let key = match k {
                        ciborium::Value::Text(key) => key,
                        _ => return Err(CodecError::invalid_structure("map keys must be text")),
                    };
                    entries.insert(key, Value::from_cbor(v)?);
                }
                Ok(Value::Map(entries))
            }
            // Tags carry no meaning for records; keep the inner item.
            ciborium::Value::Tag(_, inner) => Value::from_cbor(*inner),
            _ => Err(CodecError::unsupported_type("unknown")),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Value::Bytes(b.to_vec())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}
