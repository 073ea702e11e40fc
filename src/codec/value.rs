//! Dynamic structured values and their MessagePack encoding.
//!
//! Frame bodies are self-describing MessagePack documents whose top level is
//! always a map. [`Value`] is the in-memory shape of such a document and
//! [`ValueCodec`] moves it to and from bytes.
//!
//! # Example
//!
//! ```
//! use oneme_client::codec::{Value, ValueCodec};
//!
//! let value = Value::map([("phone", Value::from("+70000000000")), ("attempt", Value::from(1))]);
//! let bytes = ValueCodec::encode(&value);
//! assert_eq!(ValueCodec::decode(&bytes).unwrap(), value);
//! ```

use std::fmt;

use rmpv::Value as Wire;

use crate::error::{OnemeError, Result};

/// Key used when a decoded top-level value is not a map.
pub const WRAPPED_VALUE_KEY: &str = "value";

/// Deepest nesting [`ValueCodec`] decodes, as measured by [`Value::depth`].
pub const MAX_DEPTH: usize = 128;

/// A dynamically typed payload value.
///
/// Map entries keep their insertion order and always have text keys.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Binary(Vec<u8>),
    Array(Vec<Value>),
    Map(Vec<(String, Value)>),
}

impl Value {
    /// Build a map, stringifying every key.
    pub fn map<K, V, I>(entries: I) -> Self
    where
        K: ToString,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Value::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.into()))
                .collect(),
        )
    }

    /// Build an array from anything convertible to values.
    pub fn array<V, I>(items: I) -> Self
    where
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        Value::Array(items.into_iter().map(Into::into).collect())
    }

    /// Stringification fallback for types with no native representation.
    ///
    /// The type is lost on the wire: the peer sees plain text.
    pub fn display<T: fmt::Display + ?Sized>(value: &T) -> Self {
        let text = value.to_string();
        tracing::debug!(%text, "encoding value through its Display form");
        Value::Text(text)
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Float view; integers widen.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Binary(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&[(String, Value)]> {
        match self {
            Value::Map(entries) => Some(entries),
            _ => None,
        }
    }

    /// Look up a map entry by key. First match wins.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map()?
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    fn to_wire(&self) -> Wire {
        match self {
            Value::Nil => Wire::Nil,
            Value::Bool(b) => Wire::Boolean(*b),
            Value::Int(n) => Wire::Integer((*n).into()),
            Value::Float(f) => Wire::F64(*f),
            Value::Text(s) => Wire::from(s.as_str()),
            Value::Binary(b) => Wire::Binary(b.clone()),
            Value::Array(items) => Wire::Array(items.iter().map(Value::to_wire).collect()),
            Value::Map(entries) => Wire::Map(
                entries
                    .iter()
                    .map(|(k, v)| (Wire::from(k.as_str()), v.to_wire()))
                    .collect(),
            ),
        }
    }

    fn from_wire(wire: Wire) -> Result<Self> {
        Ok(match wire {
            Wire::Nil => Value::Nil,
            Wire::Boolean(b) => Value::Bool(b),
            Wire::Integer(n) => match (n.as_i64(), n.as_u64()) {
                (Some(signed), _) => Value::Int(signed),
                // Above i64::MAX: keep the digits rather than wrap.
                (None, Some(unsigned)) => Value::Text(unsigned.to_string()),
                (None, None) => {
                    return Err(OnemeError::MalformedValue(format!(
                        "integer out of range: {n:?}"
                    )))
                }
            },
            Wire::F32(f) => Value::Float(f64::from(f)),
            Wire::F64(f) => Value::Float(f),
            Wire::String(s) => Value::Text(
                s.into_str()
                    .ok_or_else(|| OnemeError::MalformedValue("text is not UTF-8".to_string()))?,
            ),
            Wire::Binary(b) => Value::Binary(b),
            Wire::Array(items) => Value::Array(
                items
                    .into_iter()
                    .map(Value::from_wire)
                    .collect::<Result<Vec<_>>>()?,
            ),
            Wire::Map(entries) => {
                let mut out = Vec::with_capacity(entries.len());
                for (k, v) in entries {
                    out.push((Value::from_wire(k)?.into_key(), Value::from_wire(v)?));
                }
                Value::Map(out)
            }
            Wire::Ext(_, data) => Value::Binary(data),
        })
    }

    /// Nesting depth counting the value itself: a scalar is 1, `[[1]]` is 3.
    pub fn depth(&self) -> usize {
        let children = match self {
            Value::Array(items) => items.iter().map(Value::depth).max(),
            Value::Map(entries) => entries.iter().map(|(_, v)| v.depth()).max(),
            _ => return 1,
        };
        1 + children.unwrap_or(0)
    }

    fn into_key(self) -> String {
        match self {
            Value::Text(s) => s,
            other => other.to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Text(s) => f.write_str(s),
            Value::Binary(b) => write!(f, "<{} bytes>", b.len()),
            Value::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Map(entries) => {
                f.write_str("{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}={v}")?;
                }
                f.write_str("}")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

macro_rules! impl_from_int {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Value {
            fn from(n: $ty) -> Self {
                Value::Int(i64::from(n))
            }
        })*
    };
}

impl_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        i64::try_from(n).map_or_else(|_| Value::Text(n.to_string()), Value::Int)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::from(n as u64)
    }
}

impl From<f32> for Value {
    fn from(f: f32) -> Self {
        Value::Float(f64::from(f))
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

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Value::Binary(b.to_vec())
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Binary(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Value::Nil, Into::into)
    }
}

/// MessagePack codec for [`Value`] trees.
pub struct ValueCodec;

impl ValueCodec {
    /// Encode a value. Integers use the smallest MessagePack width, floats are 64-bit.
    ///
    /// Encoding never fails, but a value deeper than [`MAX_DEPTH`] will not
    /// decode again.
    pub fn encode(value: &Value) -> Vec<u8> {
        let depth = value.depth();
        if depth > MAX_DEPTH {
            tracing::warn!(depth, max = MAX_DEPTH, "encoding value too deep to decode");
        }
        let mut buf = Vec::new();
        rmpv::encode::write_value(&mut buf, &value.to_wire())
            .expect("writing MessagePack into a Vec cannot fail");
        buf
    }

    /// Decode a frame body.
    ///
    /// A top-level value that is not a map comes back wrapped as
    /// `{"value": <decoded>}` so callers can always use key access.
    ///
    /// # Errors
    ///
    /// Returns `MalformedValue` on truncated or inconsistent input, or when
    /// nesting exceeds [`MAX_DEPTH`].
    pub fn decode(bytes: &[u8]) -> Result<Value> {
        match Self::decode_raw(bytes)? {
            map @ Value::Map(_) => Ok(map),
            other => Ok(Value::Map(vec![(WRAPPED_VALUE_KEY.to_string(), other)])),
        }
    }

    /// Decode a single value without the top-level map guarantee.
    pub fn decode_raw(bytes: &[u8]) -> Result<Value> {
        let mut cursor = bytes;
        let wire = rmpv::decode::read_value_with_max_depth(&mut cursor, MAX_DEPTH)
            .map_err(|e| OnemeError::MalformedValue(e.to_string()))?;
        if !cursor.is_empty() {
            tracing::trace!(trailing = cursor.len(), "ignoring bytes after value");
        }
        Value::from_wire(wire)
    }
}
