//! Runtime values for loading/dumping (codec representation).

use indexmap::IndexMap;

use crate::error::{Error, Result};
use crate::structure::Struct;

/// Field name → value, in declaration order.
pub type Values = IndexMap<String, Value>;

/// Lookups for compute functions and deciders.
pub trait ValuesExt {
    /// The value of `name`, or [`Error::MissingRequiredValue`] so best-effort
    /// resolution can retry once `name` is known.
    fn require(&self, name: &str) -> Result<&Value>;
}

impl ValuesExt for Values {
    fn require(&self, name: &str) -> Result<&Value> {
        self.get(name).ok_or_else(|| Error::MissingRequiredValue {
            field: name.to_string(),
        })
    }
}

/// A single loaded value (scalar or compound).
#[derive(Debug, Clone)]
pub enum Value {
    /// The field's null sentinel was read, or null is to be written.
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Bytes(Vec<u8>),
    Str(String),
    List(Vec<Value>),
    Map(Values),
    Struct(Box<Struct>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::UInt(x) => Some(*x),
            Value::Int(x) => u64::try_from(*x).ok(),
            Value::Bool(b) => Some(u64::from(*b)),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(x) => Some(*x),
            Value::UInt(x) => i64::try_from(*x).ok(),
            Value::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    /// Integer view wide enough for both signed and unsigned 64-bit values.
    pub fn as_i128(&self) -> Option<i128> {
        match self {
            Value::Int(x) => Some(i128::from(*x)),
            Value::UInt(x) => Some(i128::from(*x)),
            Value::Bool(b) => Some(i128::from(*b)),
            _ => None,
        }
    }

    pub fn as_usize(&self) -> Option<usize> {
        self.as_u64().and_then(|n| usize::try_from(n).ok())
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(x) => Some(*x),
            Value::Int(x) => Some(*x as f64),
            Value::UInt(x) => Some(*x as f64),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Values> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&Struct> {
        match self {
            Value::Struct(s) => Some(s),
            _ => None,
        }
    }

    /// Element count for sequences, byte/char count for blobs and text.
    pub fn len(&self) -> Option<usize> {
        match self {
            Value::Bytes(b) => Some(b.len()),
            Value::Str(s) => Some(s.chars().count()),
            Value::List(v) => Some(v.len()),
            Value::Map(m) => Some(m.len()),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }

    /// Expand nested structs into maps of their defined values, recursively.
    pub fn to_plain(&self) -> Value {
        match self {
            Value::Struct(s) => Value::Map(
                s.defined()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_plain()))
                    .collect(),
            ),
            Value::Map(m) => Value::Map(m.iter().map(|(k, v)| (k.clone(), v.to_plain())).collect()),
            Value::List(items) => Value::List(items.iter().map(Value::to_plain).collect()),
            other => other.clone(),
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) | Value::UInt(_) => "integer",
            Value::Float(_) => "float",
            Value::Bytes(_) => "bytes",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Struct(_) => "struct",
        }
    }

    /// Short description used in error messages.
    pub(crate) fn describe(&self) -> String {
        match self {
            Value::Bytes(b) => format!("bytes of length {}", b.len()),
            Value::Str(s) => format!("string {s:?}"),
            Value::List(v) => format!("list of {} element(s)", v.len()),
            Value::Int(n) => n.to_string(),
            Value::UInt(n) => n.to_string(),
            other => other.type_name().to_string(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Struct(_), _) | (_, Value::Struct(_)) => self.to_plain() == other.to_plain(),
            (a, b) => match (a.as_i128(), b.as_i128()) {
                (Some(x), Some(y)) => {
                    !matches!(a, Value::Bool(_)) && !matches!(b, Value::Bool(_)) && x == y
                }
                _ => false,
            },
        }
    }
}

macro_rules! from_unsigned {
    ($($t:ty),*) => {$(
        impl From<$t> for Value {
            fn from(x: $t) -> Self {
                Value::UInt(x as u64)
            }
        }
    )*};
}

macro_rules! from_signed {
    ($($t:ty),*) => {$(
        impl From<$t> for Value {
            fn from(x: $t) -> Self {
                Value::Int(x as i64)
            }
        }
    )*};
}

from_unsigned!(u8, u16, u32, u64, usize);
from_signed!(i8, i16, i32, i64, isize);

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f32> for Value {
    fn from(x: f32) -> Self {
        Value::Float(f64::from(x))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
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

impl<const N: usize> From<&[u8; N]> for Value {
    fn from(b: &[u8; N]) -> Self {
        Value::Bytes(b.to_vec())
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl From<Values> for Value {
    fn from(m: Values) -> Self {
        Value::Map(m)
    }
}

impl From<Struct> for Value {
    fn from(s: Struct) -> Self {
        Value::Struct(Box::new(s))
    }
}

/// Build a [`Values`] map: `values! { "magic" => b"BM", "size" => 100u32 }`.
#[macro_export]
macro_rules! values {
    () => { $crate::Values::new() };
    ($($name:expr => $value:expr),+ $(,)?) => {{
        let mut map = $crate::Values::new();
        $( map.insert(::std::string::String::from($name), $crate::Value::from($value)); )+
        map
    }};
}

#[cfg(feature = "serde")]
impl serde::Serialize for Value {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(n) => serializer.serialize_i64(*n),
            Value::UInt(n) => serializer.serialize_u64(*n),
            Value::Float(x) => serializer.serialize_f64(*x),
            Value::Bytes(b) => serializer.serialize_bytes(b),
            Value::Str(s) => serializer.serialize_str(s),
            Value::List(items) => items.serialize(serializer),
            Value::Map(m) => m.serialize(serializer),
            Value::Struct(s) => s.defined().serialize(serializer),
        }
    }
}
