//! Runtime value types for bound parameters and result cells.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// A runtime value bound into a statement or read back from a result cell.
///
/// Floats compare and hash by bit pattern so that values can key a map
/// (see [`crate::result::KeyedRecords`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// SQL NULL.
    Null,
    /// Boolean value.
    Bool(bool),
    /// 64-bit signed integer.
    Int64(i64),
    /// 64-bit floating point.
    Float64(f64),
    /// UTF-8 string.
    String(String),
    /// Binary data.
    Bytes(Vec<u8>),
}

impl Value {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Try to get as bool.
    ///
    /// Integers are accepted as well, since SQLite stores booleans as 0/1.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Int64(i) => Some(*i != 0),
            _ => None,
        }
    }

    /// Try to get as i64.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int64(i) => Some(*i),
            Value::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    /// Try to get as f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float64(f) => Some(*f),
            Value::Int64(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Try to get as string reference.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as bytes reference.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Get as an owned string, treating NULL and empty strings as absent.
    pub fn to_non_empty_string(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::String(s) if s.is_empty() => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int64(a), Value::Int64(b)) => a == b,
            (Value::Float64(a), Value::Float64(b)) => a.to_bits() == b.to_bits(),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Bool(b) => b.hash(state),
            Value::Int64(i) => i.hash(state),
            Value::Float64(f) => f.to_bits().hash(state),
            Value::String(s) => s.hash(state),
            Value::Bytes(b) => b.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int64(i) => write!(f, "{}", i),
            Value::Float64(v) => write!(f, "{}", v),
            Value::String(s) => write!(f, "{}", s),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

// Conversion implementations
impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int64(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Value::Null,
        }
    }
}

/// Positional bound parameters for a statement.
///
/// A single scalar converts into a one-element parameter list, so callers can
/// pass `42`, `"alice"` or `vec![...]` interchangeably.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(Vec<Value>);

impl Params {
    /// No parameters.
    pub fn none() -> Self {
        Self(Vec::new())
    }

    /// Number of bound values.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if no values are bound.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Borrow the bound values.
    pub fn as_slice(&self) -> &[Value] {
        &self.0
    }

    /// Take the bound values.
    pub fn into_vec(self) -> Vec<Value> {
        self.0
    }
}

impl From<()> for Params {
    fn from(_: ()) -> Self {
        Params::none()
    }
}

impl From<Vec<Value>> for Params {
    fn from(v: Vec<Value>) -> Self {
        Params(v)
    }
}

impl From<&[Value]> for Params {
    fn from(v: &[Value]) -> Self {
        Params(v.to_vec())
    }
}

impl<const N: usize> From<[Value; N]> for Params {
    fn from(v: [Value; N]) -> Self {
        Params(v.into())
    }
}

impl From<Value> for Params {
    fn from(v: Value) -> Self {
        Params(vec![v])
    }
}

impl From<i64> for Params {
    fn from(v: i64) -> Self {
        Params(vec![Value::from(v)])
    }
}

impl From<i32> for Params {
    fn from(v: i32) -> Self {
        Params(vec![Value::from(v)])
    }
}

impl From<&str> for Params {
    fn from(v: &str) -> Self {
        Params(vec![Value::from(v)])
    }
}

impl From<String> for Params {
    fn from(v: String) -> Self {
        Params(vec![Value::from(v)])
    }
}

impl From<bool> for Params {
    fn from(v: bool) -> Self {
        Params(vec![Value::from(v)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_value_accessors() {
        assert!(Value::Null.is_null());
        assert!(!Value::Bool(true).is_null());

        assert_eq!(Value::Bool(true).as_bool(), Some(true));
        assert_eq!(Value::Int64(0).as_bool(), Some(false));
        assert_eq!(Value::Int64(100).as_i64(), Some(100));
        assert_eq!(Value::Int64(2).as_f64(), Some(2.0));
        assert_eq!(Value::String("hello".into()).as_str(), Some("hello"));
        assert_eq!(Value::Bytes(vec![1, 2, 3]).as_bytes(), Some(&[1, 2, 3][..]));
    }

    #[test]
    fn test_non_empty_string() {
        assert_eq!(Value::Null.to_non_empty_string(), None);
        assert_eq!(Value::String(String::new()).to_non_empty_string(), None);
        assert_eq!(
            Value::String("Oxford".into()).to_non_empty_string(),
            Some("Oxford".to_string())
        );
        assert_eq!(Value::Int64(7).to_non_empty_string(), Some("7".to_string()));
    }

    #[test]
    fn test_value_conversions() {
        let v: Value = true.into();
        assert_eq!(v, Value::Bool(true));

        let v: Value = 42i32.into();
        assert_eq!(v, Value::Int64(42));

        let v: Value = "hello".into();
        assert_eq!(v, Value::String("hello".into()));

        let v: Value = None::<i64>.into();
        assert_eq!(v, Value::Null);
    }

    #[test]
    fn test_values_usable_as_keys() {
        let mut set = HashSet::new();
        set.insert(Value::Int64(1));
        set.insert(Value::Int64(1));
        set.insert(Value::Float64(1.5));
        set.insert(Value::Float64(1.5));
        set.insert(Value::String("1".into()));
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_scalar_params_become_single_element() {
        let p: Params = 42i64.into();
        assert_eq!(p.as_slice(), &[Value::Int64(42)]);

        let p: Params = "alice".into();
        assert_eq!(p.len(), 1);

        let p: Params = ().into();
        assert!(p.is_empty());

        let p: Params = vec![Value::Int64(1), Value::from("only_private")].into();
        assert_eq!(p.len(), 2);
    }

    #[test]
    fn test_value_json() {
        let json = serde_json::to_string(&vec![
            Value::Null,
            Value::Int64(3),
            Value::String("x".into()),
        ])
        .unwrap();
        assert_eq!(json, r#"[null,3,"x"]"#);
    }
}
