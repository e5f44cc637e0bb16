//! Hashable dictionary keys

use std::rc::Rc;

use super::Value;
use crate::error::EvalError;

/// A value usable as a dict key.
///
/// Only immutable scalars, strings and tuples of those can be keys. Floats
/// with an integral value hash like the equal integer; other floats are
/// rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    /// `None`
    None,
    /// Boolean
    Bool(bool),
    /// Integer (also integral floats)
    Int(i64),
    /// String
    Str(Rc<str>),
    /// Tuple of keys
    Tuple(Vec<Key>),
}

impl Key {
    /// Convert a value into a key, failing for unhashable values.
    pub fn from_value(value: &Value) -> Result<Self, EvalError> {
        match value {
            Value::None => Ok(Key::None),
            Value::Bool(b) => Ok(Key::Bool(*b)),
            Value::Int(n) => Ok(Key::Int(*n)),
            Value::Float(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => Ok(Key::Int(*f as i64)),
            Value::Str(s) => Ok(Key::Str(s.clone())),
            Value::Tuple(items) => Ok(Key::Tuple(
                items.iter().map(Key::from_value).collect::<Result<_, _>>()?,
            )),
            other => Err(EvalError::TypeError {
                message: format!("unhashable type: '{}'", other.type_name()),
            }),
        }
    }

    /// Convert back into a value.
    pub fn to_value(&self) -> Value {
        match self {
            Key::None => Value::None,
            Key::Bool(b) => Value::Bool(*b),
            Key::Int(n) => Value::Int(*n),
            Key::Str(s) => Value::Str(s.clone()),
            Key::Tuple(items) => Value::tuple(items.iter().map(Key::to_value).collect()),
        }
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Str(Rc::from(s))
    }
}
