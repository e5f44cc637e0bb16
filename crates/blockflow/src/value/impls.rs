//! Value trait implementations: constructors, extractors, From traits, PartialEq

use std::rc::Rc;

use indexmap::IndexMap;

use super::*;

// ═══════════════════════════════════════════════════════════════════
// Convenience Constructors
// ═══════════════════════════════════════════════════════════════════

impl Value {
    /// Create a string value
    pub fn str(s: impl AsRef<str>) -> Self {
        Value::Str(Rc::from(s.as_ref()))
    }

    /// Create a list value
    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(items))
    }

    /// Create a tuple value
    pub fn tuple(items: Vec<Value>) -> Self {
        Value::Tuple(Rc::new(items))
    }

    /// Create a dict value
    pub fn dict(entries: IndexMap<Key, Value>) -> Self {
        Value::Dict(Rc::new(entries))
    }

    /// Create a builtin function value
    pub fn builtin(func: BuiltinFn) -> Self {
        Value::Builtin(func)
    }

    // ═══════════════════════════════════════════════════════════════════
    // Type Predicates
    // ═══════════════════════════════════════════════════════════════════

    /// Check if value is `None`
    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    /// Check if value is numeric (bool, int or float)
    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Bool(_) | Value::Int(_) | Value::Float(_))
    }

    /// Check if value is callable
    pub fn is_callable(&self) -> bool {
        matches!(
            self,
            Value::Function(_) | Value::Builtin(_) | Value::BoundMethod(_)
        )
    }

    // ═══════════════════════════════════════════════════════════════════
    // Extractors (return Option for safe access)
    // ═══════════════════════════════════════════════════════════════════

    /// Extract an integer (bools count as 0/1)
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    /// Extract a float, widening integers
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(n) => Some(*n as f64),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// Extract a string slice
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Extract the items of a list or tuple
    pub fn as_slice(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) | Value::Tuple(items) => Some(items),
            _ => None,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════
// From Implementations
// ═══════════════════════════════════════════════════════════════════

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n as i64)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Int(n as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::str(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::list(items)
    }
}

impl From<Context> for Value {
    fn from(ctx: Context) -> Self {
        Value::Context(ctx)
    }
}

// ═══════════════════════════════════════════════════════════════════
// Equality
// ═══════════════════════════════════════════════════════════════════

impl PartialEq for Value {
    /// Host-language `==`: ints and floats compare numerically, containers
    /// compare element-wise, callables and contexts compare by identity.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                (*a as f64) == *b
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) | (Value::Tuple(a), Value::Tuple(b)) => {
                Rc::ptr_eq(a, b) || a == b
            }
            (Value::Dict(a), Value::Dict(b)) => {
                Rc::ptr_eq(a, b)
                    || (a.len() == b.len()
                        && a.iter().all(|(k, v)| b.get(k).is_some_and(|w| v == w)))
            }
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => Rc::ptr_eq(&a.func, &b.func),
            (Value::Module(a), Value::Module(b)) => Rc::ptr_eq(a, b),
            (Value::BoundMethod(a), Value::BoundMethod(b)) => {
                a.name == b.name && a.receiver == b.receiver
            }
            (Value::Context(a), Value::Context(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_equality_crosses_types() {
        assert_eq!(Value::Int(2), Value::Float(2.0));
        assert_ne!(Value::Int(2), Value::Float(2.5));
        assert_ne!(Value::Bool(true), Value::Int(1));
    }

    #[test]
    fn test_container_equality() {
        assert_eq!(
            Value::list(vec![1.into(), "a".into()]),
            Value::list(vec![1.into(), "a".into()])
        );
        assert_ne!(
            Value::list(vec![1.into()]),
            Value::tuple(vec![1.into()])
        );
        let mut a = IndexMap::new();
        a.insert(Key::from("x"), Value::Int(1));
        let mut b = IndexMap::new();
        b.insert(Key::from("x"), Value::Float(1.0));
        assert_eq!(Value::dict(a), Value::dict(b));
    }

    #[test]
    fn test_extractors() {
        assert_eq!(Value::Bool(true).as_int(), Some(1));
        assert_eq!(Value::Int(3).as_float(), Some(3.0));
        assert_eq!(Value::str("hi").as_str(), Some("hi"));
        assert!(Value::None.as_slice().is_none());
    }
}
