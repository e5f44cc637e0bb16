//! Display and Debug implementations for Value
//!
//! `Display` is the host language's `str()`, `Debug` is its `repr()`.

use std::fmt;

use super::*;
use crate::ast::unparse::{float_literal, string_literal};

impl Value {
    /// The `repr()` of this value.
    pub fn repr(&self) -> String {
        format!("{:?}", self)
    }
}

fn write_items(f: &mut fmt::Formatter<'_>, items: &[Value]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{:?}", item)?;
    }
    Ok(())
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "None"),
            Value::Bool(true) => write!(f, "True"),
            Value::Bool(false) => write!(f, "False"),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(x) if x.is_nan() => write!(f, "nan"),
            Value::Float(x) if x.is_infinite() => {
                write!(f, "{}", if *x > 0.0 { "inf" } else { "-inf" })
            }
            Value::Float(x) => write!(f, "{}", float_literal(*x)),
            Value::Str(s) => write!(f, "{}", string_literal(s)),

            Value::List(items) => {
                write!(f, "[")?;
                write_items(f, items)?;
                write!(f, "]")
            }

            Value::Tuple(items) => {
                write!(f, "(")?;
                write_items(f, items)?;
                if items.len() == 1 {
                    write!(f, ",")?; // Single-element tuple needs trailing comma
                }
                write!(f, ")")
            }

            Value::Dict(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{:?}: {:?}", k.to_value(), v)?;
                }
                write!(f, "}}")
            }

            Value::Function(func) => write!(f, "<function {}>", func.name()),
            Value::Builtin(b) => write!(f, "<built-in function {}>", b.name),
            Value::Module(m) => write!(f, "<module '{}'>", m.name),
            Value::BoundMethod(m) => {
                write!(f, "<method {} of {}>", m.name, m.receiver.type_name())
            }
            Value::Context(ctx) => write!(f, "<context '{}'>", ctx.name()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{}", s),
            other => write!(f, "{:?}", other),
        }
    }
}
