//! Runtime values of the host language

mod callable;
mod display;
mod impls;
mod json;
mod key;

pub use callable::{Arity, BoundMethod, BuiltinFn, BuiltinFnPtr, FunctionValue, Kwargs, ModuleValue};
pub use key::Key;

use std::rc::Rc;

use indexmap::IndexMap;

use crate::context::Context;

/// Variables of a scope, in insertion order.
pub type Namespace = IndexMap<String, Value>;

/// Runtime value representation.
///
/// Compound values are reference counted and copied on write, so a value
/// stored in a context never changes underneath it. Mutating methods
/// produce a new value and rebind the receiver.
#[derive(Clone)]
pub enum Value {
    // ═══════════════════════════════════════════════════════════════════
    // Scalars
    // ═══════════════════════════════════════════════════════════════════
    /// `None`
    None,

    /// `True` / `False`
    Bool(bool),

    /// 64-bit signed integer
    Int(i64),

    /// 64-bit float
    Float(f64),

    /// Immutable string
    Str(Rc<str>),

    // ═══════════════════════════════════════════════════════════════════
    // Containers
    // ═══════════════════════════════════════════════════════════════════
    /// Mutable sequence
    List(Rc<Vec<Value>>),

    /// Immutable sequence
    Tuple(Rc<Vec<Value>>),

    /// Insertion-ordered mapping
    Dict(Rc<IndexMap<Key, Value>>),

    // ═══════════════════════════════════════════════════════════════════
    // Callables and namespaces
    // ═══════════════════════════════════════════════════════════════════
    /// User `def`
    Function(Rc<FunctionValue>),

    /// Native function
    Builtin(BuiltinFn),

    /// Imported module
    Module(Rc<ModuleValue>),

    /// Method looked up on a value, not yet called
    BoundMethod(Rc<BoundMethod>),

    /// Nested context; its keys are reachable as attributes
    Context(Context),
}

impl Value {
    /// Name of the value's type, as `type()` reports it.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Dict(_) => "dict",
            Value::Function(_) => "function",
            Value::Builtin(_) => "builtin_function",
            Value::Module(_) => "module",
            Value::BoundMethod(_) => "method",
            Value::Context(_) => "context",
        }
    }

    /// Truthiness: empty containers, zero and `None` are false.
    pub fn truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) | Value::Tuple(items) => !items.is_empty(),
            Value::Dict(map) => !map.is_empty(),
            Value::Context(ctx) => !ctx.is_empty(),
            _ => true,
        }
    }

    /// Whether a change of this value is reported as an in-place
    /// modification (containers) rather than a rebinding (scalars).
    pub fn is_array_like(&self) -> bool {
        matches!(self, Value::List(_) | Value::Tuple(_) | Value::Dict(_))
    }
}
