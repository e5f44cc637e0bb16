//! Callable value types: functions, builtins, modules and bound methods

use std::cell::RefCell;
use std::rc::Rc;

use super::{Namespace, Value};
use crate::ast::FunctionDef;
use crate::error::EvalError;
use crate::interp::Interpreter;

/// Keyword arguments in call order
pub type Kwargs = Vec<(String, Value)>;

/// Type alias for builtin function pointers to reduce complexity
pub type BuiltinFnPtr = Rc<dyn Fn(&Interpreter, Vec<Value>, Kwargs) -> Result<Value, EvalError>>;

/// A user-defined function.
///
/// Stores the definition directly for interpretation, together with the
/// globals of the module it was defined in.
#[derive(Debug)]
pub struct FunctionValue {
    /// The parsed definition
    pub def: Rc<FunctionDef>,

    /// Evaluated default for each parameter (`None` when it has none)
    pub defaults: Vec<Option<Value>>,

    /// Globals of the defining module
    pub globals: Rc<RefCell<Namespace>>,
}

impl FunctionValue {
    /// Function name
    pub fn name(&self) -> &str {
        &self.def.name
    }
}

/// Accepted positional argument counts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arity {
    /// Minimum number of arguments
    pub min: usize,
    /// Maximum number of arguments (`None` for variadic)
    pub max: Option<usize>,
}

impl Arity {
    /// Exactly `n` arguments.
    pub const fn exact(n: usize) -> Self {
        Self {
            min: n,
            max: Some(n),
        }
    }

    /// Between `min` and `max` arguments.
    pub const fn range(min: usize, max: usize) -> Self {
        Self {
            min,
            max: Some(max),
        }
    }

    /// At least `min` arguments.
    pub const fn at_least(min: usize) -> Self {
        Self { min, max: None }
    }

    /// Fail with an arity error if `got` is out of range.
    pub fn check(&self, name: &str, got: usize) -> Result<(), EvalError> {
        let ok = got >= self.min && self.max.map_or(true, |max| got <= max);
        if ok {
            return Ok(());
        }
        let expected = match self.max {
            Some(max) if max == self.min => max.to_string(),
            Some(max) => format!("{} to {}", self.min, max),
            None => format!("at least {}", self.min),
        };
        Err(EvalError::ArityMismatch {
            name: name.to_string(),
            expected,
            got,
        })
    }
}

/// A built-in native function.
///
/// These are Rust functions exposed to the interpreter.
#[derive(Clone)]
pub struct BuiltinFn {
    /// Function name (for display/debugging)
    pub name: String,

    /// Accepted positional argument counts
    pub arity: Arity,

    /// The actual function pointer
    pub func: BuiltinFnPtr,
}

impl BuiltinFn {
    /// Wrap a native function.
    pub fn new(
        name: impl Into<String>,
        arity: Arity,
        func: impl Fn(&Interpreter, Vec<Value>, Kwargs) -> Result<Value, EvalError> + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            arity,
            func: Rc::new(func),
        }
    }

    /// Call with arity checking.
    pub fn call(
        &self,
        interp: &Interpreter,
        args: Vec<Value>,
        kwargs: Kwargs,
    ) -> Result<Value, EvalError> {
        self.arity.check(&self.name, args.len())?;
        (self.func)(interp, args, kwargs)
    }
}

impl std::fmt::Debug for BuiltinFn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BuiltinFn({})", self.name)
    }
}

/// An imported module: a name and the namespace its code produced.
#[derive(Debug)]
pub struct ModuleValue {
    /// Dotted module name
    pub name: String,

    /// Module globals (submodules are added here as they load)
    pub namespace: Rc<RefCell<Namespace>>,
}

impl ModuleValue {
    /// Create a module around an existing namespace.
    pub fn new(name: impl Into<String>, namespace: Rc<RefCell<Namespace>>) -> Self {
        Self {
            name: name.into(),
            namespace,
        }
    }

    /// Look up a module attribute.
    pub fn get(&self, attr: &str) -> Option<Value> {
        self.namespace.borrow().get(attr).cloned()
    }
}

/// A method looked up on a receiver, e.g. `s.upper`.
#[derive(Debug, Clone)]
pub struct BoundMethod {
    /// The receiver
    pub receiver: Value,

    /// Method name
    pub name: String,
}
