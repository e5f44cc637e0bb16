//! Scopes that hold variables during execution

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::EvalError;
use crate::value::{Namespace, Value};

/// Storage for the local variables of a running frame.
///
/// Top-level code runs with a context as its locals; function calls and
/// module bodies use plain namespaces.
pub trait Scope {
    /// Look up a variable.
    fn lookup(&self, name: &str) -> Option<Value>;

    /// Bind a variable.
    fn assign(&mut self, name: &str, value: Value) -> Result<(), EvalError>;
}

impl Scope for Namespace {
    fn lookup(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }

    fn assign(&mut self, name: &str, value: Value) -> Result<(), EvalError> {
        self.insert(name.to_string(), value);
        Ok(())
    }
}

/// A shared namespace used as locals, e.g. a module body where locals and
/// globals are the same mapping.
#[derive(Debug, Clone, Default)]
pub struct SharedScope(pub Rc<RefCell<Namespace>>);

impl Scope for SharedScope {
    fn lookup(&self, name: &str) -> Option<Value> {
        self.0.borrow().get(name).cloned()
    }

    fn assign(&mut self, name: &str, value: Value) -> Result<(), EvalError> {
        self.0.borrow_mut().insert(name.to_string(), value);
        Ok(())
    }
}

/// One activation: locals, the globals of the defining module, and whether
/// this is module-level code (where `import` and `def` bind globals).
pub struct Frame<'a> {
    /// Local variables
    pub locals: &'a mut dyn Scope,

    /// Module globals
    pub globals: Rc<RefCell<Namespace>>,

    /// Whether `import` and `def` bind into `globals`
    pub module_level: bool,
}

impl<'a> Frame<'a> {
    /// Frame for module-level code.
    pub fn module(locals: &'a mut dyn Scope, globals: Rc<RefCell<Namespace>>) -> Self {
        Self {
            locals,
            globals,
            module_level: true,
        }
    }

    /// Frame for a function body.
    pub fn function(locals: &'a mut dyn Scope, globals: Rc<RefCell<Namespace>>) -> Self {
        Self {
            locals,
            globals,
            module_level: false,
        }
    }

    /// Look up a name in locals, then globals.
    pub fn lookup(&self, name: &str) -> Option<Value> {
        self.locals
            .lookup(name)
            .or_else(|| self.globals.borrow().get(name).cloned())
    }

    /// Bind a name produced by assignment.
    pub fn assign(&mut self, name: &str, value: Value) -> Result<(), EvalError> {
        self.locals.assign(name, value)
    }

    /// Bind a name produced by `import` or `def`.
    pub fn define(&mut self, name: &str, value: Value) -> Result<(), EvalError> {
        if self.module_level {
            self.globals.borrow_mut().insert(name.to_string(), value);
            Ok(())
        } else {
            self.locals.assign(name, value)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_frame_defines_into_globals() {
        let globals = Rc::new(RefCell::new(Namespace::new()));
        let mut locals = Namespace::new();
        let mut frame = Frame::module(&mut locals, globals.clone());
        frame.define("f", Value::Int(1)).unwrap();
        frame.assign("x", Value::Int(2)).unwrap();
        assert_eq!(frame.lookup("f"), Some(Value::Int(1)));
        assert_eq!(frame.lookup("x"), Some(Value::Int(2)));
        drop(frame);
        assert!(globals.borrow().contains_key("f"));
        assert!(locals.contains_key("x"));
        assert!(!locals.contains_key("f"));
    }

    #[test]
    fn test_locals_shadow_globals() {
        let globals = Rc::new(RefCell::new(Namespace::new()));
        globals.borrow_mut().insert("x".into(), Value::Int(1));
        let mut locals = Namespace::new();
        locals.insert("x".into(), Value::Int(2));
        let frame = Frame::function(&mut locals, globals);
        assert_eq!(frame.lookup("x"), Some(Value::Int(2)));
    }
}
