//! Tree-walking interpreter for the host language
//!
//! This is the `exec` primitive the execution model runs regenerated source
//! with: top-level code gets a fresh globals namespace and a caller-chosen
//! locals scope (normally a [`Context`](crate::context::Context)).

pub mod binary;
pub mod call;
pub mod control;
pub mod expr;
pub mod index;
pub mod loader;
pub mod methods;
pub mod prelude;
pub mod scope;
pub mod stmt;

pub use control::ControlFlow;
pub use loader::ModuleLoader;
pub use prelude::{builtin_names, is_builtin};
pub use scope::{Frame, Scope, SharedScope};

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tracing::trace;

use crate::ast::{self, Module};
use crate::config::EngineConfig;
use crate::error::{line_col, BlockflowError, EvalError, ExecutionFailure, RuntimeError};
use crate::value::{Kwargs, Namespace, Value};

/// Trait for evaluating AST nodes to values.
///
/// This is the core abstraction for the tree-walking interpreter.
pub trait Evaluate {
    /// Evaluate this node in the given frame.
    fn eval(&self, frame: &mut Frame<'_>, interp: &Interpreter) -> Result<Value, EvalError>;
}

/// The interpreter: configuration, builtins, the module loader and the
/// current call depth.
pub struct Interpreter {
    config: EngineConfig,
    builtins: Namespace,
    loader: Rc<ModuleLoader>,
    depth: Cell<usize>,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

/// Decrements the call depth when a call returns.
pub(crate) struct CallGuard<'a> {
    depth: &'a Cell<usize>,
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        self.depth.set(self.depth.get().saturating_sub(1));
    }
}

impl Interpreter {
    /// Create an interpreter with the standard prelude and a loader built
    /// from `config.module_paths`.
    pub fn new(config: EngineConfig) -> Self {
        let loader = Rc::new(ModuleLoader::new(config.module_paths.clone()));
        Self::with_loader(config, loader)
    }

    /// Create an interpreter sharing an existing module loader.
    pub fn with_loader(config: EngineConfig, loader: Rc<ModuleLoader>) -> Self {
        Self {
            config,
            builtins: prelude::prelude(),
            loader,
            depth: Cell::new(0),
        }
    }

    /// The engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The module loader.
    pub fn loader(&self) -> &Rc<ModuleLoader> {
        &self.loader
    }

    /// Look up a builtin.
    pub fn builtin(&self, name: &str) -> Option<Value> {
        self.builtins.get(name).cloned()
    }

    /// Resolve a name: locals, then globals, then builtins.
    pub fn lookup(&self, frame: &Frame<'_>, name: &str) -> Result<Value, EvalError> {
        frame
            .lookup(name)
            .or_else(|| self.builtin(name))
            .ok_or_else(|| EvalError::UndefinedVariable {
                name: name.to_string(),
            })
    }

    pub(crate) fn check_interrupt(&self) -> Result<(), EvalError> {
        if self.config.is_interrupted() {
            Err(EvalError::Interrupted)
        } else {
            Ok(())
        }
    }

    pub(crate) fn enter_call(&self) -> Result<CallGuard<'_>, EvalError> {
        let depth = self.depth.get() + 1;
        if depth > self.config.max_call_depth {
            return Err(EvalError::StackOverflow {
                max: self.config.max_call_depth,
            });
        }
        self.depth.set(depth);
        Ok(CallGuard { depth: &self.depth })
    }

    // ═══════════════════════════════════════════════════════════════════
    // Entry points
    // ═══════════════════════════════════════════════════════════════════

    /// Run a parsed module against fresh globals and the given locals.
    ///
    /// Errors carry the line of the top-level statement that raised.
    /// Returns the globals the module produced.
    pub fn exec_module(
        &self,
        module: &Module,
        source: &str,
        locals: &mut dyn Scope,
    ) -> Result<Rc<RefCell<Namespace>>, RuntimeError> {
        let globals = Rc::new(RefCell::new(Namespace::new()));
        self.exec_module_in(module, source, locals, globals.clone())?;
        Ok(globals)
    }

    /// Run a parsed module with explicit globals.
    pub fn exec_module_in(
        &self,
        module: &Module,
        source: &str,
        locals: &mut dyn Scope,
        globals: Rc<RefCell<Namespace>>,
    ) -> Result<(), RuntimeError> {
        let mut frame = Frame::module(locals, globals);
        for stmt in &module.body {
            let line = line_col(source, stmt.span.start).0;
            if self.config.trace {
                trace!(line, "executing statement");
            }
            stmt::exec_stmt(stmt, &mut frame, self)
                .map_err(|error| RuntimeError { error, line })?;
        }
        Ok(())
    }

    /// Parse and run source text against fresh globals.
    pub fn exec(&self, source: &str, locals: &mut dyn Scope) -> Result<(), BlockflowError> {
        let module = ast::parse(source)?;
        self.exec_module(&module, source, locals).map_err(|err| {
            BlockflowError::Execution(Box::new(ExecutionFailure {
                error: err.error,
                line: Some(err.line),
                statement: None,
                source_code: source.to_string(),
                names: None,
            }))
        })?;
        Ok(())
    }

    /// Evaluate a single expression against the given locals.
    pub fn eval_expression(
        &self,
        source: &str,
        locals: &mut dyn Scope,
    ) -> Result<Value, BlockflowError> {
        let expr = ast::parse_expression(source)?;
        let globals = Rc::new(RefCell::new(Namespace::new()));
        let mut frame = Frame::module(locals, globals);
        expr.eval(&mut frame, self).map_err(|error| {
            BlockflowError::Execution(Box::new(ExecutionFailure {
                error,
                line: Some(1),
                statement: None,
                source_code: source.to_string(),
                names: None,
            }))
        })
    }

    /// Call a value with positional and keyword arguments.
    pub fn call_value(
        &self,
        func: &Value,
        args: Vec<Value>,
        kwargs: Kwargs,
    ) -> Result<Value, EvalError> {
        call::call_value(self, func, args, kwargs)
    }
}
