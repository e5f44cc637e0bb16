//! # Blockflow
//!
//! A dataflow execution model for block-based programs.
//!
//! A program is a list of statements (function calls, free-form blocks and
//! loops). Each statement declares the names it reads and writes, so the
//! program can be reordered, regenerated as source text and re-executed
//! partially: when a value in the shared [`Context`] changes, only the
//! statements downstream of it run again.
//!
//! ## Architecture
//!
//! - **AST toolkit** ([`ast`]): lexer, parser and unparser for the host
//!   language, plus name analysis
//! - **Interpreter** ([`interp`]): tree-walking `exec` over a [`Context`]
//! - **Statements** ([`statement`]): calls, expression blocks and groups
//! - **Execution model** ([`model`]): dependency graph, code generation,
//!   restriction and execution
//! - **Runtime** ([`context`], [`executing`], [`facade`]): listenable
//!   variable namespaces and the machinery re-running statements on change

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod ast;
pub mod callable;
pub mod config;
pub mod context;
pub mod error;
pub mod executing;
pub mod facade;
pub mod interp;
pub mod model;
pub mod persist;
pub mod statement;
pub mod value;
pub mod variable;

// Re-export main types
pub use callable::{CallableInfo, ImportedCallable, LocalCallable, BUILTINS_MODULE};
pub use config::EngineConfig;
pub use context::{
    BatchGuard, Context, ContextLayer, ContextModified, ItemsModified, ListenerId, PassThrough,
    Reduction, Selection,
};
pub use error::{
    BlockflowError, ContextError, EvalError, ExecutionFailure, LoadError, ParseError, Result,
    RuntimeError,
};
pub use executing::{DeferGuard, ExecutingContext};
pub use interp::{Interpreter, ModuleLoader, Scope};
pub use model::{DependencyGraph, ExecutionModel, ExecutionReport, GeneratedCode, ModelBuilder};
pub use persist::{CallableRecord, ModelRecord, StatementKind, StatementRecord};
pub use statement::{
    FunctionCall, FunctionCallGroup, GeneralExpression, GroupKind, GroupSpec, Statement,
};
pub use value::{Key, Value};
pub use variable::{InputVariable, OutputVariable, Slot};

/// Blockflow version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
