//! Control flow mechanism for break/continue/return

use std::fmt;

use crate::value::Value;

/// Control flow signal for non-local jumps.
///
/// When `break`, `continue` or `return` is executed, it doesn't return a
/// normal `Result<(), EvalError>`. Instead, it returns an
/// `Err(EvalError::ControlFlow(...))` that propagates up until caught by the
/// enclosing loop or function call.
#[derive(Debug, Clone)]
pub enum ControlFlow {
    /// Break out of the innermost loop
    Break,

    /// Continue to next iteration of the innermost loop
    Continue,

    /// Return from a function with a value
    Return(Value),
}

impl fmt::Display for ControlFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlFlow::Break => write!(f, "break"),
            ControlFlow::Continue => write!(f, "continue"),
            ControlFlow::Return(_) => write!(f, "return"),
        }
    }
}
