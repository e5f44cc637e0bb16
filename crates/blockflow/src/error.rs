//! Error types for Blockflow

use std::fmt;

use thiserror::Error;
use uuid::Uuid;

use crate::interp::ControlFlow;

/// Main error type for Blockflow operations
#[derive(Error, Debug, Clone)]
pub enum BlockflowError {
    /// Source text does not parse
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// An output binding was set to something that is not an identifier
    #[error("invalid identifier: `{binding}`")]
    InvalidIdentifier {
        /// The rejected binding text
        binding: String,
    },

    /// An expression block does not reduce to a sequence of top-level statements
    #[error("invalid expression block: {reason}")]
    InvalidExpressionBlock {
        /// Why the block was rejected
        reason: String,
    },

    /// Source uses `from X import *`
    #[error("star import from `{module}` is not supported")]
    StarImportRejected {
        /// Module named by the star import
        module: String,
    },

    /// A UUID was named that is not present in the model
    #[error("no statement with uuid {0}")]
    UnknownUuid(Uuid),

    /// A statement was added under a uuid the model already holds
    #[error("a statement with uuid {0} already exists")]
    DuplicateUuid(Uuid),

    /// A statement has no variable with the given name
    #[error("statement {uuid} has no {slot} variable named `{name}`")]
    UnknownVariable {
        /// Statement uuid
        uuid: Uuid,
        /// `input` or `output`
        slot: &'static str,
        /// Requested variable name
        name: String,
    },

    /// Execution of regenerated source failed
    #[error(transparent)]
    Execution(#[from] Box<ExecutionFailure>),

    /// A context operation was rejected
    #[error(transparent)]
    Context(#[from] ContextError),

    /// The model was edited while one of its executions was running
    #[error("the model is being executed")]
    ExecutionInProgress,

    /// The scripting facade has no executing context bound
    #[error("no active executing context")]
    NoActiveSession,

    /// A persisted model could not be read or written
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for BlockflowError {
    fn from(err: serde_json::Error) -> Self {
        BlockflowError::Serialization(err.to_string())
    }
}

/// Result type alias for Blockflow operations
pub type Result<T> = std::result::Result<T, BlockflowError>;

// ═══════════════════════════════════════════════════════════════════════
// Parse Errors
// ═══════════════════════════════════════════════════════════════════════

/// Parse error with a 1-based source location
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("parse error at line {line}, column {column}: {message}")]
pub struct ParseError {
    /// What went wrong
    pub message: String,
    /// Line of the offending token
    pub line: usize,
    /// Column of the offending token
    pub column: usize,
}

impl ParseError {
    /// Build a parse error at a byte offset of `source`.
    pub fn at(source: &str, offset: usize, message: impl Into<String>) -> Self {
        let (line, column) = line_col(source, offset);
        Self {
            message: message.into(),
            line,
            column,
        }
    }
}

/// Convert a byte offset into a 1-based (line, column) pair.
pub fn line_col(source: &str, offset: usize) -> (usize, usize) {
    let mut line = 1;
    let mut column = 1;
    for (i, ch) in source.char_indices() {
        if i >= offset {
            break;
        }
        if ch == '\n' {
            line += 1;
            column = 1;
        } else {
            column += 1;
        }
    }
    (line, column)
}

// ═══════════════════════════════════════════════════════════════════════
// Load Errors
// ═══════════════════════════════════════════════════════════════════════

/// Why an imported callable could not be located or read.
///
/// Recorded on the callable, never raised.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cannot load `{name}` from `{module}`: {message}")]
pub struct LoadError {
    /// Module path
    pub module: String,
    /// Callable name
    pub name: String,
    /// Human readable reason
    pub message: String,
}

// ═══════════════════════════════════════════════════════════════════════
// Evaluation Errors
// ═══════════════════════════════════════════════════════════════════════

/// Errors raised while interpreting host-language code
#[derive(Error, Debug, Clone)]
pub enum EvalError {
    /// Name lookup failed in locals, globals and builtins
    #[error("name `{name}` is not defined")]
    UndefinedVariable {
        /// The missing name
        name: String,
    },

    /// Operation applied to a value of the wrong type
    #[error("type error: {message}")]
    TypeError {
        /// Description
        message: String,
    },

    /// Operation received a value of the right type but wrong content
    #[error("value error: {message}")]
    ValueError {
        /// Description
        message: String,
    },

    /// Sequence index out of range
    #[error("index {index} out of range for length {len}")]
    IndexOutOfRange {
        /// Requested index
        index: i64,
        /// Sequence length
        len: usize,
    },

    /// Dict key missing
    #[error("key error: {key}")]
    KeyError {
        /// Rendered key
        key: String,
    },

    /// Attribute missing on a value
    #[error("`{type_name}` has no attribute `{attr}`")]
    AttributeError {
        /// Type of the receiver
        type_name: String,
        /// Missing attribute
        attr: String,
    },

    /// Wrong number of arguments
    #[error("{name}() takes {expected} arguments but {got} were given")]
    ArityMismatch {
        /// Callee
        name: String,
        /// Expected count (rendered, may be a range)
        expected: String,
        /// Supplied count
        got: usize,
    },

    /// Division or modulo by zero
    #[error("division by zero")]
    ZeroDivision,

    /// Integer arithmetic overflowed
    #[error("integer overflow in `{op}`")]
    Overflow {
        /// Operator
        op: String,
    },

    /// Import failed
    #[error("cannot import `{module}`: {message}")]
    Import {
        /// Module path
        module: String,
        /// Reason
        message: String,
    },

    /// A builtin function reported failure
    #[error("{name}(): {message}")]
    Builtin {
        /// Builtin name
        name: String,
        /// Message
        message: String,
    },

    /// Maximum call depth exceeded
    #[error("maximum call depth {max} exceeded")]
    StackOverflow {
        /// Configured maximum
        max: usize,
    },

    /// Evaluation was interrupted through the engine configuration
    #[error("evaluation interrupted")]
    Interrupted,

    /// Writing into the context failed
    #[error(transparent)]
    Context(#[from] ContextError),

    /// Syntax the interpreter does not execute
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Non-local control flow (`return`, `break`, `continue`)
    #[error("control flow `{0}` outside of its construct")]
    ControlFlow(ControlFlow),
}

/// An interpreter error located at the line of the failing top-level statement.
#[derive(Error, Debug, Clone)]
#[error("line {line}: {error}")]
pub struct RuntimeError {
    /// Underlying error
    pub error: EvalError,
    /// 1-based line of the top-level statement that raised
    pub line: usize,
}

// ═══════════════════════════════════════════════════════════════════════
// Context Errors
// ═══════════════════════════════════════════════════════════════════════

/// Errors raised by context layers and shadows
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContextError {
    /// Write to a name hidden by a selection layer
    #[error("`{key}` is not part of the selection")]
    NotSelected {
        /// Rejected key
        key: String,
    },

    /// A reduction write does not line up with the mask
    #[error("cannot write `{key}` through mask: expected {expected} rows, got {got}")]
    MaskMismatch {
        /// Key
        key: String,
        /// Rows selected by the mask
        expected: usize,
        /// Rows supplied
        got: usize,
    },

    /// Dotted path names a sub-context that does not exist
    #[error("no sub-context `{path}`")]
    MissingSubcontext {
        /// Path prefix
        path: String,
    },

    /// Shadow operations on a context without a parent
    #[error("context `{name}` is not a shadow")]
    NotAShadow {
        /// Context name
        name: String,
    },

    /// Keys must be non-empty
    #[error("context keys must be non-empty")]
    EmptyKey,
}

// ═══════════════════════════════════════════════════════════════════════
// Execution Failure
// ═══════════════════════════════════════════════════════════════════════

/// Execution of regenerated source raised.
///
/// Carries the regenerated source and the names that triggered the run so
/// a host can highlight the failing block.
#[derive(Debug, Clone)]
pub struct ExecutionFailure {
    /// The interpreter error
    pub error: EvalError,
    /// Line of the failing top-level statement within `source_code`
    pub line: Option<usize>,
    /// Statement owning that line, when known
    pub statement: Option<Uuid>,
    /// Regenerated source that was running
    pub source_code: String,
    /// Names the execution was triggered for (`None` means whole program)
    pub names: Option<Vec<String>>,
}

impl fmt::Display for ExecutionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "execution failed")?;
        if let Some(line) = self.line {
            write!(f, " at line {}", line)?;
        }
        if let Some(names) = &self.names {
            write!(f, " (triggered by {})", names.join(", "))?;
        }
        write!(f, ": {}", self.error)
    }
}

impl std::error::Error for ExecutionFailure {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_col_counts_newlines() {
        let src = "a = 1\nbb = 2\n";
        assert_eq!(line_col(src, 0), (1, 1));
        assert_eq!(line_col(src, 6), (2, 1));
        assert_eq!(line_col(src, 8), (2, 3));
    }

    #[test]
    fn test_execution_failure_display_mentions_names() {
        let failure = ExecutionFailure {
            error: EvalError::ZeroDivision,
            line: Some(3),
            statement: None,
            source_code: String::new(),
            names: Some(vec!["b".to_string()]),
        };
        let text = failure.to_string();
        assert!(text.contains("line 3"));
        assert!(text.contains("triggered by b"));
        assert!(text.contains("division by zero"));
    }
}
