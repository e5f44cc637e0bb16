//! Syntax tree for the host language

/// Source span (byte offsets)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    /// Inclusive start offset
    pub start: usize,
    /// Exclusive end offset
    pub end: usize,
}

impl Span {
    /// Create a span from byte offsets.
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Merge two spans into one covering both
    pub fn merge(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    /// Slice the text covered by this span.
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        source.get(self.start..self.end).unwrap_or("")
    }
}

/// A parsed module: a sequence of top-level statements.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Module {
    /// Top-level statements in source order
    pub body: Vec<Stmt>,
}

/// A statement with its source span.
///
/// Spans are ignored by equality so that re-parsed unparsed text compares
/// equal to the original tree.
#[derive(Debug, Clone)]
pub struct Stmt {
    /// What kind of statement
    pub kind: StmtKind,
    /// Where it came from
    pub span: Span,
}

impl PartialEq for Stmt {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

impl Stmt {
    /// Create a statement with an empty span.
    pub fn new(kind: StmtKind) -> Self {
        Self {
            kind,
            span: Span::default(),
        }
    }
}

/// Statement kinds
#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// `import a.b as c, d`
    Import(Vec<Alias>),
    /// `from m import x as y` (or `*`)
    ImportFrom {
        /// Module path
        module: String,
        /// Imported names; empty for star imports
        names: Vec<Alias>,
        /// `from m import *`
        star: bool,
    },
    /// `def name(args): body`
    FunctionDef(FunctionDef),
    /// `return [value]`
    Return(Option<Expr>),
    /// `t1 = t2 = value`
    Assign {
        /// One or more targets (chained assignment)
        targets: Vec<Expr>,
        /// Assigned value
        value: Expr,
    },
    /// `target op= value`
    AugAssign {
        /// Target
        target: Expr,
        /// Operator
        op: BinOp,
        /// Right-hand side
        value: Expr,
    },
    /// `for target in iter: body`
    For {
        /// Loop variable(s)
        target: Expr,
        /// Iterated expression
        iter: Expr,
        /// Loop body
        body: Vec<Stmt>,
    },
    /// `while test: body`
    While {
        /// Condition
        test: Expr,
        /// Loop body
        body: Vec<Stmt>,
    },
    /// `if test: body else: orelse` (`elif` nests in `orelse`)
    If {
        /// Condition
        test: Expr,
        /// Taken branch
        body: Vec<Stmt>,
        /// Else branch
        orelse: Vec<Stmt>,
    },
    /// Expression evaluated for effect
    Expr(Expr),
    /// `pass`
    Pass,
    /// `break`
    Break,
    /// `continue`
    Continue,
}

/// One name in an import statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alias {
    /// Imported (dotted) name
    pub name: String,
    /// `as` name
    pub asname: Option<String>,
}

impl Alias {
    /// The name bound locally by this alias.
    ///
    /// `import a.b` binds `a`; `import a.b as c` binds `c`.
    pub fn local_name(&self) -> &str {
        match &self.asname {
            Some(name) => name,
            None => self.name.split('.').next().unwrap_or(&self.name),
        }
    }
}

/// A function definition
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    /// Function name
    pub name: String,
    /// Parameters
    pub args: Arguments,
    /// Body statements
    pub body: Vec<Stmt>,
}

impl FunctionDef {
    /// The leading string literal of the body, if any.
    pub fn docstring(&self) -> Option<&str> {
        match self.body.first().map(|s| &s.kind) {
            Some(StmtKind::Expr(Expr::Constant(Constant::Str(doc)))) => Some(doc),
            _ => None,
        }
    }
}

/// A parameter list
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Arguments {
    /// Positional / defaulted parameters
    pub params: Vec<Param>,
    /// `*args`
    pub vararg: Option<String>,
    /// `**kwargs`
    pub kwarg: Option<String>,
}

/// One parameter, possibly with a default
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    /// Name or tuple pattern
    pub target: ParamTarget,
    /// Default expression
    pub default: Option<Expr>,
}

/// A parameter name or an (old-style) unpacked tuple of names
#[derive(Debug, Clone, PartialEq)]
pub enum ParamTarget {
    /// Plain name
    Name(String),
    /// `(a, b)` unpacking
    Tuple(Vec<ParamTarget>),
}

impl ParamTarget {
    /// All names bound by this target, depth-first.
    pub fn names(&self) -> Vec<String> {
        match self {
            ParamTarget::Name(n) => vec![n.clone()],
            ParamTarget::Tuple(items) => items.iter().flat_map(|t| t.names()).collect(),
        }
    }
}

/// A keyword argument in a call
#[derive(Debug, Clone, PartialEq)]
pub struct Keyword {
    /// Parameter name
    pub arg: String,
    /// Supplied value
    pub value: Expr,
}

/// Literal constants
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// `None`
    None,
    /// `True` / `False`
    Bool(bool),
    /// Integer literal
    Int(i64),
    /// Float literal
    Float(f64),
    /// String literal
    Str(String),
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `//`
    FloorDiv,
    /// `%`
    Mod,
    /// `**`
    Pow,
}

impl BinOp {
    /// Source symbol
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::FloorDiv => "//",
            BinOp::Mod => "%",
            BinOp::Pow => "**",
        }
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// `-x`
    Neg,
    /// `+x`
    Pos,
    /// `not x`
    Not,
}

/// Short-circuit boolean operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOp {
    /// `and`
    And,
    /// `or`
    Or,
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    /// `==`
    Eq,
    /// `!=`
    NotEq,
    /// `<`
    Lt,
    /// `<=`
    LtE,
    /// `>`
    Gt,
    /// `>=`
    GtE,
    /// `in`
    In,
    /// `not in`
    NotIn,
    /// `is`
    Is,
    /// `is not`
    IsNot,
}

impl CmpOp {
    /// Source symbol
    pub fn symbol(self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::NotEq => "!=",
            CmpOp::Lt => "<",
            CmpOp::LtE => "<=",
            CmpOp::Gt => ">",
            CmpOp::GtE => ">=",
            CmpOp::In => "in",
            CmpOp::NotIn => "not in",
            CmpOp::Is => "is",
            CmpOp::IsNot => "is not",
        }
    }
}

/// Expressions
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Variable reference
    Name(String),
    /// Literal
    Constant(Constant),
    /// `(a, b)`
    Tuple(Vec<Expr>),
    /// `[a, b]`
    List(Vec<Expr>),
    /// `{k: v}`
    Dict(Vec<(Expr, Expr)>),
    /// `a op b`
    BinOp {
        /// Left operand
        left: Box<Expr>,
        /// Operator
        op: BinOp,
        /// Right operand
        right: Box<Expr>,
    },
    /// `op a`
    UnaryOp {
        /// Operator
        op: UnaryOp,
        /// Operand
        operand: Box<Expr>,
    },
    /// `a and b and c`
    BoolOp {
        /// Operator
        op: BoolOp,
        /// Two or more operands
        values: Vec<Expr>,
    },
    /// `a < b <= c`
    Compare {
        /// First operand
        left: Box<Expr>,
        /// Operators, one per comparator
        ops: Vec<CmpOp>,
        /// Remaining operands
        comparators: Vec<Expr>,
    },
    /// `f(a, k=v)`
    Call {
        /// Callee
        func: Box<Expr>,
        /// Positional arguments
        args: Vec<Expr>,
        /// Keyword arguments
        keywords: Vec<Keyword>,
    },
    /// `a.b`
    Attribute {
        /// Receiver
        value: Box<Expr>,
        /// Attribute name
        attr: String,
    },
    /// `a[i]`
    Subscript {
        /// Container
        value: Box<Expr>,
        /// Index (possibly a `Slice` or `Tuple`)
        index: Box<Expr>,
    },
    /// `lo:hi:step` inside a subscript
    Slice {
        /// Lower bound
        lower: Option<Box<Expr>>,
        /// Upper bound
        upper: Option<Box<Expr>>,
        /// Step
        step: Option<Box<Expr>>,
    },
    /// `body if test else orelse`
    IfExp {
        /// Condition
        test: Box<Expr>,
        /// Value when true
        body: Box<Expr>,
        /// Value when false
        orelse: Box<Expr>,
    },
    /// `[elt for target in iter if cond]`
    ListComp {
        /// Produced element
        elt: Box<Expr>,
        /// Loop variable(s)
        target: Box<Expr>,
        /// Iterated expression
        iter: Box<Expr>,
        /// Filters
        conds: Vec<Expr>,
    },
}

impl Expr {
    /// Shorthand for a name expression.
    pub fn name(name: impl Into<String>) -> Self {
        Expr::Name(name.into())
    }

    /// Whether this expression is a literal constant, possibly signed or
    /// nested in a tuple or list of literals.
    pub fn is_literal(&self) -> bool {
        match self {
            Expr::Constant(_) => true,
            Expr::UnaryOp {
                op: UnaryOp::Neg | UnaryOp::Pos,
                operand,
            } => matches!(
                operand.as_ref(),
                Expr::Constant(Constant::Int(_) | Constant::Float(_))
            ),
            Expr::Tuple(items) | Expr::List(items) => items.iter().all(Expr::is_literal),
            _ => false,
        }
    }

    /// Names bound when this expression is an assignment target made only of
    /// names and tuples/lists of names.
    pub fn target_names(&self) -> Option<Vec<String>> {
        match self {
            Expr::Name(n) => Some(vec![n.clone()]),
            Expr::Tuple(items) | Expr::List(items) => {
                let mut names = Vec::new();
                for item in items {
                    names.extend(item.target_names()?);
                }
                Some(names)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alias_local_name() {
        let plain = Alias {
            name: "os.path".to_string(),
            asname: None,
        };
        assert_eq!(plain.local_name(), "os");
        let renamed = Alias {
            name: "numpy".to_string(),
            asname: Some("np".to_string()),
        };
        assert_eq!(renamed.local_name(), "np");
    }

    #[test]
    fn test_is_literal() {
        assert!(Expr::Constant(Constant::Int(1)).is_literal());
        assert!(Expr::UnaryOp {
            op: UnaryOp::Neg,
            operand: Box::new(Expr::Constant(Constant::Float(1.5))),
        }
        .is_literal());
        assert!(Expr::Tuple(vec![Expr::Constant(Constant::Int(1))]).is_literal());
        assert!(!Expr::name("x").is_literal());
    }

    #[test]
    fn test_target_names_flattens() {
        let target = Expr::Tuple(vec![
            Expr::name("a"),
            Expr::Tuple(vec![Expr::name("b"), Expr::name("c")]),
        ]);
        assert_eq!(
            target.target_names(),
            Some(vec!["a".to_string(), "b".to_string(), "c".to_string()])
        );
        let sub = Expr::Subscript {
            value: Box::new(Expr::name("x")),
            index: Box::new(Expr::Constant(Constant::Int(0))),
        };
        assert_eq!(sub.target_names(), None);
    }
}
